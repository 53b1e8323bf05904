//! Terminal presentation of run events.

use std::io::Write;
use std::time::Duration;

use exectest_core::{RunReporter, RunResult, RunSummary, TestLeaf};

/// Prints one status line per test, with test output streamed in between.
pub struct TerminalReporter {
    show_output: bool,
    queued: usize,
    done: usize,
}

impl TerminalReporter {
    pub fn new(show_output: bool) -> Self {
        Self {
            show_output,
            queued: 0,
            done: 0,
        }
    }

    fn progress(&self) -> String {
        format!("[{}/{}]", self.done, self.queued)
    }
}

impl RunReporter for TerminalReporter {
    fn enqueued(&mut self, _leaf: &TestLeaf) {
        self.queued += 1;
    }

    fn started(&mut self, leaf: &TestLeaf) {
        println!("RUN    {}", leaf.relative_path);
    }

    fn output(&mut self, _leaf: Option<&TestLeaf>, text: &str) {
        if !self.show_output {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn finished(&mut self, leaf: &TestLeaf, result: &RunResult) {
        self.done += 1;
        let progress = self.progress();
        match result {
            RunResult::Passed { duration } => {
                println!("PASS   {} {} ({})", leaf.relative_path, progress, format_duration(*duration));
            }
            RunResult::Failed { duration, message } => {
                println!("FAIL   {} {} ({})", leaf.relative_path, progress, format_duration(*duration));
                print_indented(message);
            }
            RunResult::Errored { message } => {
                println!("ERROR  {} {}", leaf.relative_path, progress);
                print_indented(message);
            }
        }
    }

    fn skipped(&mut self, leaf: &TestLeaf) {
        self.done += 1;
        println!("SKIP   {} {}", leaf.relative_path, self.progress());
    }
}

fn print_indented(message: &str) {
    for line in message.lines() {
        println!("       {}", line.trim_end_matches('\r'));
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// One-line summary printed after a run.
pub fn summary_line(summary: &RunSummary) -> String {
    let mut parts = vec![format!("{} passed", summary.passed)];
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.errored > 0 {
        parts.push(format!("{} errored", summary.errored));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    format!("{} tests: {}", summary.total(), parts.join(", "))
}
