mod reporter;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;

use exectest_core::config::{ConfigError, DEFAULT_WATCH_INTERVAL, DOCUMENTATION_URL};
use exectest_core::{CancelToken, CommandDebugger, DiscoveryReport, Session, SessionError};
use reporter::{summary_line, TerminalReporter};

#[derive(Parser)]
#[command(name = "exectest")]
#[command(about = "Discover, run and debug prebuilt test executables", long_about = None)]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Configuration file, relative to the workspace root
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Discover tests and print the tree
    Discover {
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run tests (all of them when no ids are given)
    Run {
        /// Test or group ids to run
        ids: Vec<String>,
        /// Hide test output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Start a debugger for each selected test (all of them when no ids are given)
    Debug {
        /// Test or group ids to debug
        ids: Vec<String>,
    },
    /// Open the documentation in a browser
    Docs,
    /// Rediscover whenever the configuration changes
    Watch,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    if let Commands::Docs = cli.command {
        open_docs();
        return Ok(ExitCode::SUCCESS);
    }

    let workspace = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let mut session = Session::open(&workspace, cli.config)?;

    match cli.command {
        Commands::Init => {
            if session.create_default_config()? {
                println!("Created {}", session.config_path().display());
            } else {
                println!("{} already exists", session.config_path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Discover { json } => {
            discover(&mut session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(session.tree())?);
            } else {
                print_tree(&session);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { ids, quiet } => {
            discover(&mut session).await?;

            let cancel = CancelToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; stopping tests");
                    on_interrupt.cancel();
                }
            });

            let mut reporter = TerminalReporter::new(!quiet);
            let summary = session.run(&ids, &mut reporter, &cancel).await;
            println!("\n{}", summary_line(&summary));

            Ok(if summary.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Debug { ids } => {
            discover(&mut session).await?;

            // debuggers share the terminal's process group; Ctrl-C belongs to them
            let ignore_interrupts =
                tokio::spawn(async { while tokio::signal::ctrl_c().await.is_ok() {} });

            let debugger = CommandDebugger::sequential();
            let mut reporter = TerminalReporter::new(false);
            let summary = session.debug(&ids, &debugger, &mut reporter).await;
            ignore_interrupts.abort();

            Ok(if summary.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Watch => {
            watch(&mut session).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Docs => Ok(ExitCode::SUCCESS),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn discover(session: &mut Session) -> Result<DiscoveryReport> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Discovering tests...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = session.discover().await;
    spinner.finish_and_clear();

    match outcome {
        Ok(report) => {
            if report.non_executable > 0 {
                warn!(
                    "{} matching files are not executable and were ignored",
                    report.non_executable
                );
            }
            Ok(report)
        }
        Err(SessionError::Config(ConfigError::Missing(path))) => Err(eyre!(
            "No configuration at {}. Run `exectest init` to create one.",
            path.display()
        )),
        Err(err) => Err(err.into()),
    }
}

fn print_tree(session: &Session) {
    if session.tree().is_empty() {
        println!("No tests found.");
        return;
    }
    print!("{}", session.tree().render());
}

async fn watch(session: &mut Session) -> Result<()> {
    let mut watcher = session.config_watcher();
    match discover(session).await {
        Ok(_) => print_tree(session),
        Err(err) => eprintln!("{err}"),
    }

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    let mut interval = tokio::time::interval(DEFAULT_WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if watcher.poll() {
                    println!("\nConfiguration changed, rediscovering...");
                    match discover(session).await {
                        Ok(_) => print_tree(session),
                        Err(err) => eprintln!("{err}"),
                    }
                }
            }
            _ = &mut interrupted => return Ok(()),
        }
    }
}

fn open_docs() {
    println!("Opening {}", DOCUMENTATION_URL);
    if let Err(e) = open::that(DOCUMENTATION_URL) {
        eprintln!("Could not open browser: {}", e);
    }
}
