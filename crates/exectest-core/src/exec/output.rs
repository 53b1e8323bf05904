//! Child output: decoding, line-ending normalization and bounded tails.

/// A piece of output from a running test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

impl OutputChunk {
    pub fn text(&self) -> &str {
        match self {
            OutputChunk::Stdout(text) | OutputChunk::Stderr(text) => text,
        }
    }
}

/// Decodes a byte stream as UTF-8 across read boundaries.
///
/// Incomplete trailing sequences are held back until the next read;
/// invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        text
    }

    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Rewrites `\n` and `\r\n` as `\r\n`, keeping lone `\r`.
///
/// A `\r` at the end of a chunk is held until the next chunk shows whether
/// it starts a `\r\n` pair.
#[derive(Debug, Default)]
pub(crate) struct LineEndings {
    pending_cr: bool,
}

impl LineEndings {
    pub fn normalize(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 8);
        for ch in text.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if ch == '\n' {
                    out.push_str("\r\n");
                    continue;
                }
                out.push('\r');
            }
            match ch {
                '\r' => self.pending_cr = true,
                '\n' => out.push_str("\r\n"),
                c => out.push(c),
            }
        }
        out
    }

    pub fn finish(&mut self) -> String {
        if std::mem::take(&mut self.pending_cr) {
            "\r".to_string()
        } else {
            String::new()
        }
    }
}

/// Keeps roughly the last `limit` characters written to it.
#[derive(Debug)]
pub(crate) struct TailBuffer {
    limit: usize,
    buf: String,
    dropped: bool,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            buf: String::new(),
            dropped: false,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        // trim lazily; a char is at most four bytes
        if self.buf.len() > self.limit.saturating_mul(8).max(64) {
            let tail = tail_chars(&self.buf, self.limit);
            self.dropped |= tail.len() < self.buf.len();
            self.buf = tail.to_string();
        }
    }

    /// The last `limit` characters, and whether anything was dropped.
    pub fn finish(self) -> (String, bool) {
        let tail = tail_chars(&self.buf, self.limit);
        let truncated = self.dropped || tail.len() < self.buf.len();
        (tail.to_string(), truncated)
    }
}

/// The last `n` characters of `s`.
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}
