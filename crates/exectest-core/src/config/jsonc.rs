//! Comment-tolerant JSON.
//!
//! Comments and trailing commas are blanked out byte-for-byte before the
//! text reaches `serde_json`, so every byte keeps its offset and reported
//! positions point into the raw file.

use serde_json::Value;

use super::ConfigError;

/// Parses JSON text that may contain comments and trailing commas.
pub(crate) fn parse(text: &str) -> Result<Value, ConfigError> {
    let cleaned = strip_trailing_commas(&strip_comments(text.as_bytes()));
    let cleaned = String::from_utf8(cleaned).map_err(|e| {
        let (line, column) = line_col(text, e.utf8_error().valid_up_to());
        ConfigError::ParseError {
            line,
            column,
            message: "invalid UTF-8".to_string(),
        }
    })?;

    serde_json::from_str(&cleaned).map_err(|e| ConfigError::ParseError {
        line: e.line(),
        column: e.column(),
        message: strip_position_suffix(&e.to_string()),
    })
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_col(text: &str, offset: usize) -> (usize, usize) {
    let prefix = &text.as_bytes()[..offset.min(text.len())];
    let line = prefix.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = prefix
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    (line, offset.min(text.len()) - line_start + 1)
}

fn strip_position_suffix(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

fn strip_comments(src: &[u8]) -> Vec<u8> {
    let mut out = src.to_vec();
    let mut i = 0;
    let mut in_string = false;

    while i < src.len() {
        let b = src[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match (b, src.get(i + 1)) {
            (b'"', _) => {
                in_string = true;
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < src.len() && src[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                let start = i;
                i += 2;
                while i < src.len() && !(src[i] == b'*' && src.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                // unterminated block comments run to the end of the text
                let end = (i + 2).min(src.len());
                for byte in &mut out[start..end] {
                    if *byte != b'\n' {
                        *byte = b' ';
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    out
}

/// Blanks commas that follow a value and close an array or object. A comma
/// with no value before it is left for `serde_json` to reject.
fn strip_trailing_commas(src: &[u8]) -> Vec<u8> {
    let mut out = src.to_vec();
    let mut i = 0;
    let mut in_string = false;
    // last significant byte outside strings
    let mut prev: Option<u8> = None;

    while i < src.len() {
        let b = src[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => {
                    in_string = false;
                    prev = Some(b'"');
                }
                _ => {}
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b',' {
            let follows_value = !matches!(prev, None | Some(b',' | b'[' | b'{' | b':'));
            let next = src[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
            if follows_value && matches!(next, Some(b']') | Some(b'}')) {
                out[i] = b' ';
            }
            prev = Some(b);
        } else if !b.is_ascii_whitespace() {
            prev = Some(b);
        }
        i += 1;
    }

    out
}
