//! Splitting response-file text into argument tokens.

/// Quoting rules for a compiler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotingStyle {
    /// Shell-like: single quotes, double quotes and backslash escapes.
    Posix,
    /// `CommandLineToArgvW` rules used by MSVC-style drivers.
    Windows,
}

impl QuotingStyle {
    /// Split `text` into tokens using this style.
    pub fn split(self, text: &str) -> Vec<String> {
        match self {
            QuotingStyle::Posix => split_posix(text),
            QuotingStyle::Windows => split_windows(text),
        }
    }
}

/// Split text with POSIX shell quoting.
///
/// Unbalanced quotes fall back to plain whitespace splitting so that the
/// compiler, not us, reports the malformed argument.
pub fn split_posix(text: &str) -> Vec<String> {
    match shlex::split(text) {
        Some(tokens) => tokens,
        None => {
            tracing::debug!(text, "unbalanced quoting in response file, splitting on whitespace");
            text.split_whitespace().map(str::to_owned).collect()
        }
    }
}

/// Split text with Windows command-line rules.
///
/// - whitespace outside quotes separates tokens
/// - `2n` backslashes before `"` produce `n` backslashes and toggle quoting
/// - `2n+1` backslashes before `"` produce `n` backslashes and a literal `"`
/// - backslashes not followed by `"` are literal
/// - `""` inside a quoted region is a literal `"`
pub fn split_windows(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let mut count = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    count += 1;
                }
                if chars.peek() == Some(&'"') {
                    current.extend(std::iter::repeat('\\').take(count / 2));
                    if count % 2 == 1 {
                        chars.next();
                        current.push('"');
                    }
                } else {
                    current.extend(std::iter::repeat('\\').take(count));
                }
                in_token = true;
            }
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}
