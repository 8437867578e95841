//! POSIX shell quoting.

/// Quote a string for POSIX shells.
///
/// Strings made only of ASCII alphanumerics and `_ - . /` are returned as-is;
/// anything else is wrapped in single quotes, with each embedded single quote
/// written as `'\''`.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
    {
        return s.to_string();
    }

    let escaped = s.replace('\'', "'\\''");
    format!("'{escaped}'")
}

/// Quote every token and join them into one command line.
pub fn join_quoted<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| quote(token.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
