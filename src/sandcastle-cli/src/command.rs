//! Supervised Command construction.

use sandcastle_sandbox::shell::{join_quoted, quote};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("No command specified. Provide command arguments.")]
    Empty,
}

/// Build the shell command line for `tokens`.
///
/// Each token is quoted independently. With a `shell` override the quoted
/// line becomes the body of `<shell> -c '<line>'`.
pub fn build_command<S: AsRef<str>>(
    tokens: &[S],
    shell: Option<&str>,
) -> Result<String, CommandError> {
    if tokens.is_empty() {
        return Err(CommandError::Empty);
    }

    let line = join_quoted(tokens);
    Ok(match shell {
        Some(shell) => format!("{} -c {}", quote(shell), quote(&line)),
        None => line,
    })
}
