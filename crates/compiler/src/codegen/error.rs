//! IR emission error types.

/// Error type for the IR emitter.
///
/// Emission propagates with `?` over both logical failures (a node the
/// analyzer left unresolved) and formatting failures from `writeln!` into
/// the output buffer.
#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error (e.g. a statement outside any loop naming an exit).
    Logic(String),
    /// A formatting error while writing IR text.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(msg) => write!(f, "{}", msg),
            CodeGenError::Format(e) => write!(f, "IR emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(msg: String) -> Self {
        CodeGenError::Logic(msg)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
