//! Diagnostics for the Ada front end
//!
//! Lexical and syntactic errors are fatal: the stage returns an `Err(String)`
//! already formatted as `file:line:col: message` and compilation stops.
//! Semantic errors accumulate here up to a cap; errors past the cap are
//! dropped to avoid cascades from a single root cause.

/// Maximum number of semantic diagnostics retained per compilation.
pub const MAX_ERRORS: usize = 99;

/// A source position: file id into the session file table, 1-indexed
/// line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub file: u32,
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub fn new(file: u32, line: u32, column: u32) -> Self {
        Loc { file, line, column }
    }

    /// A location for synthesized nodes (predefined environment, clones).
    pub fn none() -> Self {
        Loc {
            file: 0,
            line: 0,
            column: 0,
        }
    }
}

/// Accumulating diagnostic sink.
///
/// Owns the file-name table so that a `Loc` stays a small copyable value.
#[derive(Debug, Default)]
pub struct Diagnostics {
    files: Vec<String>,
    errors: Vec<String>,
    dropped: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics {
            // File id 0 is reserved for synthesized locations.
            files: vec!["<builtin>".to_string()],
            errors: Vec::new(),
            dropped: 0,
        }
    }

    /// Register a source file and return its id for `Loc`s.
    pub fn add_file(&mut self, path: &str) -> u32 {
        self.files.push(path.to_string());
        (self.files.len() - 1) as u32
    }

    pub fn file_name(&self, id: u32) -> &str {
        &self.files[id as usize]
    }

    /// Format a diagnostic as `file:line:col: message`.
    pub fn format(&self, loc: Loc, msg: &str) -> String {
        format!(
            "{}:{}:{}: {}",
            self.file_name(loc.file),
            loc.line,
            loc.column,
            msg
        )
    }

    /// Record a non-fatal (semantic) error. Errors past the cap are dropped.
    pub fn error(&mut self, loc: Loc, msg: &str) {
        if self.errors.len() >= MAX_ERRORS {
            self.dropped += 1;
            return;
        }
        let formatted = self.format(loc, msg);
        self.errors.push(formatted);
    }

    /// Format a fatal error for returning as `Err` from lexer/parser.
    pub fn fatal(&self, loc: Loc, msg: &str) -> String {
        self.format(loc, msg)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_includes_file_line_col() {
        let mut diags = Diagnostics::new();
        let f = diags.add_file("hello.adb");
        let loc = Loc::new(f, 3, 7);
        assert_eq!(
            diags.format(loc, "undefined identifier"),
            "hello.adb:3:7: undefined identifier"
        );
    }

    #[test]
    fn test_error_cap_drops_excess() {
        let mut diags = Diagnostics::new();
        let f = diags.add_file("x.adb");
        for i in 0..150 {
            diags.error(Loc::new(f, i, 1), "boom");
        }
        assert_eq!(diags.error_count(), MAX_ERRORS);
    }
}
