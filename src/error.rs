//! Error types for condtrace
//!
//! Library operations return [`AnalysisError`]; the binary wraps them in
//! `anyhow` and maps each variant onto an exit code.

use thiserror::Error;

use crate::syntax::ParseError;

/// Main error type for analysis and harness operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Source did not parse as a Java compilation unit or method snippet
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Source parsed but the execution backend cannot run it
    #[error("Compilation failed:\n{}", .diagnostics.join("\n"))]
    Compile { diagnostics: Vec<String> },

    /// A worker thread could not be spawned or died outside of a tuple
    #[error("Worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// Create a compile error from a single diagnostic
    pub fn compile(message: impl Into<String>) -> Self {
        AnalysisError::Compile {
            diagnostics: vec![message.into()],
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        AnalysisError::Worker(message.into())
    }
}

/// Result type alias for condtrace operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_lists_diagnostics() {
        let err = AnalysisError::Compile {
            diagnostics: vec![
                "line 3: unsupported construct `switch_expression`".to_string(),
                "no public method found".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("Compilation failed:"));
        assert!(text.contains("switch_expression"));
        assert!(text.contains("no public method found"));
    }

    #[test]
    fn test_parse_error_converts() {
        let parse = ParseError {
            line: 2,
            column: 5,
            construct: "missing `;`".to_string(),
        };
        let err: AnalysisError = parse.into();
        assert_eq!(err.to_string(), "Parse error: line 2, column 5: missing `;`");
    }
}
