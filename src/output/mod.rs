// Output formatting utilities: terminal messages, exit codes, JSON envelope

use is_terminal::IsTerminal;

// Colors for terminal output (when supported)
pub const RED: &str = "\x1b[0;31m";
pub const GREEN: &str = "\x1b[0;32m";
pub const YELLOW: &str = "\x1b[1;33m";
pub const BOLD: &str = "\x1b[1m";
pub const NC: &str = "\x1b[0m"; // No Color

/// Check if stdout is a terminal (for color output)
#[inline]
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Check if stderr is a terminal
#[inline]
fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// Print info message
pub fn info(msg: &str) {
    let color = if is_terminal() { GREEN } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    println!("{}[INFO]{} {}", color, reset, msg);
}

/// Print warning message
pub fn warn(msg: &str) {
    let color = if stderr_is_terminal() { YELLOW } else { "" };
    let reset = if stderr_is_terminal() { NC } else { "" };
    eprintln!("{}[WARN]{} {}", color, reset, msg);
}

/// Print error message
pub fn error(msg: &str) {
    let color = if stderr_is_terminal() { RED } else { "" };
    let reset = if stderr_is_terminal() { NC } else { "" };
    eprintln!("{}[ERROR]{} {}", color, reset, msg);
}

/// Print section header
pub fn header(msg: &str) {
    let bold = if is_terminal() { BOLD } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    println!("{}===>{} {}", bold, reset, msg);
}

/// Exit codes
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_FILE_NOT_FOUND: i32 = 4;
pub const EXIT_VALIDATION: i32 = 5;
pub const EXIT_NOT_FOUND: i32 = 6;

// ============================================================================
// Error Codes and Remediation
// ============================================================================

/// Error codes for JSON error responses
pub const E_FILE_NOT_FOUND: &str = "E001";
pub const E_METHOD_NOT_FOUND: &str = "E002";
pub const E_PARSE: &str = "E003";
pub const E_COMPILE: &str = "E004";
pub const E_INVALID_INPUT: &str = "E006";
pub const E_WORKER: &str = "E007";

/// Common remediation messages
pub const R_HINT_PATHS: &str = "Run 'condtrace paths --file FILE' to list the methods that were analyzed";
pub const R_HINT_SYNTAX: &str = "Check the reported line; sources must be a Java class or a single method";
pub const R_HINT_SUBSET: &str =
    "Rewrite the reported constructs (switch, lambdas, ...) with if/else and loops";
pub const R_HINT_TUPLES: &str = "Tuples are literals such as \"[5, 3]\" or \"[[1, 2], {\\\"x\\\": 1}]\"";

/// JSON output wrapper
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    pub execution_id: String,
    pub tool: String,
    pub timestamp: String,
    pub data: T,
}

impl<T: serde::Serialize> JsonResponse<T> {
    pub fn new(data: T) -> Self {
        let now = chrono::Utc::now();
        let exec_id = format!("{:x}-{}", now.timestamp(), std::process::id());

        JsonResponse {
            schema_version: "1.0.0".to_string(),
            execution_id: exec_id,
            tool: "condtrace".to_string(),
            timestamp: now.to_rfc3339(),
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Error response format for JSON mode
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl JsonError {
    pub fn new(category: &str, message: &str, code: &str) -> Self {
        JsonError {
            error: category.to_string(),
            message: message.to_string(),
            code: code.to_string(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::new("FileNotFound", &format!("File not found: {}", path), E_FILE_NOT_FOUND)
    }

    /// Method not found error with remediation
    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            "MethodNotFound",
            &format!("Method '{}' not found in source", name),
            E_METHOD_NOT_FOUND,
        )
        .with_remediation(R_HINT_PATHS)
    }

    pub fn parse_failed(message: &str) -> Self {
        Self::new("ParseError", message, E_PARSE).with_remediation(R_HINT_SYNTAX)
    }

    /// One message line per diagnostic
    pub fn compile_failed(diagnostics: &[String]) -> Self {
        Self::new(
            "CompileError",
            &format!("Compilation failed:\n{}", diagnostics.join("\n")),
            E_COMPILE,
        )
        .with_remediation(R_HINT_SUBSET)
    }

    pub fn invalid_input(message: &str) -> Self {
        Self::new("InvalidInput", message, E_INVALID_INPUT).with_remediation(R_HINT_TUPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let data = vec!["item1", "item2"];
        let response = JsonResponse::new(data);
        let json = response.to_json();
        assert!(json.contains("\"tool\":\"condtrace\""));
        assert!(json.contains("\"data\":[\"item1\",\"item2\"]"));
    }

    #[test]
    fn test_json_error_remediation() {
        let err = JsonError::compile_failed(&["line 3: unsupported statement `switch_expression`".to_string()]);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"E004\""));
        assert!(json.contains("\"remediation\""));

        let plain = serde_json::to_string(&JsonError::file_not_found("x.java")).unwrap();
        assert!(!plain.contains("remediation"));
    }
}
