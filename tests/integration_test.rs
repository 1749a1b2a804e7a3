//! Integration tests for the condtrace commands
//!
//! Each test writes a Java source into a temp directory and drives the built
//! binary. They verify:
//! - CLI parsing works correctly
//! - Output format is correct (human/json/pretty)
//! - Error handling maps onto the documented exit codes
//!
//! For deeper functional testing, see the unit tests next to each module.

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const MAX_OF: &str = "public class Max {
    public String pick(int a, int b) {
        if (a > b) {
            return \"A\";
        } else {
            return \"B\";
        }
    }
}
";

const DIFF: &str = "public class Diff {
    public int sign(int a, int b) {
        int sum = a + b;
        int product = a * b;
        int diff = sum - product;
        if (diff > 0) {
            return 1;
        }
        return 0;
    }
}
";

/// Test context: a temp directory for sources and the binary path
struct TestContext {
    bin: PathBuf,
    dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        // Use CARGO_BIN_EXE_condtrace if available (for cargo test), otherwise fallback
        let bin = option_env!("CARGO_BIN_EXE_condtrace")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let debug_path = PathBuf::from("./target/debug/condtrace");
                if debug_path.exists() {
                    debug_path
                } else {
                    PathBuf::from("./target/release/condtrace")
                }
            });

        Self {
            bin,
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write `contents` to `name` inside the temp directory
    fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().to_string()
    }

    fn missing(&self) -> String {
        self.dir.path().join("Missing.java").to_string_lossy().to_string()
    }

    /// Run condtrace with the given arguments
    fn run_command(&self, args: &[&str]) -> TestOutput {
        let output = Command::new(&self.bin)
            .args(args)
            .env_remove("CONDTRACE_TIMEOUT_MS")
            .current_dir(self.dir.path())
            .output()
            .expect("Failed to run condtrace");

        TestOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

/// Output from running a condtrace command
struct TestOutput {
    stdout: String,
    stderr: String,
    status: std::process::ExitStatus,
}

impl TestOutput {
    fn success(&self) -> bool {
        self.status.success()
    }

    fn code(&self) -> Option<i32> {
        self.status.code()
    }

    fn stdout_contains(&self, s: &str) -> bool {
        self.stdout.contains(s)
    }

    fn stderr_contains(&self, s: &str) -> bool {
        self.stderr.contains(s)
    }
}

// ============================================================================
// paths / bindings
// ============================================================================

#[test]
fn test_paths_command() {
    let ctx = TestContext::new();
    let file = ctx.write("Max.java", MAX_OF);
    let output = ctx.run_command(&["paths", "--file", &file]);

    assert!(output.success(), "paths should succeed: {}", output.stderr);
    assert_eq!(
        output.stdout.lines().collect::<Vec<_>>(),
        vec!["4|PATH_TO_IF: (a > b)", "6|PATH_TO_ELSE: !(a > b)"]
    );
}

#[test]
fn test_paths_command_json() {
    let ctx = TestContext::new();
    let file = ctx.write("Diff.java", DIFF);
    let output = ctx.run_command(&["paths", "--file", &file, "--output", "json"]);

    assert!(output.success());
    let json: serde_json::Value = serde_json::from_str(output.stdout.trim()).unwrap();
    assert_eq!(json["tool"], "condtrace");
    let facts = json["data"].as_array().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0]["line"], 7);
    assert_eq!(
        facts[0]["description"],
        "PATH_TO_IF: (diff > 0) [SUB_LOGIC: diff = (a + b) - (a * b)]"
    );
    assert_eq!(facts[0]["id"].as_str().unwrap().len(), 64);
}

#[test]
fn test_paths_unknown_method() {
    let ctx = TestContext::new();
    let file = ctx.write("Max.java", MAX_OF);
    let output = ctx.run_command(&["paths", "--file", &file, "--method", "nope"]);

    assert_eq!(output.code(), Some(6));
    assert!(output.stderr_contains("Method 'nope' not found"));
}

#[test]
fn test_paths_parse_error_is_validation_failure() {
    let ctx = TestContext::new();
    let file = ctx.write("Broken.java", "public class Broken {\n  int f( {\n}\n");
    let output = ctx.run_command(&["paths", "--file", &file]);

    assert_eq!(output.code(), Some(5));
    assert!(output.stderr_contains("Parse error") || output.stderr_contains("line"));
}

#[test]
fn test_missing_file_exit_code() {
    let ctx = TestContext::new();
    let missing = ctx.missing();
    let output = ctx.run_command(&["paths", "--file", &missing]);

    assert_eq!(output.code(), Some(4));
    assert!(output.stderr_contains("File not found"));
}

#[test]
fn test_missing_file_json_error() {
    let ctx = TestContext::new();
    let missing = ctx.missing();
    let output = ctx.run_command(&["--output", "json", "run", "--file", &missing, "--input", "[1]"]);

    assert_eq!(output.code(), Some(4));
    assert!(output.stdout_contains("\"code\":\"E001\""));
    assert!(output.stdout_contains("\"error\":\"FileNotFound\""));
}

#[test]
fn test_bindings_command() {
    let ctx = TestContext::new();
    let file = ctx.write("Diff.java", DIFF);
    let output = ctx.run_command(&["bindings", "--file", &file]);

    assert!(output.success());
    assert!(output.stdout_contains("sign(a, b)"));
    assert!(output.stdout_contains("sum = a + b"));
    assert!(output.stdout_contains("diff = sum - product"));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_full_coverage() {
    let ctx = TestContext::new();
    let file = ctx.write("Max.java", MAX_OF);
    let output = ctx.run_command(&["run", "--file", &file, "--input", "[5, 3]", "--input", "[1, 2]"]);

    assert!(output.success(), "run should succeed: {}", output.stderr);
    assert!(output.stdout_contains("REAL EXECUTION REPORT"));
    assert!(output.stdout_contains("Input: [5, 3] -> RETURNED: A"));
    assert!(output.stdout_contains("Input: [1, 2] -> RETURNED: B"));
    assert!(output.stdout_contains("--- VISUAL COVERAGE ---"));
    assert!(output.stdout_contains("[HIT]   3:         if (a > b) {"));
    assert!(output.stdout_contains("COVERAGE: 100.00%"));
}

#[test]
fn test_run_skips_malformed_tuple() {
    let ctx = TestContext::new();
    let file = ctx.write("Max.java", MAX_OF);
    let output = ctx.run_command(&["run", "--file", &file, "--input", "[5]", "--input", "[5, 3]"]);

    assert!(output.success());
    assert!(output.stdout_contains("Input: [5] -> SKIPPED"));
    assert!(output.stdout_contains("[MISS]   6:"));
    assert!(output.stdout_contains("COVERAGE: 66.67%"));
}

#[test]
fn test_run_inputs_file_and_json_report() {
    let ctx = TestContext::new();
    let file = ctx.write("Max.java", MAX_OF);
    let inputs = ctx.write("inputs.json", "[\"[5, 3]\", [1, 2]]");
    let output = ctx.run_command(&["run", "--file", &file, "--inputs-file", &inputs, "--output", "pretty"]);

    assert!(output.success());
    let json: serde_json::Value = serde_json::from_str(output.stdout.trim()).unwrap();
    let report = &json["data"];
    assert_eq!(report["engine"], "interpreter");
    assert_eq!(report["entry"], "Max.pick(int, int)");
    assert_eq!(report["tracked"], 3);
    assert_eq!(report["hit"], 3);
    assert_eq!(report["executions"][1]["input"], "[1, 2]");
    assert_eq!(report["executions"][1]["outcome"]["kind"], "Returned");
}

#[test]
fn test_run_timeout_flag() {
    let ctx = TestContext::new();
    let file = ctx.write(
        "Spin.java",
        "public class Spin {\n    public int spin(int n) {\n        while (n > 0) {\n            n = n + 0;\n        }\n        return n;\n    }\n}\n",
    );
    let output = ctx.run_command(&["run", "--file", &file, "--input", "[1]", "--timeout-ms", "150"]);

    assert!(output.success());
    assert!(output.stdout_contains("Input: [1] -> ERROR: INFINITE LOOP DETECTED (Timeout)"));
}

#[test]
fn test_run_compile_error_is_validation_failure() {
    let ctx = TestContext::new();
    let file = ctx.write(
        "Sw.java",
        "public class Sw {\n    public int f(int a) {\n        switch (a) {\n            case 1: return 1;\n            default: return 0;\n        }\n    }\n}\n",
    );
    let output = ctx.run_command(&["run", "--file", &file, "--input", "[1]"]);

    assert_eq!(output.code(), Some(5));
    assert!(output.stderr_contains("Compilation failed"));
    assert!(output.stderr_contains("line 3"));
}

// ============================================================================
// explain
// ============================================================================

#[test]
fn test_explain_with_fallback_params() {
    let ctx = TestContext::new();
    let output = ctx.run_command(&[
        "explain",
        "--path",
        "7|PATH_TO_IF: !(diff > 0) [SUB_LOGIC: diff = (a + b) - (a * b)]",
        "--inputs",
        "[2, 3]",
    ]);

    assert!(output.success());
    assert_eq!(
        output.stdout.trim(),
        "Condition '(a + b) - (a * b) <= 0' [(2 + 3) - (2 * 3) = -1] - Non-positive value required (needs <= 0)"
    );
}

#[test]
fn test_explain_params_from_file() {
    let ctx = TestContext::new();
    let file = ctx.write(
        "Range.java",
        "public class Range {\n    public int clamp(int low, int high) {\n        if (low > high) {\n            return low;\n        }\n        return high;\n    }\n}\n",
    );
    let output = ctx.run_command(&[
        "explain",
        "--path",
        "4|PATH_TO_IF: (low > high)",
        "--inputs",
        "[1, 9]",
        "--file",
        &file,
        "--output",
        "json",
    ]);

    assert!(output.success());
    let json: serde_json::Value = serde_json::from_str(output.stdout.trim()).unwrap();
    assert_eq!(json["data"]["values"]["low"], 1.0);
    assert_eq!(json["data"]["values"]["high"], 9.0);
}

// ============================================================================
// General
// ============================================================================

#[test]
fn test_help_flag() {
    let ctx = TestContext::new();
    let output = ctx.run_command(&["--help"]);

    assert!(output.success(), "--help should succeed");
    assert!(output.stdout_contains("condtrace"));
    assert!(output.stdout_contains("Usage"));
}

#[test]
fn test_no_command_error() {
    let ctx = TestContext::new();
    let output = ctx.run_command(&[]);

    assert_eq!(output.code(), Some(2), "missing subcommand is a usage error");
}
