// CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};

/// condtrace - branch conditions and line coverage for Java methods
///
/// Extracts the conditions guarding every branch target of a method, runs
/// concrete inputs against it and explains why an input misses a path.
#[derive(Parser, Debug, Clone)]
#[command(name = "condtrace")]
#[command(author, version, about)]
#[command(long_about = "condtrace extracts path conditions from Java methods and measures them.

  paths     every branch target with the conditions that reach it,
            locals substituted back to input parameters
  bindings  the variable binding table behind that substitution
  run       execute input tuples and report line coverage
  explain   evaluate a path's conditions against one input")]
pub struct Cli {
    /// Output format
    #[arg(global = true, long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Human,
    /// Compact JSON for programmatic consumption
    Json,
    /// Formatted JSON with indentation
    Pretty,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List path facts (`line|description`) for every method
    Paths(PathsArgs),

    /// Show the variable binding table of each method
    Bindings(BindingsArgs),

    /// Run input tuples and report line coverage
    Run(RunArgs),

    /// Explain which path conditions an input fails
    Explain(ExplainArgs),
}

// ============================================================================
// Analysis Commands
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct PathsArgs {
    /// Java source file (compilation unit or bare method)
    #[arg(long)]
    pub file: String,

    /// Only facts of this method
    #[arg(long)]
    pub method: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct BindingsArgs {
    /// Java source file (compilation unit or bare method)
    #[arg(long)]
    pub file: String,

    /// Only the table of this method
    #[arg(long)]
    pub method: Option<String>,
}

// ============================================================================
// Execution Commands
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Java source file (compilation unit or bare method)
    #[arg(long)]
    pub file: String,

    /// Input tuple literal, e.g. "[5, 3]" (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// JSON array of tuples; each element is a literal string or an array
    #[arg(long)]
    pub inputs_file: Option<String>,

    /// Per-tuple timeout in milliseconds
    #[arg(long, env = "CONDTRACE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Method to invoke instead of the first public one
    #[arg(long)]
    pub method: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExplainArgs {
    /// Path description, with or without the `line|` prefix
    #[arg(long)]
    pub path: String,

    /// JSON array of input values
    #[arg(long)]
    pub inputs: String,

    /// Comma-separated parameter names
    #[arg(long, value_delimiter = ',', conflicts_with = "file")]
    pub params: Vec<String>,

    /// Take parameter names from this source file
    #[arg(long)]
    pub file: Option<String>,

    /// Method whose parameters name the inputs (with --file)
    #[arg(long, requires = "file")]
    pub method: Option<String>,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Collect input tuples from repeated `--input` flags and an optional JSON file
///
/// File tuples follow the flag tuples. A JSON element that is a string is used
/// as the literal text; anything else is re-serialized.
pub fn resolve_tuples(inputs: &[String], inputs_json: Option<&str>) -> anyhow::Result<Vec<String>> {
    let mut tuples = inputs.to_vec();
    if let Some(text) = inputs_json {
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("inputs file is not valid JSON: {}", e))?;
        let serde_json::Value::Array(items) = parsed else {
            anyhow::bail!("inputs file must hold a JSON array of tuples");
        };
        for item in items {
            match item {
                serde_json::Value::String(literal) => tuples.push(literal),
                other => tuples.push(other.to_string()),
            }
        }
    }
    Ok(tuples)
}

// ============================================================================
// Command Handlers
// ============================================================================

pub mod cmds {
    use super::*;
    use crate::config::{resolve_timeout, HarnessConfig};
    use crate::error::AnalysisError;
    use crate::explain;
    use crate::harness::Harness;
    use crate::logic;
    use crate::output::{self, JsonError, JsonResponse};
    use crate::syntax::SourceUnit;
    use anyhow::{Context, Result};
    use serde::Serialize;
    use std::path::Path;

    fn emit<T: Serialize>(cli: &Cli, data: T, human: impl FnOnce(&T)) {
        match cli.output {
            OutputFormat::Human => human(&data),
            OutputFormat::Json => println!("{}", JsonResponse::new(data).to_json()),
            OutputFormat::Pretty => println!("{}", JsonResponse::new(data).to_pretty_json()),
        }
    }

    /// Report `err` in the selected format and exit with `code`
    fn fail(cli: &Cli, err: JsonError, code: i32) -> ! {
        match cli.output {
            OutputFormat::Human => {
                output::error(&err.message);
                if let Some(hint) = &err.remediation {
                    output::info(hint);
                }
            }
            OutputFormat::Json => println!("{}", JsonResponse::new(err).to_json()),
            OutputFormat::Pretty => println!("{}", JsonResponse::new(err).to_pretty_json()),
        }
        std::process::exit(code);
    }

    fn fail_analysis(cli: &Cli, err: AnalysisError) -> ! {
        match err {
            AnalysisError::Parse(e) => fail(cli, JsonError::parse_failed(&e.to_string()), output::EXIT_VALIDATION),
            AnalysisError::Compile { diagnostics } => {
                fail(cli, JsonError::compile_failed(&diagnostics), output::EXIT_VALIDATION)
            }
            other => fail(
                cli,
                JsonError::new("AnalysisError", &other.to_string(), output::E_WORKER),
                output::EXIT_ERROR,
            ),
        }
    }

    fn read_file(cli: &Cli, path: &str) -> Result<String> {
        if !Path::new(path).exists() {
            fail(cli, JsonError::file_not_found(path), output::EXIT_FILE_NOT_FOUND);
        }
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
    }

    fn parse_unit(cli: &Cli, path: &str) -> Result<SourceUnit> {
        let source = read_file(cli, path)?;
        match SourceUnit::parse(&source) {
            Ok(unit) => Ok(unit),
            Err(e) => fail_analysis(cli, e.into()),
        }
    }

    fn check_method(cli: &Cli, unit: &SourceUnit, method: Option<&str>) {
        if let Some(name) = method {
            if !unit.methods().any(|(_, m)| m.name == name && m.body.is_some()) {
                fail(cli, JsonError::method_not_found(name), output::EXIT_NOT_FOUND);
            }
        }
    }

    pub fn paths(args: PathsArgs, cli: &Cli) -> Result<()> {
        let unit = parse_unit(cli, &args.file)?;
        check_method(cli, &unit, args.method.as_deref());

        let facts: Vec<_> = logic::extract_unit(&unit)
            .into_iter()
            .filter(|f| args.method.as_deref().map_or(true, |m| f.method == m))
            .collect();

        emit(cli, facts, |facts| {
            if facts.is_empty() {
                output::info("No branch targets found");
            }
            for fact in facts {
                println!("{}", fact.entry());
            }
        });
        Ok(())
    }

    #[derive(Serialize)]
    struct MethodBindings {
        method: String,
        table: logic::BindingTable,
    }

    pub fn bindings(args: BindingsArgs, cli: &Cli) -> Result<()> {
        let unit = parse_unit(cli, &args.file)?;
        check_method(cli, &unit, args.method.as_deref());

        let tables: Vec<MethodBindings> = logic::binding_tables(&unit, args.method.as_deref())
            .into_iter()
            .map(|(method, table)| MethodBindings { method, table })
            .collect();

        emit(cli, tables, |tables| {
            for entry in tables {
                output::header(&format!("{}({})", entry.method, entry.table.inputs().join(", ")));
                if entry.table.is_empty() {
                    println!("  (no bindings)");
                }
                for binding in entry.table.entries() {
                    println!("  {:>4}: {} = {}", binding.line, binding.name, binding.value);
                }
                println!();
            }
        });
        Ok(())
    }

    pub fn run(args: RunArgs, cli: &Cli) -> Result<()> {
        let source = read_file(cli, &args.file)?;
        let inputs_json = match &args.inputs_file {
            Some(path) => Some(read_file(cli, path)?),
            None => None,
        };
        let tuples = match resolve_tuples(&args.inputs, inputs_json.as_deref()) {
            Ok(tuples) => tuples,
            Err(e) => fail(cli, JsonError::invalid_input(&e.to_string()), output::EXIT_USAGE),
        };
        if tuples.is_empty() {
            output::warn("No input tuples given; reporting static coverage only");
        }

        let timeout = match resolve_timeout(args.timeout_ms) {
            Ok(timeout) => timeout,
            Err(e) => fail(cli, JsonError::invalid_input(&e.to_string()), output::EXIT_USAGE),
        };
        let mut config = HarnessConfig::default().with_timeout(timeout);
        if let Some(method) = &args.method {
            config = config.with_entry_method(method.clone());
        }

        let report = match Harness::new(config).run(&source, &tuples) {
            Ok(report) => report,
            Err(e) => fail_analysis(cli, e),
        };

        emit(cli, report, |report| print!("{}", report.render()));
        Ok(())
    }

    pub fn explain(args: ExplainArgs, cli: &Cli) -> Result<()> {
        let params = match &args.file {
            Some(file) => {
                let unit = parse_unit(cli, file)?;
                check_method(cli, &unit, args.method.as_deref());
                let names = unit
                    .methods()
                    .filter(|(_, m)| m.body.is_some())
                    .find(|(_, m)| args.method.as_deref().map_or(m.is_public || unit.wrapped, |name| m.name == name))
                    .map(|(_, m)| m.param_names())
                    .unwrap_or_default();
                names
            }
            None => args.params.iter().map(|p| p.trim().to_string()).collect(),
        };

        let explanation = explain::explain(&args.path, &args.inputs, &params);
        emit(cli, explanation, |explanation| println!("{}", explanation));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tuples_flags_only() {
        let tuples = resolve_tuples(&["[1, 2]".to_string()], None).unwrap();
        assert_eq!(tuples, vec!["[1, 2]"]);
    }

    #[test]
    fn test_resolve_tuples_appends_file_entries() {
        let json = r#"["[3, 4]", [5, 6], [{"x": 1}]]"#;
        let tuples = resolve_tuples(&["[1, 2]".to_string()], Some(json)).unwrap();
        assert_eq!(tuples, vec!["[1, 2]", "[3, 4]", "[5,6]", r#"[{"x":1}]"#]);
    }

    #[test]
    fn test_resolve_tuples_rejects_non_array() {
        assert!(resolve_tuples(&[], Some("{\"a\": 1}")).is_err());
        assert!(resolve_tuples(&[], Some("not json")).is_err());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "condtrace", "--output", "json", "run", "--file", "A.java", "--input", "[1]", "--input", "[2]",
            "--timeout-ms", "500",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.inputs, vec!["[1]", "[2]"]);
                assert_eq!(args.timeout_ms, Some(500));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_explain_params_list() {
        let cli = Cli::try_parse_from([
            "condtrace", "explain", "--path", "IF_TRUE: (a > b)", "--inputs", "[1, 2]", "--params", "a,b",
        ])
        .unwrap();
        match cli.command {
            Commands::Explain(args) => assert_eq!(args.params, vec!["a", "b"]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
