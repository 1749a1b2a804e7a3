//! Instrumented execution harness
//!
//! Compiles the subject through an [`ExecutionBackend`], then runs each input
//! tuple on its own worker thread under a timeout. Every worker gets a fresh
//! [`LineProbes`] set and a cancel flag; when the controller stops waiting it
//! raises the flag, keeps whatever lines the worker hit so far and moves on.
//! The worker itself is detached, not joined, since a non-yielding loop may
//! never observe the flag.

pub mod interp;
pub mod literal;
pub mod probes;
pub mod report;
pub mod value;

pub use interp::InterpreterBackend;
pub use literal::{parse_tuple, render_tuple, InputValue, LiteralError, RecordType};
pub use probes::LineProbes;
pub use report::{coverage_ratio, CoverageEntry, CoverageReport, ExecutionRecord, LineStatus, Outcome};

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use crate::config::HarnessConfig;
use crate::error::{AnalysisError, Result};
use crate::expr::JavaType;
use crate::syntax::Param;

/// The method a compiled unit invokes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySignature {
    pub class: String,
    pub method: String,
    pub params: Vec<Param>,
    pub is_static: bool,
}

impl EntrySignature {
    pub fn param_types(&self) -> Vec<JavaType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

impl fmt::Display for EntrySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        write!(f, "{}.{}({})", self.class, self.method, params.join(", "))
    }
}

/// How one invocation ended, as seen by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Returned(String),
    /// Message of the uncaught throwable
    Threw(String),
    /// The cancel flag was observed
    Cancelled,
}

/// A loaded subject, ready to be invoked from worker threads
pub trait CompiledUnit: Send + Sync {
    fn entry(&self) -> &EntrySignature;

    /// Classes whose public fields `{...}` literals may populate
    fn record_types(&self) -> &[RecordType];

    /// Lines carrying a probe
    fn executable_lines(&self) -> &BTreeSet<usize>;

    /// Run the entry method once; must poll `cancel` often enough to stop a runaway loop
    fn invoke(&self, args: &[InputValue], probes: &LineProbes, cancel: &AtomicBool) -> Invocation;
}

/// Compile + load step of the harness
pub trait ExecutionBackend {
    /// Short engine name shown in the report header
    fn name(&self) -> &'static str;

    /// All-or-nothing: any diagnostic fails with [`AnalysisError::Compile`]
    fn compile(&self, source: &str, config: &HarnessConfig) -> Result<Arc<dyn CompiledUnit>>;
}

pub struct Harness<B = InterpreterBackend> {
    backend: B,
    config: HarnessConfig,
}

impl Harness<InterpreterBackend> {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_backend(InterpreterBackend, config)
    }
}

impl<B: ExecutionBackend> Harness<B> {
    pub fn with_backend(backend: B, config: HarnessConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Compile `source` and run every tuple in order
    ///
    /// Only compilation can fail the run; per-tuple failures, timeouts and
    /// malformed tuples are recorded in the report.
    pub fn run(&self, source: &str, tuples: &[String]) -> Result<CoverageReport> {
        let compiled = self.backend.compile(source, &self.config)?;
        let entry = compiled.entry().clone();
        let params = entry.param_types();
        let line_count = source.split('\n').count();
        tracing::debug!(entry = %entry, tuples = tuples.len(), "starting harness run");

        let mut hits = BTreeSet::new();
        let mut executions = Vec::with_capacity(tuples.len());
        for raw in tuples {
            let args = match parse_tuple(raw, &params, compiled.record_types()) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(input = %raw, error = %e, "skipping malformed input tuple");
                    executions.push(ExecutionRecord {
                        input: raw.trim().to_string(),
                        outcome: Outcome::Skipped(e.to_string()),
                    });
                    continue;
                }
            };

            let input = render_tuple(&args);
            let (outcome, lines) = self.execute(&compiled, args, line_count)?;
            tracing::debug!(input = %input, outcome = ?outcome, lines = lines.len(), "tuple finished");
            hits.extend(lines);
            executions.push(ExecutionRecord { input, outcome });
        }

        Ok(CoverageReport::assemble(
            self.backend.name(),
            entry.to_string(),
            source,
            compiled.executable_lines(),
            &hits,
            executions,
        ))
    }

    fn execute(
        &self,
        compiled: &Arc<dyn CompiledUnit>,
        args: Vec<InputValue>,
        line_count: usize,
    ) -> Result<(Outcome, BTreeSet<usize>)> {
        let probes = Arc::new(LineProbes::new(line_count));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let worker = {
            let compiled = Arc::clone(compiled);
            let probes = Arc::clone(&probes);
            let cancel = Arc::clone(&cancel);
            thread::Builder::new()
                .name("condtrace-worker".to_string())
                .stack_size(self.config.worker_stack_size)
                .spawn(move || {
                    let result = compiled.invoke(&args, &probes, &cancel);
                    // the controller may have stopped listening
                    let _ = tx.send(result);
                })
                .map_err(|e| AnalysisError::worker(format!("failed to spawn worker: {}", e)))?
        };

        let outcome = match rx.recv_timeout(self.config.timeout) {
            Ok(invocation) => {
                let _ = worker.join();
                match invocation {
                    Invocation::Returned(value) => Outcome::Returned(value),
                    Invocation::Threw(message) => Outcome::Threw(message),
                    Invocation::Cancelled => Outcome::TimedOut,
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::SeqCst);
                tracing::warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "input tuple timed out, worker detached"
                );
                Outcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                let message = match worker.join() {
                    Err(panic) => panic_message(panic.as_ref()),
                    Ok(()) => "worker exited without a result".to_string(),
                };
                tracing::warn!(error = %message, "worker terminated abnormally");
                Outcome::Threw(message)
            }
        };

        Ok((outcome, probes.snapshot()))
    }
}

/// Run `tuples` against `source` with the interpreter backend
pub fn run_with_coverage(
    source: &str,
    tuples: &[String],
    config: &HarnessConfig,
) -> Result<CoverageReport> {
    Harness::new(config.clone()).run(source, tuples)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", text)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn tuples(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const MAX_OF: &str = "public class Max {\n    public String pick(int a, int b) {\n        if (a > b) {\n            return \"A\";\n        } else {\n            return \"B\";\n        }\n    }\n}\n";

    #[test]
    fn test_full_coverage_over_both_branches() {
        let report = run_with_coverage(MAX_OF, &tuples(&["[5, 3]", "[1, 2]"]), &HarnessConfig::default()).unwrap();
        assert_eq!(report.entry, "Max.pick(int, int)");
        assert_eq!(report.tracked, 3);
        assert_eq!(report.hit, 3);
        assert_eq!(report.ratio, 100.0);
        assert_eq!(report.executions[0].outcome, Outcome::Returned("A".to_string()));
        assert_eq!(report.executions[1].outcome, Outcome::Returned("B".to_string()));
    }

    #[test]
    fn test_partial_coverage_lists_miss() {
        let report = run_with_coverage(MAX_OF, &tuples(&["[5, 3]"]), &HarnessConfig::default()).unwrap();
        assert_eq!(report.hit_lines().into_iter().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(report.lines[5].status, LineStatus::Miss);
        assert!(report.visual().contains("[MISS]   6:             return \"B\";"));
    }

    #[test]
    fn test_timeout_is_recorded_and_run_continues() {
        let source = "public class Spin {\n    public int spin(int n) {\n        while (n > 0) {\n            n = n + 0;\n        }\n        return n;\n    }\n}\n";
        let config = HarnessConfig::default().with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let report = run_with_coverage(source, &tuples(&["[1]", "[0]"]), &config).unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.executions[0].outcome, Outcome::TimedOut);
        assert_eq!(report.executions[1].outcome, Outcome::Returned("0".to_string()));
        assert!(report.hit_lines().contains(&4));
    }

    #[test]
    fn test_exceptions_and_skips_are_recorded() {
        let source = "public class Div {\n    public int div(int a, int b) {\n        return a / b;\n    }\n}\n";
        let report = run_with_coverage(
            source,
            &tuples(&["[6, 0]", "[6, two]", "[6, 3]"]),
            &HarnessConfig::default(),
        )
        .unwrap();
        assert_eq!(report.executions[0].outcome, Outcome::Threw("/ by zero".to_string()));
        assert!(matches!(report.executions[1].outcome, Outcome::Skipped(_)));
        assert_eq!(report.executions[2].outcome, Outcome::Returned("2".to_string()));
        assert_eq!(report.executions[2].input, "[6, 3]");
    }

    #[test]
    fn test_compile_failure_aborts() {
        let err = run_with_coverage("public class Broken { public int f( { }", &tuples(&["[1]"]), &HarnessConfig::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Compile { .. }));
    }
}
