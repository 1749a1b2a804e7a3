// condtrace: branch-condition extraction and line coverage for Java methods
//
// Parses a Java method, lists the conditions guarding each branch target in
// terms of its input parameters, runs input tuples against it and explains
// why an input misses a path.

pub mod cli;
pub mod config;
pub mod error;
pub mod explain;
pub mod expr;
pub mod harness;
pub mod logic;
pub mod output;
pub mod syntax;

pub use config::HarnessConfig;
pub use error::{AnalysisError, Result};
pub use explain::{evaluate_failure_reason, Explanation};
pub use expr::eval::evaluate;
pub use expr::Expression;
pub use harness::{run_with_coverage, CoverageReport, Harness};
pub use logic::{extract_paths, BindingTable, PathFact};
pub use syntax::{ParseError, SourceUnit};
