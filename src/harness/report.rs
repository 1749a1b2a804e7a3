//! Coverage report assembly and rendering

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Coverage status of one source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineStatus {
    /// Not executable, or not tracked
    Empty,
    Miss,
    Hit,
}

impl LineStatus {
    /// Listing prefix; the two tracked prefixes carry their own trailing space
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Empty => "      ",
            Self::Miss => "[MISS] ",
            Self::Hit => "[HIT] ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub line: usize,
    pub status: LineStatus,
    pub text: String,
}

/// What happened to one input tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Outcome {
    /// Rendered return value; `void` for void methods
    Returned(String),
    Threw(String),
    TimedOut,
    /// The tuple did not parse and was never run
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    /// `[a, b]` rendering of the parsed tuple, or the raw text when skipped
    pub input: String,
    pub outcome: Outcome,
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input: {}", self.input)?;
        match &self.outcome {
            Outcome::Returned(value) => write!(f, " -> RETURNED: {}", value),
            Outcome::Threw(message) => write!(f, " -> EXCEPTION: {}", message),
            Outcome::TimedOut => write!(f, " -> ERROR: INFINITE LOOP DETECTED (Timeout)"),
            Outcome::Skipped(reason) => write!(f, " -> SKIPPED: {}", reason),
        }
    }
}

/// Result of one harness run; never mutated after assembly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    /// Name of the execution backend that produced the run
    pub engine: String,
    /// Signature of the invoked method
    pub entry: String,
    pub lines: Vec<CoverageEntry>,
    pub executions: Vec<ExecutionRecord>,
    pub hit: usize,
    pub tracked: usize,
    /// `hit / tracked * 100`, 0 when nothing is tracked
    pub ratio: f64,
}

impl CoverageReport {
    /// Classify every line of `source` against the tracked and hit line sets
    pub fn assemble(
        engine: &str,
        entry: String,
        source: &str,
        tracked: &BTreeSet<usize>,
        hits: &BTreeSet<usize>,
        executions: Vec<ExecutionRecord>,
    ) -> Self {
        let lines: Vec<CoverageEntry> = source_lines(source)
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                let line = idx + 1;
                let status = if !tracked.contains(&line) {
                    LineStatus::Empty
                } else if hits.contains(&line) {
                    LineStatus::Hit
                } else {
                    LineStatus::Miss
                };
                CoverageEntry {
                    line,
                    status,
                    text: text.to_string(),
                }
            })
            .collect();

        let hit = lines.iter().filter(|e| e.status == LineStatus::Hit).count();
        let tracked = lines.iter().filter(|e| e.status != LineStatus::Empty).count();

        Self {
            engine: engine.to_string(),
            entry,
            lines,
            executions,
            hit,
            tracked,
            ratio: coverage_ratio(hit, tracked),
        }
    }

    /// Line numbers with HIT status
    pub fn hit_lines(&self) -> BTreeSet<usize> {
        self.lines
            .iter()
            .filter(|e| e.status == LineStatus::Hit)
            .map(|e| e.line)
            .collect()
    }

    /// Annotated source listing alone
    pub fn visual(&self) -> String {
        self.lines
            .iter()
            .map(|e| format!("{} {:2}: {}\n", e.status.prefix(), e.line, e.text))
            .collect()
    }

    /// Execution log, annotated listing and summary
    pub fn render(&self) -> String {
        let mut out = format!("REAL EXECUTION REPORT ({} engine):\n", self.engine);
        for record in &self.executions {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out.push_str("\n--- VISUAL COVERAGE ---\n");
        out.push_str(&self.visual());
        out.push_str(&format!("\nSUMMARY\nCOVERAGE: {:.2}%\n", self.ratio));
        out
    }
}

/// Percentage of tracked lines that were hit
pub fn coverage_ratio(hit: usize, tracked: usize) -> f64 {
    if tracked == 0 {
        0.0
    } else {
        hit as f64 / tracked as f64 * 100.0
    }
}

/// Lines of `source` split on `\n`, trailing empty lines dropped
fn source_lines(source: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = source.split('\n').collect();
    while lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    lines
}
