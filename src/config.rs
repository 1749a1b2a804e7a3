// Harness configuration and its resolution from CLI flags and environment

use std::time::Duration;

/// Environment variable overriding the per-tuple timeout, in milliseconds
pub const TIMEOUT_ENV: &str = "CONDTRACE_TIMEOUT_MS";

/// Per-tuple timeout used when nothing overrides it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Limits and knobs for the instrumented execution harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Wall-clock budget for one input tuple
    pub timeout: Duration,
    /// Stack reserved for each worker thread
    pub worker_stack_size: usize,
    /// Nested calls allowed before the subject sees a `StackOverflowError`
    pub max_call_depth: usize,
    /// Method to invoke; `None` picks the first public method of the first top-level class
    pub entry_method: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            worker_stack_size: 64 * 1024 * 1024,
            max_call_depth: 1000,
            entry_method: None,
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with a custom per-tuple timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a configuration with a custom worker stack size
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = bytes;
        self
    }

    /// Create a configuration with a custom call depth limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Create a configuration that invokes the named method
    pub fn with_entry_method(mut self, name: impl Into<String>) -> Self {
        self.entry_method = Some(name.into());
        self
    }
}

/// Resolve the per-tuple timeout from multiple sources
///
/// Priority: CLI arg > CONDTRACE_TIMEOUT_MS env var > 2 seconds.
/// An env value that is not a whole number of milliseconds is an error.
pub fn resolve_timeout(cli_ms: Option<u64>) -> anyhow::Result<Duration> {
    let env_ms = std::env::var(TIMEOUT_ENV).ok();
    timeout_from(cli_ms, env_ms.as_deref())
}

fn timeout_from(cli_ms: Option<u64>, env_ms: Option<&str>) -> anyhow::Result<Duration> {
    if let Some(ms) = cli_ms {
        return Ok(Duration::from_millis(ms));
    }
    match env_ms {
        Some(raw) => {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                anyhow::anyhow!("{} must be a number of milliseconds, got '{}'", TIMEOUT_ENV, raw)
            })?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(DEFAULT_TIMEOUT),
    }
}
