//! Line-hit probes shared between the controller and one worker

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// One hit counter per source line
///
/// A worker owns its probe set for the lifetime of one invocation; the
/// controller reads a snapshot when the worker finishes or times out.
#[derive(Debug)]
pub struct LineProbes {
    counters: Vec<AtomicU64>,
}

impl LineProbes {
    /// Probes for lines `1..=line_count`
    pub fn new(line_count: usize) -> Self {
        Self {
            counters: (0..=line_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Record a hit; lines outside the probed range are ignored
    #[inline]
    pub fn hit(&self, line: usize) {
        if let Some(counter) = self.counters.get(line) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, line: usize) -> u64 {
        self.counters
            .get(line)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Lines hit at least once so far
    pub fn snapshot(&self) -> BTreeSet<usize> {
        self.counters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.load(Ordering::Relaxed) > 0)
            .map(|(line, _)| line)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_and_snapshot() {
        let probes = LineProbes::new(5);
        probes.hit(2);
        probes.hit(2);
        probes.hit(5);
        probes.hit(42);

        assert_eq!(probes.count(2), 2);
        assert_eq!(probes.count(3), 0);
        assert_eq!(probes.snapshot().into_iter().collect::<Vec<_>>(), vec![2, 5]);
    }
}
