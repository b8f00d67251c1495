//! Operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a tree's counters and shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Nodes loaded from the store.
    pub reads: u64,
    /// Nodes written to the store on commit.
    pub writes: u64,
    pub splits: u64,
    pub forced_reinsertions: u64,
    /// Underfull nodes dissolved by deletions.
    pub condensed_nodes: u64,
    /// Entries reported to visitors.
    pub query_results: u64,
    pub entries: u64,
    pub height: u32,
    pub nodes: u64,
}

/// Internal statistics tracking
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub splits: AtomicU64,
    pub forced_reinsertions: AtomicU64,
    pub condensed_nodes: AtomicU64,
    pub query_results: AtomicU64,
}

impl Counters {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: u64, height: u32, nodes: u64) -> Statistics {
        Statistics {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            forced_reinsertions: self.forced_reinsertions.load(Ordering::Relaxed),
            condensed_nodes: self.condensed_nodes.load(Ordering::Relaxed),
            query_results: self.query_results.load(Ordering::Relaxed),
            entries,
            height,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = Counters::default();
        Counters::add(&counters.reads, 3);
        Counters::add(&counters.splits, 1);
        Counters::add(&counters.reads, 2);

        let stats = counters.snapshot(10, 2, 4);
        assert_eq!(stats.reads, 5);
        assert_eq!(stats.splits, 1);
        assert_eq!(stats.writes, 0);
        assert_eq!((stats.entries, stats.height, stats.nodes), (10, 2, 4));
    }
}
