//! Allocation tally - per-thread counters of native heap traffic
//!
//! Every native allocator in this crate records here, so ownership tests
//! can assert that a release freed exactly what it should. Counters are
//! thread-local; a payload freed on another thread is counted there.

use std::cell::RefCell;
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    String,
    Array,
    SListNode,
    ListNode,
    HashTable,
    Object,
    Value,
    Closure,
    Error,
    ErrorCell,
    Boxed,
    Struct,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub allocated: u64,
    pub freed: u64,
}

thread_local! {
    static TALLY: RefCell<HashMap<HeapKind, Counts>> = RefCell::new(HashMap::new());
}

#[inline]
pub fn record_alloc(kind: HeapKind) {
    trace!(event = "heap_alloc", kind = ?kind);
    TALLY.with(|t| t.borrow_mut().entry(kind).or_default().allocated += 1);
}

#[inline]
pub fn record_free(kind: HeapKind) {
    trace!(event = "heap_free", kind = ?kind);
    TALLY.with(|t| t.borrow_mut().entry(kind).or_default().freed += 1);
}

/// Copy of the current thread's counters
pub fn snapshot() -> Tally {
    Tally {
        counts: TALLY.with(|t| t.borrow().clone()),
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, Default)]
pub struct Tally {
    counts: HashMap<HeapKind, Counts>,
}

impl Tally {
    pub fn allocated(&self, kind: HeapKind) -> u64 {
        self.counts.get(&kind).map_or(0, |c| c.allocated)
    }

    pub fn freed(&self, kind: HeapKind) -> u64 {
        self.counts.get(&kind).map_or(0, |c| c.freed)
    }

    /// Allocations not yet freed
    pub fn live(&self, kind: HeapKind) -> i64 {
        self.allocated(kind) as i64 - self.freed(kind) as i64
    }

    /// Counters accumulated after `earlier` was taken
    pub fn since(&self, earlier: &Tally) -> Tally {
        let counts = self
            .counts
            .iter()
            .map(|(kind, now)| {
                let before = earlier.counts.get(kind).copied().unwrap_or_default();
                (
                    *kind,
                    Counts {
                        allocated: now.allocated - before.allocated,
                        freed: now.freed - before.freed,
                    },
                )
            })
            .collect();
        Tally { counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since() {
        let before = snapshot();
        record_alloc(HeapKind::Struct);
        record_alloc(HeapKind::Struct);
        record_free(HeapKind::Struct);

        let delta = snapshot().since(&before);
        assert_eq!(delta.allocated(HeapKind::Struct), 2);
        assert_eq!(delta.freed(HeapKind::Struct), 1);
        assert_eq!(delta.live(HeapKind::Struct), 1);
        assert_eq!(delta.allocated(HeapKind::Array), 0);
    }
}
