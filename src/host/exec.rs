//! Host execution context
//!
//! Host code must not run concurrently. Native callbacks may fire from any
//! thread and may re-enter while a crossing is already in progress on the
//! same thread, so the lock is reentrant.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::sync::Arc;
use tracing::trace;

/// Shared execution lock
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    lock: Arc<ReentrantMutex<Cell<u32>>>,
}

/// Held while host code runs; released on drop
pub struct ExecutionGuard<'a> {
    guard: ReentrantMutexGuard<'a, Cell<u32>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the context, blocking other threads until the guard drops
    pub fn enter(&self) -> ExecutionGuard<'_> {
        let guard = self.lock.lock();
        let depth = guard.get() + 1;
        guard.set(depth);
        trace!(event = "context_enter", depth);
        ExecutionGuard { guard }
    }

    /// Whether any thread currently holds the context
    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }
}

impl ExecutionGuard<'_> {
    /// Nesting depth on the owning thread
    pub fn depth(&self) -> u32 {
        self.guard.get()
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let depth = self.guard.get().saturating_sub(1);
        self.guard.set(depth);
        trace!(event = "context_exit", depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_reentrant() {
        let ctx = ExecutionContext::new();
        let outer = ctx.enter();
        assert_eq!(outer.depth(), 1);
        {
            let inner = ctx.enter();
            assert_eq!(inner.depth(), 2);
        }
        assert_eq!(outer.depth(), 1);
        drop(outer);
        assert!(!ctx.is_held());
    }

    #[test]
    fn test_excludes_other_threads() {
        let ctx = ExecutionContext::new();
        let entered = Arc::new(AtomicBool::new(false));
        let guard = ctx.enter();

        let handle = {
            let ctx = ctx.clone();
            let entered = entered.clone();
            thread::spawn(move || {
                let _guard = ctx.enter();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst));
        drop(guard);
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }
}
