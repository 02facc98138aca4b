//! Reference-counted closures wrapping a host callable

use super::tally::{record_alloc, record_free, HeapKind};
use crate::error::Result;
use crate::host::{HostCallable, HostValue};
use std::sync::atomic::{fence, AtomicU32, Ordering};

#[derive(Debug)]
pub struct NativeClosure {
    refcount: AtomicU32,
    callable: HostCallable,
}

impl NativeClosure {
    /// Closure holding one reference
    pub fn new(callable: HostCallable) -> *mut NativeClosure {
        record_alloc(HeapKind::Closure);
        Box::into_raw(Box::new(NativeClosure {
            refcount: AtomicU32::new(1),
            callable,
        }))
    }

    /// # Safety
    /// `closure` must be null or live.
    pub unsafe fn ref_(closure: *mut NativeClosure) -> *mut NativeClosure {
        if !closure.is_null() {
            (*closure).refcount.fetch_add(1, Ordering::Relaxed);
        }
        closure
    }

    /// # Safety
    /// `closure` must be null or live, and the caller must own the reference.
    pub unsafe fn unref(closure: *mut NativeClosure) {
        if closure.is_null() {
            return;
        }
        if (*closure).refcount.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            drop(Box::from_raw(closure));
            record_free(HeapKind::Closure);
        }
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }

    pub fn callable(&self) -> &HostCallable {
        &self.callable
    }

    pub fn invoke(&self, args: &[HostValue]) -> Result<HostValue> {
        self.callable.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::tally;

    #[test]
    fn test_invoke_and_unref() {
        let before = tally::snapshot();
        let closure = NativeClosure::new(HostCallable::new("double", |args| match args {
            [HostValue::Int(v)] => Ok(HostValue::Int(v * 2)),
            _ => Ok(HostValue::None),
        }));
        unsafe {
            assert_eq!((*closure).invoke(&[HostValue::Int(21)]).unwrap(), HostValue::Int(42));
            NativeClosure::ref_(closure);
            NativeClosure::unref(closure);
            assert_eq!((*closure).refcount(), 1);
            NativeClosure::unref(closure);
        }
        let delta = tally::snapshot().since(&before);
        assert_eq!(delta.live(HeapKind::Closure), 0);
    }
}
