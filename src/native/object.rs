//! Native object handles - C API for refcount operations
//!
//! Hot path operations with minimal overhead. Thread-safe atomic
//! refcounts; the object is destroyed when the last reference goes away.

use super::tally::{record_alloc, record_free, HeapKind};
use crate::types::DynamicType;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use tracing::trace;

/// Reference-counted native instance
#[repr(C)]
#[derive(Debug)]
pub struct NativeObject {
    refcount: AtomicU32,
    g_type: DynamicType,
}

impl NativeObject {
    #[inline]
    pub fn g_type(&self) -> DynamicType {
        self.g_type
    }

    #[inline]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Relaxed)
    }
}

/// Create an object holding one reference
#[no_mangle]
pub extern "C" fn typthon_object_new(g_type: DynamicType) -> *mut NativeObject {
    record_alloc(HeapKind::Object);
    let obj = Box::into_raw(Box::new(NativeObject {
        refcount: AtomicU32::new(1),
        g_type,
    }));
    trace!(event = "object_new", address = ?obj, g_type = g_type.raw());
    obj
}

/// Increment reference count and return the same pointer
///
/// # Safety
/// - Null-safe (no-op for null pointers)
/// - Object must be live
#[no_mangle]
pub unsafe extern "C" fn typthon_object_ref(obj: *mut NativeObject) -> *mut NativeObject {
    if obj.is_null() {
        return obj;
    }
    let old = (*obj).refcount.fetch_add(1, Ordering::Relaxed);
    debug_assert!(old < u32::MAX, "refcount overflow");
    obj
}

/// Decrement reference count, destroy if it reaches zero
///
/// # Safety
/// - Null-safe (no-op for null pointers)
/// - Object must be live and the caller must own the reference
#[no_mangle]
pub unsafe extern "C" fn typthon_object_unref(obj: *mut NativeObject) {
    if obj.is_null() {
        return;
    }
    let old = (*obj).refcount.fetch_sub(1, Ordering::Release);
    debug_assert!(old > 0, "refcount underflow");

    if old == 1 {
        // Synchronize with all previous decrements
        fence(Ordering::Acquire);
        destroy_object(obj);
    }
}

/// Current reference count (for debugging/testing)
///
/// # Safety
/// Returns 0 for null pointers; otherwise the object must be live.
#[no_mangle]
pub unsafe extern "C" fn typthon_object_refcount(obj: *const NativeObject) -> u32 {
    if obj.is_null() {
        return 0;
    }
    (*obj).refcount()
}

#[cold]
#[inline(never)]
unsafe fn destroy_object(obj: *mut NativeObject) {
    trace!(event = "object_destroy", address = ?obj);
    drop(Box::from_raw(obj));
    record_free(HeapKind::Object);
}

/// Owned strong reference to a native object
#[derive(Debug)]
pub struct ObjectRef(NonNull<NativeObject>);

// Safety: the refcount is atomic and the object is otherwise immutable
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Take a new reference to a borrowed object
    ///
    /// # Safety
    /// `obj` must be null or live.
    pub unsafe fn from_borrowed(obj: *mut NativeObject) -> Option<Self> {
        NonNull::new(typthon_object_ref(obj)).map(Self)
    }

    /// Adopt a reference the caller already owns
    ///
    /// # Safety
    /// `obj` must be null or live, with one reference owned by the caller.
    pub unsafe fn from_owned(obj: *mut NativeObject) -> Option<Self> {
        NonNull::new(obj).map(Self)
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut NativeObject {
        self.0.as_ptr()
    }

    #[inline]
    pub fn g_type(&self) -> DynamicType {
        // Safety: a held reference keeps the object alive
        unsafe { self.0.as_ref().g_type() }
    }

    #[inline]
    pub fn refcount(&self) -> u32 {
        unsafe { self.0.as_ref().refcount() }
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        unsafe { typthon_object_ref(self.as_ptr()) };
        Self(self.0)
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        unsafe { typthon_object_unref(self.as_ptr()) }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
