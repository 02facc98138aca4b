//! Variant values - typed storage for a single value of any dynamic type

use super::object::ObjectRef;
use super::tally::{record_alloc, record_free, HeapKind};
use crate::types::{DynamicType, TypeSystem};
use std::ffi::{c_void, CString};

/// Contents of a variant value
#[derive(Debug, Default)]
pub enum ValueData {
    #[default]
    Empty,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(CString),
    Enum(i64),
    GType(DynamicType),
    Object(ObjectRef),
    /// Owned boxed payload of the value's type
    Boxed(*mut c_void),
    /// Borrowed untyped payload
    Pointer(*mut c_void),
}

/// Typed value cell
#[derive(Debug)]
pub struct NativeValue {
    g_type: DynamicType,
    data: ValueData,
}

impl NativeValue {
    pub fn new(g_type: DynamicType) -> Self {
        Self {
            g_type,
            data: ValueData::Empty,
        }
    }

    /// Heap-allocate an empty value of `g_type`
    pub fn alloc(g_type: DynamicType) -> *mut NativeValue {
        record_alloc(HeapKind::Value);
        Box::into_raw(Box::new(Self::new(g_type)))
    }

    /// Free value storage; call `unset` first to release the contents
    ///
    /// # Safety
    /// `value` must be null or come from `alloc` and not be freed yet.
    pub unsafe fn free(value: *mut NativeValue) {
        if value.is_null() {
            return;
        }
        drop(Box::from_raw(value));
        record_free(HeapKind::Value);
    }

    #[inline]
    pub fn g_type(&self) -> DynamicType {
        self.g_type
    }

    #[inline]
    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn set(&mut self, data: ValueData) {
        self.data = data;
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.data, ValueData::Empty)
    }

    /// Release the contents through the type-directed destructor
    pub fn unset(&mut self, types: &TypeSystem) {
        match std::mem::take(&mut self.data) {
            ValueData::Boxed(ptr) => {
                if !types.boxed_free(self.g_type, ptr) {
                    tracing::warn!(
                        event = "value_unset_leak",
                        g_type = self.g_type.raw(),
                        "boxed type has no free function"
                    );
                }
            }
            // Objects and strings release on drop
            other => drop(other),
        }
    }
}
