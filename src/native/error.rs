//! Native error payloads and the out-parameter cells that carry them

use super::tally::{record_alloc, record_free, HeapKind};
use std::ptr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub domain: String,
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(domain: impl Into<String>, code: i32, message: impl Into<String>) -> *mut NativeError {
        record_alloc(HeapKind::Error);
        Box::into_raw(Box::new(NativeError {
            domain: domain.into(),
            code,
            message: message.into(),
        }))
    }

    /// # Safety
    /// `error` must be null or come from `new` and not be freed yet.
    pub unsafe fn free(error: *mut NativeError) {
        if error.is_null() {
            return;
        }
        drop(Box::from_raw(error));
        record_free(HeapKind::Error);
    }
}

/// Allocate an empty error cell
pub fn error_cell_new() -> *mut *mut NativeError {
    record_alloc(HeapKind::ErrorCell);
    Box::into_raw(Box::new(ptr::null_mut()))
}

/// Free a cell and any error it carries
///
/// # Safety
/// `cell` must be null or come from `error_cell_new` and not be freed yet.
pub unsafe fn error_cell_free(cell: *mut *mut NativeError) {
    if cell.is_null() {
        return;
    }
    NativeError::free(*cell);
    drop(Box::from_raw(cell));
    record_free(HeapKind::ErrorCell);
}
