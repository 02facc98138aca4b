//! Growable native arrays

use super::slot::Argument;
use super::tally::{record_alloc, record_free, HeapKind};

/// Growable buffer of slots with a fixed element size
#[derive(Debug)]
pub struct NativeArray {
    items: Vec<Argument>,
    element_size: usize,
    zero_terminated: bool,
}

impl NativeArray {
    /// Allocate an empty array with room for `reserved` elements
    pub fn sized_new(zero_terminated: bool, element_size: usize, reserved: usize) -> *mut NativeArray {
        record_alloc(HeapKind::Array);
        Box::into_raw(Box::new(NativeArray {
            items: Vec::with_capacity(reserved),
            element_size,
            zero_terminated,
        }))
    }

    /// Free the array storage; elements are left untouched
    ///
    /// # Safety
    /// `array` must be null or come from `sized_new` and not be freed yet.
    pub unsafe fn free(array: *mut NativeArray) {
        if array.is_null() {
            return;
        }
        drop(Box::from_raw(array));
        record_free(HeapKind::Array);
    }

    #[inline]
    pub fn push(&mut self, item: Argument) {
        self.items.push(item);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn items(&self) -> &[Argument] {
        &self.items
    }

    #[inline]
    pub fn items_mut(&mut self) -> &mut [Argument] {
        &mut self.items
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub fn is_zero_terminated(&self) -> bool {
        self.zero_terminated
    }

    /// Size in bytes of the contiguous C buffer, terminator included
    pub fn byte_len(&self) -> usize {
        (self.items.len() + self.zero_terminated as usize) * self.element_size
    }
}
