//! Opaque handles for host values crossing untyped pointer slots
//!
//! Native code sees a key disguised as a pointer; the host value stays here
//! until the key is retired. Each key is the address of a heap cell owned by
//! the table, so it is never null and never equals a foreign native pointer
//! while it is live.

use crate::host::HostValue;
use dashmap::DashMap;
use std::ffi::c_void;

#[derive(Debug, Default)]
pub struct OpaqueTable {
    values: DashMap<usize, Box<HostValue>>,
}

impl OpaqueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and return its key as a pointer
    pub fn insert(&self, value: HostValue) -> *mut c_void {
        let cell = Box::new(value);
        let key = &*cell as *const HostValue as usize;
        self.values.insert(key, cell);
        key as *mut c_void
    }

    /// Value behind a key, if it is still live
    pub fn get(&self, key: *const c_void) -> Option<HostValue> {
        self.values.get(&(key as usize)).map(|value| HostValue::clone(&value))
    }

    /// Forget a key; returns whether it was live
    pub fn retire(&self, key: *const c_void) -> bool {
        self.values.remove(&(key as usize)).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
