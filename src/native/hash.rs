//! Reference-counted native hash tables

use super::slot::Argument;
use super::string::string_bytes;
use super::tally::{record_alloc, record_free, HeapKind};
use std::collections::HashMap;
use std::ffi::c_char;

/// Destructor run on a key or value the table owns
pub type DestroyFn = unsafe fn(Argument);

/// How keys compare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEquality {
    /// By string content
    Content,
    /// By bit pattern or pointer identity
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HashKey {
    Bytes(Vec<u8>),
    Bits(u64),
}

#[derive(Debug)]
pub struct NativeHashTable {
    entries: HashMap<HashKey, (Argument, Argument)>,
    equality: KeyEquality,
    key_destroy: Option<DestroyFn>,
    value_destroy: Option<DestroyFn>,
    ref_count: u32,
}

impl NativeHashTable {
    pub fn new(equality: KeyEquality) -> *mut NativeHashTable {
        Self::new_full(equality, None, None)
    }

    /// Table that runs destructors on replaced and remaining entries
    pub fn new_full(
        equality: KeyEquality,
        key_destroy: Option<DestroyFn>,
        value_destroy: Option<DestroyFn>,
    ) -> *mut NativeHashTable {
        record_alloc(HeapKind::HashTable);
        Box::into_raw(Box::new(NativeHashTable {
            entries: HashMap::new(),
            equality,
            key_destroy,
            value_destroy,
            ref_count: 1,
        }))
    }

    fn hash_key(&self, key: &Argument) -> HashKey {
        match (self.equality, key) {
            (KeyEquality::Content, Argument::String(p)) if !p.is_null() => {
                // Safety: string keys are valid NUL-terminated strings
                HashKey::Bytes(unsafe { string_bytes(*p as *const c_char) }.to_vec())
            }
            _ => HashKey::Bits(key.identity_bits()),
        }
    }

    /// Insert or replace; on replace the new key is destroyed and the old
    /// value is destroyed
    pub fn insert(&mut self, key: Argument, value: Argument) {
        let hashed = self.hash_key(&key);
        match self.entries.get_mut(&hashed) {
            Some(entry) => {
                let old_value = std::mem::replace(&mut entry.1, value);
                unsafe {
                    if let Some(destroy) = self.key_destroy {
                        destroy(key);
                    }
                    if let Some(destroy) = self.value_destroy {
                        destroy(old_value);
                    }
                }
            }
            None => {
                self.entries.insert(hashed, (key, value));
            }
        }
    }

    pub fn lookup(&self, key: &Argument) -> Option<&Argument> {
        self.entries.get(&self.hash_key(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&Argument, &Argument)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn has_destroy_fns(&self) -> bool {
        self.key_destroy.is_some() || self.value_destroy.is_some()
    }

    /// Remove every entry without running destructors
    pub fn steal_all(&mut self) {
        self.entries.clear();
    }

    /// Take a reference
    ///
    /// # Safety
    /// `table` must be null or a live table.
    pub unsafe fn ref_(table: *mut NativeHashTable) -> *mut NativeHashTable {
        if !table.is_null() {
            (*table).ref_count += 1;
        }
        table
    }

    /// Drop a reference; the last one destroys remaining entries and frees
    ///
    /// # Safety
    /// `table` must be null or a live table created by `new_full`.
    pub unsafe fn unref(table: *mut NativeHashTable) {
        if table.is_null() {
            return;
        }
        (*table).ref_count -= 1;
        if (*table).ref_count > 0 {
            return;
        }
        let table = Box::from_raw(table);
        for (_, (key, value)) in table.entries.iter() {
            if let Some(destroy) = table.key_destroy {
                destroy(*key);
            }
            if let Some(destroy) = table.value_destroy {
                destroy(*value);
            }
        }
        drop(table);
        record_free(HeapKind::HashTable);
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }
}
