//! Wrapper classes and the instances that hold native payloads

use crate::native::object::ObjectRef;
use crate::native::NativeObject;
use crate::types::{DynamicType, TypeSystem};
use std::ffi::c_void;
use std::sync::Arc;
use tracing::warn;

/// What a wrapper class wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Plain,
    Struct,
    Boxed,
    Pointer,
    Object,
    Interface,
    Enum,
    Flags,
}

/// Frees memory owned by a struct wrapper
pub type StructFreeFn = unsafe fn(*mut c_void);

#[derive(Debug)]
pub struct HostClass {
    name: String,
    kind: ClassKind,
    g_type: DynamicType,
    base: Option<Arc<HostClass>>,
    struct_free: Option<StructFreeFn>,
}

impl HostClass {
    pub fn new(name: impl Into<String>, kind: ClassKind, g_type: DynamicType) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            g_type,
            base: None,
            struct_free: None,
        })
    }

    /// Struct wrapper class; `free` releases memory the wrapper owns
    pub fn structure(name: impl Into<String>, g_type: DynamicType, free: Option<StructFreeFn>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind: ClassKind::Struct,
            g_type,
            base: None,
            struct_free: free,
        })
    }

    /// Subclass inheriting kind and free function from `base`
    pub fn subclass(name: impl Into<String>, base: &Arc<HostClass>, g_type: DynamicType) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind: base.kind,
            g_type,
            base: Some(base.clone()),
            struct_free: base.struct_free,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn g_type(&self) -> DynamicType {
        self.g_type
    }

    pub fn base(&self) -> Option<&Arc<HostClass>> {
        self.base.as_ref()
    }

    pub fn struct_free(&self) -> Option<StructFreeFn> {
        self.struct_free
    }

    /// `issubclass(self, other)`
    pub fn is_subclass_of(&self, other: &HostClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, other) {
                return true;
            }
            current = class.base.as_deref();
        }
        false
    }
}

/// Native payload of a wrapper instance
#[derive(Debug)]
pub enum InstancePayload {
    Empty,
    Struct {
        pointer: *mut c_void,
        free_on_dealloc: bool,
    },
    Boxed {
        pointer: *mut c_void,
        g_type: DynamicType,
        owned: bool,
        types: Arc<TypeSystem>,
    },
    Pointer {
        pointer: *mut c_void,
        g_type: DynamicType,
    },
    Object(ObjectRef),
}

#[derive(Debug)]
pub struct HostInstance {
    class: Arc<HostClass>,
    payload: InstancePayload,
}

// Safety: payload pointers are only dereferenced under the execution context
unsafe impl Send for HostInstance {}
unsafe impl Sync for HostInstance {}

impl HostInstance {
    pub fn new(class: Arc<HostClass>, payload: InstancePayload) -> Arc<Self> {
        Arc::new(Self { class, payload })
    }

    pub fn class(&self) -> &Arc<HostClass> {
        &self.class
    }

    pub fn payload(&self) -> &InstancePayload {
        &self.payload
    }

    /// Wrapped pointer, whatever the payload kind
    pub fn pointer(&self) -> *mut c_void {
        match &self.payload {
            InstancePayload::Empty => std::ptr::null_mut(),
            InstancePayload::Struct { pointer, .. }
            | InstancePayload::Boxed { pointer, .. }
            | InstancePayload::Pointer { pointer, .. } => *pointer,
            InstancePayload::Object(obj) => obj.as_ptr() as *mut c_void,
        }
    }

    pub fn object(&self) -> Option<*mut NativeObject> {
        match &self.payload {
            InstancePayload::Object(obj) => Some(obj.as_ptr()),
            _ => None,
        }
    }

    /// Whether dropping this wrapper frees the payload
    pub fn owns_memory(&self) -> bool {
        match &self.payload {
            InstancePayload::Struct { free_on_dealloc, .. } => *free_on_dealloc,
            InstancePayload::Boxed { owned, .. } => *owned,
            InstancePayload::Object(_) => true,
            InstancePayload::Empty | InstancePayload::Pointer { .. } => false,
        }
    }
}

impl Drop for HostInstance {
    fn drop(&mut self) {
        match &self.payload {
            InstancePayload::Struct {
                pointer,
                free_on_dealloc: true,
            } if !pointer.is_null() => match self.class.struct_free {
                Some(free) => unsafe { free(*pointer) },
                None => warn!(
                    event = "struct_leak",
                    class = self.class.name(),
                    "owned struct has no free function"
                ),
            },
            InstancePayload::Boxed {
                pointer,
                g_type,
                owned: true,
                types,
            } => {
                if !types.boxed_free(*g_type, *pointer) {
                    warn!(
                        event = "boxed_leak",
                        class = self.class.name(),
                        "owned boxed has no free function"
                    );
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_chain() {
        let base = HostClass::new("Test.Base", ClassKind::Object, DynamicType::OBJECT);
        let child = HostClass::subclass("Test.Child", &base, DynamicType::OBJECT);
        let other = HostClass::new("Test.Other", ClassKind::Object, DynamicType::OBJECT);

        assert!(child.is_subclass_of(&base));
        assert!(child.is_subclass_of(&child));
        assert!(!base.is_subclass_of(&child));
        assert!(!child.is_subclass_of(&other));
        assert_eq!(child.kind(), ClassKind::Object);
    }
}
