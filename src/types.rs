//! Dynamic type system - runtime type identities for wrapped native values
//!
//! Every registered type has a parent chain ending at a fundamental. The
//! marshaller dispatches struct/boxed/object conversions on `is_a` checks
//! against the fundamentals, so new types plug in by registration alone.

use crate::error::{MarshalError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::c_void;

/// Runtime type identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct DynamicType(u32);

impl DynamicType {
    pub const INVALID: Self = Self(0);
    pub const NONE: Self = Self(1);
    pub const INTERFACE: Self = Self(2);
    pub const BOOLEAN: Self = Self(3);
    pub const INT: Self = Self(4);
    pub const UINT: Self = Self(5);
    pub const INT64: Self = Self(6);
    pub const UINT64: Self = Self(7);
    pub const DOUBLE: Self = Self(8);
    pub const STRING: Self = Self(9);
    pub const POINTER: Self = Self(10);
    pub const BOXED: Self = Self(11);
    pub const ENUM: Self = Self(12);
    pub const FLAGS: Self = Self(13);
    pub const OBJECT: Self = Self(14);
    pub const VALUE: Self = Self(15);
    pub const CLOSURE: Self = Self(16);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

/// Copies a boxed payload
pub type BoxedCopyFn = unsafe fn(*const c_void) -> *mut c_void;
/// Frees a boxed payload
pub type BoxedFreeFn = unsafe fn(*mut c_void);

#[derive(Debug, Clone)]
enum TypeKind {
    Fundamental,
    Boxed {
        copy: Option<BoxedCopyFn>,
        free: Option<BoxedFreeFn>,
    },
    Enum(Vec<(String, i64)>),
    Flags(Vec<(String, i64)>),
    Derived,
}

#[derive(Debug, Clone)]
struct TypeNode {
    name: String,
    parent: Option<DynamicType>,
    kind: TypeKind,
}

#[derive(Debug, Default)]
struct Registry {
    nodes: Vec<TypeNode>,
    names: HashMap<String, DynamicType>,
}

impl Registry {
    fn push(&mut self, name: &str, parent: Option<DynamicType>, kind: TypeKind) -> Result<DynamicType> {
        if self.names.contains_key(name) {
            return Err(MarshalError::conversion(format!(
                "type '{}' is already registered",
                name
            )));
        }
        let id = DynamicType(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            name: name.to_string(),
            parent,
            kind,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    fn node(&self, ty: DynamicType) -> Option<&TypeNode> {
        if !ty.is_valid() {
            return None;
        }
        self.nodes.get(ty.0 as usize)
    }
}

/// Registry of dynamic types
#[derive(Debug)]
pub struct TypeSystem {
    registry: RwLock<Registry>,
}

impl TypeSystem {
    /// Create a type system holding the fundamentals
    pub fn new() -> Self {
        let mut registry = Registry::default();
        // Slot 0 is INVALID and never looked up by name
        registry.nodes.push(TypeNode {
            name: "invalid".to_string(),
            parent: None,
            kind: TypeKind::Fundamental,
        });

        let fundamentals = [
            (DynamicType::NONE, "void"),
            (DynamicType::INTERFACE, "GInterface"),
            (DynamicType::BOOLEAN, "gboolean"),
            (DynamicType::INT, "gint"),
            (DynamicType::UINT, "guint"),
            (DynamicType::INT64, "gint64"),
            (DynamicType::UINT64, "guint64"),
            (DynamicType::DOUBLE, "gdouble"),
            (DynamicType::STRING, "gchararray"),
            (DynamicType::POINTER, "gpointer"),
            (DynamicType::BOXED, "GBoxed"),
            (DynamicType::ENUM, "GEnum"),
            (DynamicType::FLAGS, "GFlags"),
            (DynamicType::OBJECT, "GObject"),
        ];
        for (expected, name) in fundamentals {
            let id = DynamicType(registry.nodes.len() as u32);
            debug_assert_eq!(id, expected);
            registry.nodes.push(TypeNode {
                name: name.to_string(),
                parent: None,
                kind: TypeKind::Fundamental,
            });
            registry.names.insert(name.to_string(), id);
        }

        for (expected, name) in [(DynamicType::VALUE, "GValue"), (DynamicType::CLOSURE, "GClosure")] {
            let id = DynamicType(registry.nodes.len() as u32);
            debug_assert_eq!(id, expected);
            registry.nodes.push(TypeNode {
                name: name.to_string(),
                parent: Some(DynamicType::BOXED),
                kind: TypeKind::Boxed { copy: None, free: None },
            });
            registry.names.insert(name.to_string(), id);
        }

        Self {
            registry: RwLock::new(registry),
        }
    }

    /// Register a boxed type with its copy and free hooks
    pub fn register_boxed(&self, name: &str, copy: BoxedCopyFn, free: BoxedFreeFn) -> Result<DynamicType> {
        self.registry.write().push(
            name,
            Some(DynamicType::BOXED),
            TypeKind::Boxed {
                copy: Some(copy),
                free: Some(free),
            },
        )
    }

    /// Register an object type deriving from `parent`
    pub fn register_object(&self, name: &str, parent: DynamicType) -> Result<DynamicType> {
        if !self.is_a(parent, DynamicType::OBJECT) {
            return Err(MarshalError::conversion(format!(
                "parent of '{}' is not an object type",
                name
            )));
        }
        self.registry.write().push(name, Some(parent), TypeKind::Derived)
    }

    pub fn register_interface(&self, name: &str) -> Result<DynamicType> {
        self.registry
            .write()
            .push(name, Some(DynamicType::INTERFACE), TypeKind::Derived)
    }

    pub fn register_pointer(&self, name: &str) -> Result<DynamicType> {
        self.registry
            .write()
            .push(name, Some(DynamicType::POINTER), TypeKind::Derived)
    }

    pub fn register_enum(&self, name: &str, values: &[(&str, i64)]) -> Result<DynamicType> {
        let values = values.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        self.registry
            .write()
            .push(name, Some(DynamicType::ENUM), TypeKind::Enum(values))
    }

    pub fn register_flags(&self, name: &str, values: &[(&str, i64)]) -> Result<DynamicType> {
        let values = values.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        self.registry
            .write()
            .push(name, Some(DynamicType::FLAGS), TypeKind::Flags(values))
    }

    /// Walk the parent chain of `ty` looking for `ancestor`
    pub fn is_a(&self, ty: DynamicType, ancestor: DynamicType) -> bool {
        let registry = self.registry.read();
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == ancestor {
                return t.is_valid();
            }
            current = registry.node(t).and_then(|node| node.parent);
        }
        false
    }

    pub fn parent(&self, ty: DynamicType) -> Option<DynamicType> {
        self.registry.read().node(ty).and_then(|node| node.parent)
    }

    /// Root of the parent chain
    pub fn fundamental(&self, ty: DynamicType) -> DynamicType {
        let registry = self.registry.read();
        let mut current = ty;
        while let Some(parent) = registry.node(current).and_then(|node| node.parent) {
            current = parent;
        }
        current
    }

    pub fn name(&self, ty: DynamicType) -> Option<String> {
        self.registry.read().node(ty).map(|node| node.name.clone())
    }

    pub fn from_name(&self, name: &str) -> Option<DynamicType> {
        self.registry.read().names.get(name).copied()
    }

    /// Nick of an enum or flags value
    pub fn value_name(&self, ty: DynamicType, value: i64) -> Option<String> {
        let registry = self.registry.read();
        match &registry.node(ty)?.kind {
            TypeKind::Enum(values) | TypeKind::Flags(values) => values
                .iter()
                .find(|(_, v)| *v == value)
                .map(|(n, _)| n.clone()),
            _ => None,
        }
    }

    /// Duplicate a boxed payload through its registered copy hook
    pub fn boxed_copy(&self, ty: DynamicType, ptr: *const c_void) -> Result<*mut c_void> {
        let copy = self.boxed_hooks(ty).and_then(|(copy, _)| copy);
        match copy {
            Some(copy) if !ptr.is_null() => Ok(unsafe { copy(ptr) }),
            Some(_) => Ok(std::ptr::null_mut()),
            None => Err(MarshalError::unsupported(format!(
                "copying boxed type '{}'",
                self.name(ty).unwrap_or_default()
            ))),
        }
    }

    /// Free a boxed payload; returns false when no free hook is registered
    pub fn boxed_free(&self, ty: DynamicType, ptr: *mut c_void) -> bool {
        if ptr.is_null() {
            return true;
        }
        match self.boxed_hooks(ty).and_then(|(_, free)| free) {
            Some(free) => {
                unsafe { free(ptr) };
                true
            }
            None => false,
        }
    }

    fn boxed_hooks(&self, ty: DynamicType) -> Option<(Option<BoxedCopyFn>, Option<BoxedFreeFn>)> {
        match &self.registry.read().node(ty)?.kind {
            TypeKind::Boxed { copy, free } => Some((*copy, *free)),
            _ => None,
        }
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn copy_u32(ptr: *const c_void) -> *mut c_void {
        Box::into_raw(Box::new(*(ptr as *const u32))) as *mut c_void
    }

    unsafe fn free_u32(ptr: *mut c_void) {
        drop(Box::from_raw(ptr as *mut u32));
    }

    #[test]
    fn test_fundamentals() {
        let types = TypeSystem::new();
        assert_eq!(types.from_name("GObject"), Some(DynamicType::OBJECT));
        assert!(types.is_a(DynamicType::VALUE, DynamicType::BOXED));
        assert!(types.is_a(DynamicType::CLOSURE, DynamicType::BOXED));
        assert!(!types.is_a(DynamicType::INVALID, DynamicType::INVALID));
        assert_eq!(types.fundamental(DynamicType::VALUE), DynamicType::BOXED);
    }

    #[test]
    fn test_object_hierarchy() {
        let types = TypeSystem::new();
        let base = types.register_object("TestBase", DynamicType::OBJECT).unwrap();
        let child = types.register_object("TestChild", base).unwrap();

        assert!(types.is_a(child, base));
        assert!(types.is_a(child, DynamicType::OBJECT));
        assert!(!types.is_a(base, child));
        assert_eq!(types.parent(child), Some(base));
        assert!(types.register_object("TestBad", DynamicType::BOXED).is_err());
        assert!(types.register_object("TestBase", DynamicType::OBJECT).is_err());
    }

    #[test]
    fn test_boxed_hooks() {
        let types = TypeSystem::new();
        let ty = types.register_boxed("TestCounter", copy_u32, free_u32).unwrap();

        let original = Box::into_raw(Box::new(7u32)) as *mut c_void;
        let copy = types.boxed_copy(ty, original).unwrap();
        assert_ne!(copy, original);
        assert_eq!(unsafe { *(copy as *const u32) }, 7);

        assert!(types.boxed_free(ty, copy));
        assert!(types.boxed_free(ty, original));
        assert!(types.boxed_copy(DynamicType::VALUE, original).is_err());
    }

    #[test]
    fn test_enum_values() {
        let types = TypeSystem::new();
        let ty = types.register_enum("TestEnum", &[("first", 0), ("second", 1)]).unwrap();
        assert!(types.is_a(ty, DynamicType::ENUM));
        assert_eq!(types.value_name(ty, 1).as_deref(), Some("second"));
        assert_eq!(types.value_name(ty, 5), None);
    }
}
