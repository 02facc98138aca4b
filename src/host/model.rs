//! Host object model - wrapper allocation and identification
//!
//! The converters never build wrapper instances themselves; they ask the
//! model. `ObjectModel` is the registry-backed default: wrapper classes are
//! registered per dynamic type, optionally with their own constructor, and
//! lookups walk the type's parent chain.

use super::class::{ClassKind, HostClass, HostInstance, InstancePayload};
use super::value::{EnumValue, HostValue};
use crate::error::{ErrorKind, MarshalError, Result};
use crate::native::object::ObjectRef;
use crate::native::value::{NativeValue, ValueData};
use crate::native::NativeObject;
use crate::types::{DynamicType, TypeSystem};
use dashmap::DashMap;
use num_traits::ToPrimitive;
use std::ffi::{c_void, CString};
use std::sync::Arc;

/// Builds a wrapper instance: `(class, pointer, owns_memory)`
pub type WrapperConstructor =
    Arc<dyn Fn(&Arc<HostClass>, *mut c_void, bool) -> Result<HostValue> + Send + Sync>;

/// Services the converters need from the host object system
pub trait HostObjectModel: Send + Sync {
    /// Wrapper around a native object, taking a new reference
    fn wrap_native_handle(&self, object: *mut NativeObject) -> Result<HostValue>;

    /// Native object held by a wrapper (borrowed)
    fn unwrap_native_handle(&self, value: &HostValue) -> Result<*mut NativeObject>;

    fn new_struct_wrapper(
        &self,
        class: &Arc<HostClass>,
        pointer: *mut c_void,
        owns_memory: bool,
    ) -> Result<HostValue>;

    fn new_boxed_wrapper(
        &self,
        class: &Arc<HostClass>,
        g_type: DynamicType,
        pointer: *mut c_void,
        owns_memory: bool,
    ) -> Result<HostValue>;

    /// Generic wrapper for an untyped or unregistered pointer
    fn new_pointer_wrapper(&self, g_type: DynamicType, pointer: *mut c_void) -> HostValue;

    fn lookup_wrapper_type(&self, g_type: DynamicType) -> Option<Arc<HostClass>>;

    /// Wrapper class for types without a dynamic type, by `Namespace.Name`
    fn lookup_wrapper_by_name(&self, full_name: &str) -> Option<Arc<HostClass>>;

    /// Pointer held by a struct, boxed or pointer wrapper
    fn wrapped_pointer(&self, value: &HostValue) -> Result<*mut c_void>;

    /// Enum or flags instance for a native integer
    fn enum_to_host(&self, g_type: DynamicType, value: i64) -> Result<HostValue>;

    /// Dynamic type of the value's host type, `INVALID` when unknown
    fn type_of_value(&self, value: &HostValue) -> DynamicType;

    /// Dynamic type named by a type-like value
    fn type_from_object(&self, value: &HostValue) -> Result<DynamicType>;

    /// Fill a variant value from a host value
    fn value_from_host(&self, value: &mut NativeValue, object: &HostValue) -> Result<()>;

    /// Decode a variant value
    fn value_to_host(&self, value: &NativeValue) -> Result<HostValue>;
}

struct WrapperEntry {
    class: Arc<HostClass>,
    construct: Option<WrapperConstructor>,
}

/// Wrapper classes keyed by dynamic type and by name
#[derive(Default)]
pub struct WrapperRegistry {
    by_type: DashMap<DynamicType, WrapperEntry>,
    by_name: DashMap<String, Arc<HostClass>>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, class: Arc<HostClass>) {
        self.insert(class, None);
    }

    /// Register a class with its own instance constructor
    pub fn register_with(&self, class: Arc<HostClass>, construct: WrapperConstructor) {
        self.insert(class, Some(construct));
    }

    fn insert(&self, class: Arc<HostClass>, construct: Option<WrapperConstructor>) {
        self.by_name.insert(class.name().to_string(), class.clone());
        if class.g_type().is_valid() && class.g_type() != DynamicType::NONE {
            self.by_type.insert(class.g_type(), WrapperEntry { class, construct });
        }
    }

    fn get(&self, g_type: DynamicType) -> Option<(Arc<HostClass>, Option<WrapperConstructor>)> {
        self.by_type
            .get(&g_type)
            .map(|entry| (entry.class.clone(), entry.construct.clone()))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<HostClass>> {
        self.by_name.get(name).map(|class| class.clone())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Registry-backed host object model
pub struct ObjectModel {
    types: Arc<TypeSystem>,
    registry: WrapperRegistry,
    pointer_class: Arc<HostClass>,
}

impl ObjectModel {
    pub fn new(types: Arc<TypeSystem>) -> Self {
        Self {
            types,
            registry: WrapperRegistry::new(),
            pointer_class: HostClass::new("gobject.GPointer", ClassKind::Pointer, DynamicType::POINTER),
        }
    }

    pub fn types(&self) -> &Arc<TypeSystem> {
        &self.types
    }

    pub fn registry(&self) -> &WrapperRegistry {
        &self.registry
    }

    /// Most-derived registered entry along the parent chain
    fn resolve(&self, g_type: DynamicType) -> Option<(Arc<HostClass>, Option<WrapperConstructor>)> {
        let mut current = Some(g_type);
        while let Some(ty) = current {
            if let Some(found) = self.registry.get(ty) {
                return Some(found);
            }
            current = self.types.parent(ty);
        }
        None
    }

    fn type_name(&self, g_type: DynamicType) -> String {
        self.types
            .name(g_type)
            .unwrap_or_else(|| format!("<type {}>", g_type.raw()))
    }
}

impl HostObjectModel for ObjectModel {
    fn wrap_native_handle(&self, object: *mut NativeObject) -> Result<HostValue> {
        if object.is_null() {
            return Ok(HostValue::None);
        }
        let g_type = unsafe { (*object).g_type() };
        let (class, construct) = self
            .resolve(g_type)
            .ok_or_else(|| MarshalError::new(ErrorKind::NoWrapper(self.type_name(g_type))))?;

        if let Some(construct) = construct {
            return construct(&class, object as *mut c_void, false);
        }
        let handle = unsafe { ObjectRef::from_borrowed(object) }
            .ok_or_else(|| MarshalError::conversion("null object handle"))?;
        Ok(HostValue::Instance(HostInstance::new(
            class,
            InstancePayload::Object(handle),
        )))
    }

    fn unwrap_native_handle(&self, value: &HostValue) -> Result<*mut NativeObject> {
        match value {
            HostValue::None => Ok(std::ptr::null_mut()),
            HostValue::Instance(instance) => instance
                .object()
                .ok_or_else(|| MarshalError::type_mismatch("GObject", value.type_name())),
            other => Err(MarshalError::type_mismatch("GObject", other.type_name())),
        }
    }

    fn new_struct_wrapper(
        &self,
        class: &Arc<HostClass>,
        pointer: *mut c_void,
        owns_memory: bool,
    ) -> Result<HostValue> {
        if class.kind() != ClassKind::Struct {
            return Err(MarshalError::conversion("must be a subtype of gi.Struct"));
        }
        if let Some((_, Some(construct))) = self.registry.get(class.g_type()) {
            return construct(class, pointer, owns_memory);
        }
        Ok(HostValue::Instance(HostInstance::new(
            class.clone(),
            InstancePayload::Struct {
                pointer,
                free_on_dealloc: owns_memory,
            },
        )))
    }

    fn new_boxed_wrapper(
        &self,
        class: &Arc<HostClass>,
        g_type: DynamicType,
        pointer: *mut c_void,
        owns_memory: bool,
    ) -> Result<HostValue> {
        if let Some((_, Some(construct))) = self.registry.get(g_type) {
            return construct(class, pointer, owns_memory);
        }
        Ok(HostValue::Instance(HostInstance::new(
            class.clone(),
            InstancePayload::Boxed {
                pointer,
                g_type,
                owned: owns_memory,
                types: self.types.clone(),
            },
        )))
    }

    fn new_pointer_wrapper(&self, g_type: DynamicType, pointer: *mut c_void) -> HostValue {
        let class = self
            .resolve(g_type)
            .map(|(class, _)| class)
            .filter(|class| class.kind() == ClassKind::Pointer)
            .unwrap_or_else(|| self.pointer_class.clone());
        HostValue::Instance(HostInstance::new(
            class,
            InstancePayload::Pointer { pointer, g_type },
        ))
    }

    fn lookup_wrapper_type(&self, g_type: DynamicType) -> Option<Arc<HostClass>> {
        self.resolve(g_type).map(|(class, _)| class)
    }

    fn lookup_wrapper_by_name(&self, full_name: &str) -> Option<Arc<HostClass>> {
        self.registry.lookup_by_name(full_name)
    }

    fn wrapped_pointer(&self, value: &HostValue) -> Result<*mut c_void> {
        match value {
            HostValue::None => Ok(std::ptr::null_mut()),
            HostValue::Instance(instance) => Ok(instance.pointer()),
            other => Err(MarshalError::type_mismatch("a wrapped pointer", other.type_name())),
        }
    }

    fn enum_to_host(&self, g_type: DynamicType, value: i64) -> Result<HostValue> {
        let class = match self.lookup_wrapper_type(g_type) {
            Some(class) => class,
            None => {
                // Unregistered enum types get a class on first use
                let kind = if self.types.is_a(g_type, DynamicType::FLAGS) {
                    ClassKind::Flags
                } else if self.types.is_a(g_type, DynamicType::ENUM) {
                    ClassKind::Enum
                } else {
                    return Err(MarshalError::new(ErrorKind::NoWrapper(self.type_name(g_type))));
                };
                let class = HostClass::new(self.type_name(g_type), kind, g_type);
                self.registry.register(class.clone());
                class
            }
        };
        Ok(HostValue::Enum(EnumValue { class, value }))
    }

    fn type_of_value(&self, value: &HostValue) -> DynamicType {
        match value {
            HostValue::Bool(_) => DynamicType::BOOLEAN,
            HostValue::Int(_) => DynamicType::INT,
            HostValue::Long(_) => DynamicType::INT64,
            HostValue::Float(_) => DynamicType::DOUBLE,
            HostValue::Str(_) => DynamicType::STRING,
            HostValue::Enum(e) => e.class.g_type(),
            HostValue::Instance(instance) => match instance.payload() {
                InstancePayload::Object(obj) => obj.g_type(),
                _ => instance.class().g_type(),
            },
            _ => DynamicType::INVALID,
        }
    }

    fn type_from_object(&self, value: &HostValue) -> Result<DynamicType> {
        let g_type = match value {
            HostValue::GType(t) => *t,
            HostValue::Class(class) => class.g_type(),
            HostValue::Instance(instance) => instance.class().g_type(),
            _ => DynamicType::INVALID,
        };
        if g_type.is_valid() {
            Ok(g_type)
        } else {
            Err(MarshalError::conversion("could not get typecode from object"))
        }
    }

    fn value_from_host(&self, value: &mut NativeValue, object: &HostValue) -> Result<()> {
        let g_type = value.g_type();
        let types = &self.types;
        let data = if types.is_a(g_type, DynamicType::BOOLEAN) {
            ValueData::Boolean(object.is_truthy())
        } else if types.is_a(g_type, DynamicType::INT) || types.is_a(g_type, DynamicType::INT64) {
            let v = object.to_bigint()?;
            ValueData::Int(v.to_i64().ok_or_else(|| MarshalError::conversion("value out of range"))?)
        } else if types.is_a(g_type, DynamicType::UINT) || types.is_a(g_type, DynamicType::UINT64) {
            let v = object.to_bigint()?;
            ValueData::UInt(v.to_u64().ok_or_else(|| MarshalError::conversion("value out of range"))?)
        } else if types.is_a(g_type, DynamicType::DOUBLE) {
            ValueData::Double(object.to_f64()?)
        } else if types.is_a(g_type, DynamicType::STRING) {
            match object {
                HostValue::Str(s) => ValueData::String(
                    CString::new(s.as_str())
                        .map_err(|_| MarshalError::conversion("embedded null byte in string"))?,
                ),
                other => return Err(MarshalError::type_mismatch("string", other.type_name())),
            }
        } else if types.is_a(g_type, DynamicType::ENUM) || types.is_a(g_type, DynamicType::FLAGS) {
            let v = object.to_bigint()?;
            ValueData::Enum(v.to_i64().ok_or_else(|| MarshalError::conversion("value out of range"))?)
        } else if types.is_a(g_type, DynamicType::OBJECT) {
            let obj = self.unwrap_native_handle(object)?;
            match unsafe { ObjectRef::from_borrowed(obj) } {
                Some(handle) => ValueData::Object(handle),
                None => ValueData::Empty,
            }
        } else if types.is_a(g_type, DynamicType::BOXED) {
            let ptr = self.wrapped_pointer(object)?;
            ValueData::Boxed(types.boxed_copy(g_type, ptr)?)
        } else if types.is_a(g_type, DynamicType::POINTER) {
            ValueData::Pointer(self.wrapped_pointer(object)?)
        } else {
            return Err(MarshalError::conversion(format!(
                "cannot store a {} in a value of type {}",
                object.type_name(),
                self.type_name(g_type)
            )));
        };
        value.set(data);
        Ok(())
    }

    fn value_to_host(&self, value: &NativeValue) -> Result<HostValue> {
        Ok(match value.data() {
            ValueData::Empty => HostValue::None,
            ValueData::Boolean(b) => HostValue::Bool(*b),
            ValueData::Int(v) => HostValue::Int(*v),
            ValueData::UInt(v) => match i64::try_from(*v) {
                Ok(small) => HostValue::Int(small),
                Err(_) => HostValue::Long((*v).into()),
            },
            ValueData::Double(v) => HostValue::Float(*v),
            ValueData::String(s) => HostValue::Str(s.to_string_lossy().into_owned()),
            ValueData::Enum(v) => self.enum_to_host(value.g_type(), *v)?,
            ValueData::GType(t) => HostValue::GType(*t),
            ValueData::Object(obj) => self.wrap_native_handle(obj.as_ptr())?,
            ValueData::Boxed(ptr) => {
                let class = self.lookup_wrapper_type(value.g_type()).ok_or_else(|| {
                    MarshalError::new(ErrorKind::NoWrapper(self.type_name(value.g_type())))
                })?;
                self.new_boxed_wrapper(&class, value.g_type(), *ptr, false)?
            }
            ValueData::Pointer(ptr) => self.new_pointer_wrapper(value.g_type(), *ptr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::object::{typthon_object_new, typthon_object_refcount, typthon_object_unref};

    fn model() -> ObjectModel {
        ObjectModel::new(Arc::new(TypeSystem::new()))
    }

    #[test]
    fn test_wrap_object_walks_parents() {
        let model = model();
        let base = model.types().register_object("TestBase", DynamicType::OBJECT).unwrap();
        let child = model.types().register_object("TestChild", base).unwrap();
        model
            .registry()
            .register(HostClass::new("Test.Base", ClassKind::Object, base));

        let obj = typthon_object_new(child);
        let wrapper = model.wrap_native_handle(obj).unwrap();
        assert_eq!(wrapper.type_name(), "Test.Base");
        assert_eq!(unsafe { typthon_object_refcount(obj) }, 2);
        assert_eq!(model.unwrap_native_handle(&wrapper).unwrap(), obj);

        drop(wrapper);
        assert_eq!(unsafe { typthon_object_refcount(obj) }, 1);
        unsafe { typthon_object_unref(obj) };
    }

    #[test]
    fn test_wrap_unregistered_object_fails() {
        let model = model();
        let obj = typthon_object_new(DynamicType::OBJECT);
        let err = model.wrap_native_handle(obj).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoWrapper(_)));
        unsafe { typthon_object_unref(obj) };
    }

    #[test]
    fn test_custom_constructor() {
        let model = model();
        let ty = model.types().register_pointer("TestHandle").unwrap();
        let class = HostClass::structure("Test.Handle", ty, None);
        model.registry().register_with(
            class.clone(),
            Arc::new(|_: &Arc<HostClass>, ptr: *mut c_void, _: bool| {
                Ok(HostValue::Int(ptr as usize as i64))
            }),
        );
        let wrapped = model
            .new_struct_wrapper(&class, 0x10 as *mut c_void, false)
            .unwrap();
        assert_eq!(wrapped, HostValue::Int(0x10));
    }

    #[test]
    fn test_enum_class_created_on_demand() {
        let model = model();
        let ty = model.types().register_enum("TestColor", &[("red", 0), ("green", 1)]).unwrap();
        let value = model.enum_to_host(ty, 1).unwrap();
        assert_eq!(value, HostValue::Int(1));
        assert_eq!(value.type_name(), "TestColor");
        assert!(model.lookup_wrapper_type(ty).is_some());
    }

    #[test]
    fn test_value_round_trip() {
        let model = model();
        let mut value = NativeValue::new(DynamicType::STRING);
        model.value_from_host(&mut value, &HostValue::str("text")).unwrap();
        assert_eq!(model.value_to_host(&value).unwrap(), HostValue::str("text"));

        let mut value = NativeValue::new(DynamicType::UINT64);
        model.value_from_host(&mut value, &HostValue::Int(7)).unwrap();
        assert_eq!(model.value_to_host(&value).unwrap(), HostValue::Int(7));
    }

    #[test]
    fn test_type_of_value() {
        let model = model();
        assert_eq!(model.type_of_value(&HostValue::Int(1)), DynamicType::INT);
        assert_eq!(model.type_of_value(&HostValue::str("s")), DynamicType::STRING);
        assert_eq!(model.type_of_value(&HostValue::List(vec![])), DynamicType::INVALID);
        assert!(model.type_from_object(&HostValue::Int(3)).is_err());
        assert_eq!(
            model.type_from_object(&HostValue::GType(DynamicType::OBJECT)).unwrap(),
            DynamicType::OBJECT
        );
    }
}
