//! Type and interface descriptors
//!
//! Descriptors are immutable reference-counted handles. Cloning a handle
//! acquires a reference and dropping it releases one, so every exit path of
//! a conversion releases what it acquired.

use super::callable::CallableInfo;
use super::tag::{InfoType, TypeTag};
use crate::types::DynamicType;
use std::ffi::c_int;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

/// Array shape: fixed length, zero termination, sibling length argument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrayLayout {
    pub fixed_size: Option<usize>,
    pub zero_terminated: bool,
    pub length_arg: Option<usize>,
}

#[derive(Clone)]
struct TypeData {
    tag: TypeTag,
    is_pointer: bool,
    params: Vec<TypeInfo>,
    interface: Option<InterfaceInfo>,
    array: ArrayLayout,
}

/// Descriptor of a single slot
#[derive(Clone)]
pub struct TypeInfo(Arc<TypeData>);

impl TypeInfo {
    /// Descriptor for a tag without parameters
    pub fn new(tag: TypeTag) -> Self {
        Self(Arc::new(TypeData {
            tag,
            is_pointer: tag.is_pointer_tag(),
            params: Vec::new(),
            interface: None,
            array: ArrayLayout::default(),
        }))
    }

    /// `void*` slot
    pub fn void_pointer() -> Self {
        Self::new(TypeTag::Void).with_pointer(true)
    }

    pub fn array(element: TypeInfo) -> Self {
        let mut info = Self::new(TypeTag::Array);
        Arc::make_mut(&mut info.0).params.push(element);
        info
    }

    pub fn glist(element: TypeInfo) -> Self {
        let mut info = Self::new(TypeTag::GList);
        Arc::make_mut(&mut info.0).params.push(element);
        info
    }

    pub fn gslist(element: TypeInfo) -> Self {
        let mut info = Self::new(TypeTag::GSList);
        Arc::make_mut(&mut info.0).params.push(element);
        info
    }

    pub fn ghash(key: TypeInfo, value: TypeInfo) -> Self {
        let mut info = Self::new(TypeTag::GHash);
        let data = Arc::make_mut(&mut info.0);
        data.params.push(key);
        data.params.push(value);
        info
    }

    /// Interface slot; enum and flags are stored inline, the rest by pointer
    pub fn interface(interface: InterfaceInfo) -> Self {
        let is_pointer = !matches!(interface.info_type(), InfoType::Enum | InfoType::Flags);
        let mut info = Self::new(TypeTag::Interface);
        let data = Arc::make_mut(&mut info.0);
        data.is_pointer = is_pointer;
        data.interface = Some(interface);
        info
    }

    pub fn with_pointer(mut self, is_pointer: bool) -> Self {
        Arc::make_mut(&mut self.0).is_pointer = is_pointer;
        self
    }

    pub fn with_fixed_size(mut self, size: usize) -> Self {
        Arc::make_mut(&mut self.0).array.fixed_size = Some(size);
        self
    }

    pub fn with_zero_terminated(mut self) -> Self {
        Arc::make_mut(&mut self.0).array.zero_terminated = true;
        self
    }

    pub fn with_length_arg(mut self, index: usize) -> Self {
        Arc::make_mut(&mut self.0).array.length_arg = Some(index);
        self
    }

    #[inline]
    pub fn tag(&self) -> TypeTag {
        self.0.tag
    }

    #[inline]
    pub fn is_pointer(&self) -> bool {
        self.0.is_pointer
    }

    /// Nested parameter type; the returned handle holds its own reference
    pub fn param_type(&self, index: usize) -> Option<TypeInfo> {
        self.0.params.get(index).cloned()
    }

    pub fn interface_info(&self) -> Option<InterfaceInfo> {
        self.0.interface.clone()
    }

    pub fn is_zero_terminated(&self) -> bool {
        self.0.array.zero_terminated
    }

    pub fn array_fixed_size(&self) -> Option<usize> {
        self.0.array.fixed_size
    }

    pub fn array_length_arg(&self) -> Option<usize> {
        self.0.array.length_arg
    }

    pub fn array_layout(&self) -> ArrayLayout {
        self.0.array
    }

    /// Bytes one element of this type occupies inside an array
    pub fn storage_size(&self) -> usize {
        match (self.0.tag, &self.0.interface) {
            (TypeTag::Interface, Some(iface)) => match iface.info_type() {
                InfoType::Enum | InfoType::Flags => size_of::<c_int>(),
                InfoType::Struct | InfoType::Boxed | InfoType::Union if !self.0.is_pointer => {
                    iface.struct_size()
                }
                _ => size_of::<usize>(),
            },
            (TypeTag::Void, _) if self.0.is_pointer => size_of::<usize>(),
            (tag, _) => tag.scalar_size(),
        }
    }

    /// Number of live handles sharing this descriptor
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TypeInfo");
        s.field("tag", &self.0.tag).field("is_pointer", &self.0.is_pointer);
        if !self.0.params.is_empty() {
            s.field("params", &self.0.params);
        }
        if let Some(iface) = &self.0.interface {
            s.field("interface", &iface.full_name());
        }
        s.finish()
    }
}

struct InterfaceData {
    namespace: String,
    name: String,
    info_type: InfoType,
    g_type: DynamicType,
    struct_size: usize,
    callable: Option<CallableInfo>,
}

/// Descriptor of a named interface type (struct, object, enum, callback, ...)
#[derive(Clone)]
pub struct InterfaceInfo(Arc<InterfaceData>);

impl InterfaceInfo {
    pub fn new(
        info_type: InfoType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        g_type: DynamicType,
    ) -> Self {
        Self(Arc::new(InterfaceData {
            namespace: namespace.into(),
            name: name.into(),
            info_type,
            g_type,
            struct_size: size_of::<usize>(),
            callable: None,
        }))
    }

    /// Struct descriptor with an explicit inline size
    pub fn structure(
        namespace: impl Into<String>,
        name: impl Into<String>,
        g_type: DynamicType,
        size: usize,
    ) -> Self {
        Self(Arc::new(InterfaceData {
            namespace: namespace.into(),
            name: name.into(),
            info_type: InfoType::Struct,
            g_type,
            struct_size: size,
            callable: None,
        }))
    }

    /// Callback descriptor named after its signature
    pub fn callback(signature: CallableInfo) -> Self {
        Self(Arc::new(InterfaceData {
            namespace: signature.namespace().to_string(),
            name: signature.name().to_string(),
            info_type: InfoType::Callback,
            g_type: DynamicType::NONE,
            struct_size: size_of::<usize>(),
            callable: Some(signature),
        }))
    }

    pub fn info_type(&self) -> InfoType {
        self.0.info_type
    }

    pub fn namespace(&self) -> &str {
        &self.0.namespace
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// `Namespace.Name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.0.namespace, self.0.name)
    }

    /// Dynamic type registered for this interface
    pub fn registered_type(&self) -> DynamicType {
        self.0.g_type
    }

    pub fn struct_size(&self) -> usize {
        self.0.struct_size
    }

    /// Signature of a callback interface
    pub fn as_callable(&self) -> Option<CallableInfo> {
        self.0.callable.clone()
    }

    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceInfo")
            .field("name", &self.full_name())
            .field("info_type", &self.0.info_type)
            .field("g_type", &self.0.g_type)
            .finish()
    }
}
