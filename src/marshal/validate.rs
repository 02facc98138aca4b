//! Value validation
//!
//! Runs before conversion. Numeric range checks live here only; the
//! converters trust that a validated value fits its slot.

use super::bounds::{bounds, Bounds};
use super::Marshaller;
use crate::error::{ErrorKind, MarshalError, Result};
use crate::host::{HostClass, HostValue};
use crate::introspection::{InfoType, InterfaceInfo, TypeInfo, TypeTag};
use crate::types::DynamicType;
use num_bigint::BigInt;
use num_traits::Zero;
use std::sync::Arc;

impl Marshaller {
    /// Check that `value` is acceptable for a slot described by `info`
    pub fn check_value(&self, info: &TypeInfo, value: &HostValue) -> Result<()> {
        let tag = info.tag();
        match tag {
            // Void is untyped and every value has a truth value
            TypeTag::Void | TypeTag::Boolean => Ok(()),

            TypeTag::Int8
            | TypeTag::UInt8
            | TypeTag::Int16
            | TypeTag::UInt16
            | TypeTag::Int32
            | TypeTag::UInt32
            | TypeTag::Int64
            | TypeTag::UInt64
            | TypeTag::Short
            | TypeTag::UShort
            | TypeTag::Int
            | TypeTag::UInt
            | TypeTag::Long
            | TypeTag::ULong
            | TypeTag::SSize
            | TypeTag::Size
            | TypeTag::Float
            | TypeTag::Double => self.check_number(tag, value),

            TypeTag::TimeT => match value {
                HostValue::DateTime(_) => Ok(()),
                other => Err(MarshalError::type_mismatch("datetime.datetime", other.type_name())),
            },

            TypeTag::GType => match value {
                HostValue::GType(_) => Ok(()),
                HostValue::Class(class) if class.g_type().is_valid() => Ok(()),
                other => Err(MarshalError::type_mismatch("gobject.GType", other.type_name())),
            },

            TypeTag::Utf8 | TypeTag::Filename => match value {
                HostValue::Str(_) => Ok(()),
                other => Err(MarshalError::type_mismatch("string", other.type_name())),
            },

            TypeTag::Array => {
                let items = value
                    .as_sequence()
                    .ok_or_else(|| MarshalError::type_mismatch("sequence", value.type_name()))?;

                if let Some(expected) = info.array_fixed_size() {
                    if items.len() != expected {
                        return Err(MarshalError::new(ErrorKind::LengthMismatch {
                            expected,
                            found: items.len(),
                        }));
                    }
                }

                let item_info = element_type(info)?;
                self.check_items(&item_info, items)
            }

            TypeTag::GList | TypeTag::GSList => {
                let items = value
                    .as_sequence()
                    .ok_or_else(|| MarshalError::type_mismatch("sequence", value.type_name()))?;
                let item_info = element_type(info)?;
                self.check_items(&item_info, items)
            }

            TypeTag::GHash => {
                let mapping = value
                    .as_mapping()
                    .ok_or_else(|| MarshalError::type_mismatch("mapping", value.type_name()))?;
                let (key_info, value_info) = entry_types(info)?;

                for (i, (key, item)) in mapping.iter().enumerate() {
                    self.check_value(&key_info, key).map_err(|e| e.at_key(i))?;
                    self.check_value(&value_info, item).map_err(|e| e.at_value(i))?;
                }
                Ok(())
            }

            TypeTag::Interface => {
                let iface = interface_of(info)?;
                self.check_interface(&iface, value)
            }

            TypeTag::Error => Err(MarshalError::unsupported("Error marshalling")),
        }
    }

    /// Check that `class` is a subtype of the wrapper registered for `iface`
    pub fn check_class(&self, iface: &InterfaceInfo, class: &HostValue) -> Result<()> {
        let expected = self.registered_class(iface)?;
        match class {
            HostValue::Class(class) if class.is_subclass_of(&expected) => Ok(()),
            HostValue::Class(class) => Err(MarshalError::type_mismatch(iface.full_name(), class.name())),
            other => Err(MarshalError::type_mismatch("type", other.type_name())),
        }
    }

    fn check_items(&self, item_info: &TypeInfo, items: &[HostValue]) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            self.check_value(item_info, item).map_err(|e| e.at_item(i))?;
        }
        Ok(())
    }

    fn check_number(&self, tag: TypeTag, value: &HostValue) -> Result<()> {
        if !value.is_number() {
            return Err(MarshalError::type_mismatch("number", value.type_name()));
        }

        let range = bounds(tag).ok_or_else(|| MarshalError::conversion("Non-numeric type tag"))?;
        let in_range = match range {
            Bounds::Float { lower, upper } => {
                let number = value.to_f64()?;
                // NaN compares false both ways and passes, as in the host
                !(number < lower || number > upper)
            }
            Bounds::Int { lower, upper } => {
                let number = value.to_bigint()?;
                number >= BigInt::from(lower) && number <= BigInt::from(upper)
            }
        };

        if in_range {
            Ok(())
        } else {
            Err(MarshalError::range(range.lower_display(), range.upper_display()))
        }
    }

    fn check_interface(&self, iface: &InterfaceInfo, value: &HostValue) -> Result<()> {
        match iface.info_type() {
            InfoType::Callback => require_callable(value),
            InfoType::Enum => self.check_instance(iface, value),
            InfoType::Flags => {
                // Zero is a valid value for every flags type
                if value.is_number() && value.to_bigint().is_ok_and(|v| v.is_zero()) {
                    return Ok(());
                }
                self.check_instance(iface, value)
            }
            InfoType::Struct => {
                let g_type = iface.registered_type();
                if self.types.is_a(g_type, DynamicType::VALUE) {
                    if self.model.type_of_value(value) == DynamicType::INVALID {
                        return Err(MarshalError::type_mismatch(
                            "of a known GType",
                            value.type_name(),
                        ));
                    }
                    Ok(())
                } else if self.types.is_a(g_type, DynamicType::CLOSURE) {
                    require_callable(value)
                } else {
                    self.check_instance(iface, value)
                }
            }
            InfoType::Boxed | InfoType::Interface | InfoType::Object => {
                self.check_instance(iface, value)
            }
            InfoType::Union => Err(MarshalError::unsupported("union marshalling")),
        }
    }

    /// `isinstance(value, wrapper_for(iface))`
    fn check_instance(&self, iface: &InterfaceInfo, value: &HostValue) -> Result<()> {
        let expected = self.registered_class(iface)?;
        match value.instance_class() {
            Some(class) if class.is_subclass_of(&expected) => Ok(()),
            _ => Err(MarshalError::type_mismatch(iface.full_name(), value.type_name())),
        }
    }

    /// Wrapper class for an interface, by dynamic type or by name
    fn registered_class(&self, iface: &InterfaceInfo) -> Result<Arc<HostClass>> {
        let g_type = iface.registered_type();
        let class = if g_type != DynamicType::NONE {
            self.model.lookup_wrapper_type(g_type)
        } else {
            self.model.lookup_wrapper_by_name(&iface.full_name())
        };
        class.ok_or_else(|| MarshalError::new(ErrorKind::NoWrapper(iface.full_name())))
    }
}

fn require_callable(value: &HostValue) -> Result<()> {
    if value.is_callable() {
        Ok(())
    } else {
        Err(MarshalError::type_mismatch("callable", value.type_name()))
    }
}

/// Element descriptor of an array or list
pub(super) fn element_type(info: &TypeInfo) -> Result<TypeInfo> {
    info.param_type(0).ok_or_else(|| {
        MarshalError::conversion(format!("{} descriptor has no element type", info.tag().name()))
    })
}

/// Key and value descriptors of a hash table
pub(super) fn entry_types(info: &TypeInfo) -> Result<(TypeInfo, TypeInfo)> {
    match (info.param_type(0), info.param_type(1)) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(MarshalError::conversion(
            "ghash descriptor needs key and value types",
        )),
    }
}

pub(super) fn interface_of(info: &TypeInfo) -> Result<InterfaceInfo> {
    info.interface_info()
        .ok_or_else(|| MarshalError::conversion("interface descriptor has no interface info"))
}
