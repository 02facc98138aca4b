//! Native → host conversion

use super::validate::{element_type, entry_types, interface_of};
use super::Marshaller;
use crate::error::{ErrorKind, MarshalError, Result};
use crate::host::{ClassKind, HostDateTime, HostDict, HostValue};
use crate::introspection::{InfoType, InterfaceInfo, Transfer, TypeInfo, TypeTag};
use crate::logging;
use crate::native::list::{self, Node};
use crate::native::string::{filename_to_utf8, string_bytes};
use crate::native::{Argument, NativeArray, NativeHashTable, NativeObject, NativeValue};
use crate::types::DynamicType;
use chrono::{Local, TimeZone};
use num_bigint::BigInt;
use std::ffi::c_void;

impl Marshaller {
    /// Convert a native slot into a host value
    ///
    /// With `Transfer::Everything` the produced wrappers own what they
    /// point at; otherwise they borrow it.
    ///
    /// # Safety
    /// Every pointer reachable from `arg` must be null or live and laid out
    /// as `info` describes.
    pub unsafe fn to_host(&self, arg: Argument, info: &TypeInfo, transfer: Transfer) -> Result<HostValue> {
        let tag = info.tag();
        logging::log_conversion("to_host", tag.name());

        let value = match (tag, arg) {
            (TypeTag::Void, Argument::Pointer(key)) => {
                self.check_transfer(
                    transfer == Transfer::Nothing,
                    tag,
                    transfer,
                    "untyped pointers are always borrowed",
                );
                self.opaque.get(key).unwrap_or(HostValue::None)
            }
            (TypeTag::Void, Argument::Void) => HostValue::None,

            (TypeTag::Boolean, Argument::Boolean(v)) => HostValue::Bool(v),

            (TypeTag::Int8, Argument::Int8(v)) => HostValue::Int(v.into()),
            (TypeTag::UInt8, Argument::UInt8(v)) => HostValue::Int(v.into()),
            (TypeTag::Int16, Argument::Int16(v)) => HostValue::Int(v.into()),
            (TypeTag::UInt16, Argument::UInt16(v)) => HostValue::Int(v.into()),
            (TypeTag::Int32, Argument::Int32(v)) => HostValue::Int(v.into()),
            (TypeTag::Short, Argument::Short(v)) => HostValue::Int(v.into()),
            (TypeTag::UShort, Argument::UShort(v)) => HostValue::Int(v.into()),
            (TypeTag::Int, Argument::Int(v)) => HostValue::Int(v.into()),
            (TypeTag::Long, Argument::Long(v)) => HostValue::Int(v as i64),
            (TypeTag::SSize, Argument::SSize(v)) => HostValue::Int(v as i64),

            // Wide or unsigned slots become unbounded integers
            (TypeTag::UInt32, Argument::UInt32(v)) => HostValue::Long(BigInt::from(v)),
            (TypeTag::Int64, Argument::Int64(v)) => HostValue::Long(BigInt::from(v)),
            (TypeTag::UInt64, Argument::UInt64(v)) => HostValue::Long(BigInt::from(v)),
            (TypeTag::UInt, Argument::UInt(v)) => HostValue::Long(BigInt::from(v)),
            (TypeTag::ULong, Argument::ULong(v)) => HostValue::Long(BigInt::from(v)),
            (TypeTag::Size, Argument::Size(v)) => HostValue::Long(BigInt::from(v)),

            (TypeTag::Float, Argument::Float(v)) => HostValue::Float(v.into()),
            (TypeTag::Double, Argument::Double(v)) => HostValue::Float(v),

            (TypeTag::TimeT, Argument::Time(t)) => HostValue::DateTime(time_to_datetime(t)?),
            (TypeTag::GType, Argument::GType(g_type)) => HostValue::GType(g_type),

            (TypeTag::Utf8 | TypeTag::Filename, Argument::String(p)) if p.is_null() => HostValue::None,
            (TypeTag::Utf8, Argument::String(p)) => {
                HostValue::Str(String::from_utf8_lossy(string_bytes(p)).into_owned())
            }
            (TypeTag::Filename, Argument::String(p)) => {
                HostValue::Str(filename_to_utf8(p, self.config.filenames.encoding)?)
            }

            (TypeTag::Array, Argument::Array(array)) if array.is_null() => HostValue::None,
            (TypeTag::Array, Argument::Array(array)) => self.array_to_host(array, info, transfer)?,

            (TypeTag::GList, Argument::List(head)) => self.list_to_host(head, info, transfer)?,
            (TypeTag::GSList, Argument::SList(head)) => self.list_to_host(head, info, transfer)?,

            (TypeTag::GHash, Argument::HashTable(table)) if table.is_null() => HostValue::None,
            (TypeTag::GHash, Argument::HashTable(table)) => self.hash_to_host(table, info, transfer)?,

            // Errors travel through the exception channel, not as values
            (TypeTag::Error, _) => HostValue::None,

            (TypeTag::Interface, slot) => {
                let iface = interface_of(info)?;
                self.interface_to_host(slot, &iface, transfer)?
            }

            (tag, slot) => {
                return Err(MarshalError::new(ErrorKind::SlotMismatch {
                    tag: tag.name(),
                    found: slot.variant_name(),
                }))
            }
        };

        Ok(value)
    }

    unsafe fn array_to_host(
        &self,
        array: *mut NativeArray,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<HostValue> {
        let item_info = element_type(info)?;
        // Inline structs live in the array's storage and stay owned by it
        let item_transfer = if is_inline_struct(&item_info) {
            Transfer::Nothing
        } else {
            transfer.item_transfer()
        };

        let items = (*array)
            .items()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.to_host(*item, &item_info, item_transfer)
                    .map_err(|e| e.at_item(i))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(HostValue::Tuple(items))
    }

    unsafe fn list_to_host<N: Node>(
        &self,
        head: *mut N,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<HostValue> {
        if head.is_null() {
            return Ok(HostValue::None);
        }
        let item_info = element_type(info)?;
        let item_transfer = transfer.item_transfer();

        let items = list::iter(head)
            .enumerate()
            .map(|(i, item)| {
                self.to_host(*item, &item_info, item_transfer)
                    .map_err(|e| e.at_item(i))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(HostValue::List(items))
    }

    unsafe fn hash_to_host(
        &self,
        table: *mut NativeHashTable,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<HostValue> {
        let (key_info, value_info) = entry_types(info)?;
        let item_transfer = transfer.item_transfer();

        let mut dict = HostDict::new();
        for (i, (key, value)) in (*table).iter().enumerate() {
            let host_key = self
                .to_host(*key, &key_info, item_transfer)
                .map_err(|e| e.at_key(i))?;
            let host_value = self
                .to_host(*value, &value_info, item_transfer)
                .map_err(|e| e.at_value(i))?;
            dict.insert(host_key, host_value);
        }

        Ok(HostValue::Dict(dict))
    }

    unsafe fn interface_to_host(
        &self,
        slot: Argument,
        iface: &InterfaceInfo,
        transfer: Transfer,
    ) -> Result<HostValue> {
        let g_type = iface.registered_type();

        match (iface.info_type(), slot) {
            (InfoType::Callback, _) => Err(MarshalError::unsupported("callback marshalling")),
            (InfoType::Union, _) => Err(MarshalError::unsupported("union marshalling")),

            (InfoType::Enum | InfoType::Flags, Argument::Enum(value)) => {
                self.model.enum_to_host(g_type, value)
            }

            (InfoType::Struct | InfoType::Boxed, Argument::Pointer(p)) if p.is_null() => Ok(HostValue::None),
            (InfoType::Struct | InfoType::Boxed, Argument::Pointer(p)) => {
                self.struct_to_host(p, iface, transfer)
            }

            (InfoType::Object | InfoType::Interface, Argument::Pointer(p)) if p.is_null() => {
                Ok(HostValue::None)
            }
            (InfoType::Object | InfoType::Interface, Argument::Pointer(p)) => {
                self.model.wrap_native_handle(p as *mut NativeObject)
            }

            (info_type, slot) => Err(MarshalError::new(ErrorKind::SlotMismatch {
                tag: info_type.name(),
                found: slot.variant_name(),
            })),
        }
    }

    unsafe fn struct_to_host(
        &self,
        pointer: *mut c_void,
        iface: &InterfaceInfo,
        transfer: Transfer,
    ) -> Result<HostValue> {
        let g_type = iface.registered_type();
        let owns = transfer == Transfer::Everything;

        if self.types.is_a(g_type, DynamicType::VALUE) {
            self.model.value_to_host(&*(pointer as *const NativeValue))
        } else if self.types.is_a(g_type, DynamicType::BOXED) {
            let class = self
                .model
                .lookup_wrapper_type(g_type)
                .ok_or_else(|| MarshalError::new(ErrorKind::NoWrapper(self.type_name(g_type))))?;
            self.model.new_boxed_wrapper(&class, g_type, pointer, owns)
        } else if self.types.is_a(g_type, DynamicType::POINTER) {
            match self.model.lookup_wrapper_type(g_type) {
                Some(class) if class.kind() == ClassKind::Struct => {
                    self.model.new_struct_wrapper(&class, pointer, owns)
                }
                _ => {
                    self.check_transfer(
                        transfer == Transfer::Nothing,
                        TypeTag::Interface,
                        transfer,
                        "generic pointer wrappers never own memory",
                    );
                    Ok(self.model.new_pointer_wrapper(g_type, pointer))
                }
            }
        } else if g_type == DynamicType::NONE {
            let class = self
                .model
                .lookup_wrapper_by_name(&iface.full_name())
                .ok_or_else(|| MarshalError::new(ErrorKind::NoWrapper(iface.full_name())))?;
            self.model.new_struct_wrapper(&class, pointer, owns)
        } else {
            Err(MarshalError::unsupported(format!(
                "structure type '{}'",
                self.type_name(g_type)
            )))
        }
    }
}

fn is_inline_struct(info: &TypeInfo) -> bool {
    info.tag() == TypeTag::Interface
        && !info.is_pointer()
        && matches!(
            info.interface_info().map(|i| i.info_type()),
            Some(InfoType::Struct | InfoType::Boxed | InfoType::Union)
        )
}

/// Seconds since the epoch to local calendar time
fn time_to_datetime(time: i64) -> Result<HostDateTime> {
    Local
        .timestamp_opt(time, 0)
        .single()
        .map(|local| HostDateTime::naive(local.naive_local()))
        .ok_or_else(|| MarshalError::conversion("datetime conversion failed"))
}
