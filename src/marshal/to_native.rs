//! Host → native conversion
//!
//! Containers convert their elements with the derived item transfer and
//! unwind everything converted so far before reporting an indexed error.

use super::validate::{element_type, entry_types, interface_of};
use super::Marshaller;
use crate::error::{MarshalError, Result};
use crate::host::HostValue;
use crate::introspection::{Direction, InfoType, InterfaceInfo, Transfer, TypeInfo, TypeTag};
use crate::logging;
use crate::native::list::Node;
use crate::native::string::{filename_from_utf8, string_new};
use crate::native::{
    typthon_object_ref, Argument, KeyEquality, ListNode, NativeArray, NativeClosure,
    NativeHashTable, NativeValue, SListNode,
};
use crate::types::DynamicType;
use chrono::{Local, TimeZone};
use num_traits::ToPrimitive;
use std::ffi::c_void;
use std::ptr;
use tracing::warn;

impl Marshaller {
    /// Convert a host value into a native slot
    ///
    /// Numeric values are coerced but not range checked; run
    /// `check_value` first.
    pub fn to_native(&self, value: &HostValue, info: &TypeInfo, transfer: Transfer) -> Result<Argument> {
        let tag = info.tag();
        logging::log_conversion("to_native", tag.name());

        let arg = match tag {
            TypeTag::Void => {
                if !info.is_pointer() {
                    Argument::Void
                } else {
                    self.check_transfer(
                        transfer == Transfer::Nothing,
                        tag,
                        transfer,
                        "untyped pointers are always borrowed",
                    );
                    match value {
                        HostValue::None => Argument::Pointer(ptr::null_mut()),
                        other => Argument::Pointer(self.opaque.insert(other.clone())),
                    }
                }
            }
            TypeTag::Boolean => Argument::Boolean(value.is_truthy()),

            TypeTag::Int8 => Argument::Int8(coerce_signed(value)? as i8),
            TypeTag::Int16 => Argument::Int16(coerce_signed(value)? as i16),
            TypeTag::Int32 => Argument::Int32(coerce_signed(value)? as i32),
            TypeTag::Int64 => Argument::Int64(coerce_signed(value)?),
            TypeTag::Short => Argument::Short(coerce_signed(value)? as _),
            TypeTag::Int => Argument::Int(coerce_signed(value)? as _),
            TypeTag::Long => Argument::Long(coerce_signed(value)? as _),
            TypeTag::SSize => Argument::SSize(coerce_signed(value)? as isize),
            TypeTag::UInt8 => Argument::UInt8(coerce_signed(value)? as u8),
            TypeTag::UInt16 => Argument::UInt16(coerce_signed(value)? as u16),
            TypeTag::UShort => Argument::UShort(coerce_signed(value)? as _),
            TypeTag::UInt32 => Argument::UInt32(coerce_unsigned(value)? as u32),
            TypeTag::UInt64 => Argument::UInt64(coerce_unsigned(value)?),
            TypeTag::UInt => Argument::UInt(coerce_unsigned(value)? as _),
            TypeTag::ULong => Argument::ULong(coerce_unsigned(value)? as _),
            TypeTag::Size => Argument::Size(coerce_unsigned(value)? as usize),

            TypeTag::Float => Argument::Float(value.to_f64()? as f32),
            TypeTag::Double => Argument::Double(value.to_f64()?),

            TypeTag::TimeT => Argument::Time(datetime_to_time(value)?),
            TypeTag::GType => Argument::GType(self.model.type_from_object(value)?),

            TypeTag::Utf8 => Argument::String(string_new(expect_str(value)?)?),
            TypeTag::Filename => Argument::String(filename_from_utf8(
                expect_str(value)?,
                self.config.filenames.encoding,
            )?),

            TypeTag::Array => Argument::Array(self.array_to_native(value, info, transfer)?),
            TypeTag::GList => Argument::List(self.list_to_native::<ListNode>(value, info, transfer)?),
            TypeTag::GSList => Argument::SList(self.list_to_native::<SListNode>(value, info, transfer)?),
            TypeTag::GHash => Argument::HashTable(self.hash_to_native(value, info, transfer)?),

            TypeTag::Interface => {
                let iface = interface_of(info)?;
                self.interface_to_native(value, info, &iface, transfer)?
            }

            TypeTag::Error => return Err(MarshalError::unsupported("Error marshalling")),
        };

        Ok(arg)
    }

    fn array_to_native(
        &self,
        value: &HostValue,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<*mut NativeArray> {
        let items = value
            .as_sequence()
            .ok_or_else(|| MarshalError::type_mismatch("sequence", value.type_name()))?;
        let item_info = element_type(info)?;
        let item_transfer = transfer.item_transfer();

        let array = NativeArray::sized_new(
            info.is_zero_terminated(),
            item_info.storage_size(),
            items.len(),
        );

        for (i, item) in items.iter().enumerate() {
            match self.to_native(item, &item_info, item_transfer) {
                // Safety: `array` was allocated above and is not shared yet
                Ok(converted) => unsafe { (*array).push(converted) },
                Err(e) => {
                    // Safety: everything reachable was built by this conversion
                    unsafe { self.release(Argument::Array(array), info, Transfer::Nothing, Direction::In); }
                    return Err(e.at_item(i));
                }
            }
        }

        Ok(array)
    }

    /// Build a list by prepending in reverse, so native order matches host order
    fn list_to_native<N: Node>(
        &self,
        value: &HostValue,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<*mut N>
    where
        Argument: ListSlot<N>,
    {
        let items = value
            .as_sequence()
            .ok_or_else(|| MarshalError::type_mismatch("sequence", value.type_name()))?;
        let item_info = element_type(info)?;
        let item_transfer = transfer.item_transfer();

        let mut list: *mut N = ptr::null_mut();
        for (i, item) in items.iter().enumerate().rev() {
            match self.to_native(item, &item_info, item_transfer) {
                // Safety: `list` is null or a list built by this loop
                Ok(converted) => list = unsafe { N::prepend(list, converted) },
                Err(e) => {
                    // Safety: everything reachable was built by this conversion
                    unsafe { self.release(<Argument as ListSlot<N>>::wrap_list(list), info, Transfer::Nothing, Direction::In); }
                    return Err(e.at_item(i));
                }
            }
        }

        Ok(list)
    }

    fn hash_to_native(
        &self,
        value: &HostValue,
        info: &TypeInfo,
        transfer: Transfer,
    ) -> Result<*mut NativeHashTable> {
        let mapping = value
            .as_mapping()
            .ok_or_else(|| MarshalError::type_mismatch("mapping", value.type_name()))?;
        let (key_info, value_info) = entry_types(info)?;
        let item_transfer = transfer.item_transfer();

        let equality = if key_info.tag().is_string() {
            KeyEquality::Content
        } else {
            KeyEquality::Identity
        };
        let table = NativeHashTable::new(equality);

        for (i, (key, item)) in mapping.iter().enumerate() {
            let native_key = match self.to_native(key, &key_info, item_transfer) {
                Ok(converted) => converted,
                Err(e) => {
                    // Safety: everything reachable was built by this conversion
                    unsafe { self.release(Argument::HashTable(table), info, Transfer::Nothing, Direction::In); }
                    return Err(e.at_item(i));
                }
            };
            let native_value = match self.to_native(item, &value_info, item_transfer) {
                Ok(converted) => converted,
                Err(e) => {
                    // Safety: everything reachable was built by this conversion
                    unsafe { self.release(native_key, &key_info, Transfer::Nothing, Direction::In); }
                    // Safety: everything reachable was built by this conversion
                    unsafe { self.release(Argument::HashTable(table), info, Transfer::Nothing, Direction::In); }
                    return Err(e.at_item(i));
                }
            };
            // Safety: `table` was allocated above and is not shared yet
            unsafe { (*table).insert(native_key, native_value) };
        }

        Ok(table)
    }

    fn interface_to_native(
        &self,
        value: &HostValue,
        info: &TypeInfo,
        iface: &InterfaceInfo,
        transfer: Transfer,
    ) -> Result<Argument> {
        match iface.info_type() {
            InfoType::Callback => Err(MarshalError::unsupported(
                "callback marshalling outside a trampoline",
            )),
            InfoType::Struct | InfoType::Boxed => {
                if value.is_none() {
                    return Ok(Argument::Pointer(ptr::null_mut()));
                }
                self.struct_to_native(value, info, iface, transfer)
                    .map(Argument::Pointer)
            }
            InfoType::Enum | InfoType::Flags => Ok(Argument::Enum(coerce_signed(value)?)),
            InfoType::Object | InfoType::Interface => {
                let object = self.model.unwrap_native_handle(value)?;
                if transfer == Transfer::Everything {
                    // Safety: the wrapper keeps the object alive
                    unsafe { typthon_object_ref(object) };
                }
                Ok(Argument::Pointer(object as *mut c_void))
            }
            InfoType::Union => Err(MarshalError::unsupported("union marshalling")),
        }
    }

    fn struct_to_native(
        &self,
        value: &HostValue,
        info: &TypeInfo,
        iface: &InterfaceInfo,
        transfer: Transfer,
    ) -> Result<*mut c_void> {
        let g_type = iface.registered_type();
        let tag = TypeTag::Interface;

        if self.types.is_a(g_type, DynamicType::VALUE) {
            let value_type = self.model.type_of_value(value);
            if !value_type.is_valid() {
                return Err(MarshalError::conversion("unable to retrieve object's GType"));
            }
            self.check_transfer(transfer == Transfer::Nothing, tag, transfer, "GValue is always copied");

            let cell = NativeValue::alloc(value_type);
            // Safety: `cell` was allocated above
            if let Err(e) = self.model.value_from_host(unsafe { &mut *cell }, value) {
                unsafe { NativeValue::free(cell) };
                warn!(event = "value_conversion_failed", error = %e);
                return Err(MarshalError::conversion("host value conversion to GValue failed"));
            }
            Ok(cell as *mut c_void)
        } else if self.types.is_a(g_type, DynamicType::CLOSURE) {
            self.check_transfer(transfer == Transfer::Nothing, tag, transfer, "GClosure is always new");
            match value {
                HostValue::Callable(callable) => Ok(NativeClosure::new(callable.clone()) as *mut c_void),
                _ => Err(MarshalError::conversion("host value conversion to GClosure failed")),
            }
        } else if self.types.is_a(g_type, DynamicType::BOXED) {
            let pointer = self.model.wrapped_pointer(value)?;
            if transfer == Transfer::Everything {
                self.types.boxed_copy(g_type, pointer)
            } else {
                Ok(pointer)
            }
        } else if self.types.is_a(g_type, DynamicType::POINTER) || g_type == DynamicType::NONE {
            self.check_transfer(
                !info.is_pointer() || transfer == Transfer::Nothing,
                tag,
                transfer,
                "plain structs cannot be handed over",
            );
            self.model.wrapped_pointer(value)
        } else {
            Err(MarshalError::unsupported(format!(
                "structure type '{}'",
                self.type_name(g_type)
            )))
        }
    }
}

/// Slot variant that carries a list of node type `N`
trait ListSlot<N> {
    fn wrap_list(list: *mut N) -> Argument;
}

impl ListSlot<ListNode> for Argument {
    fn wrap_list(list: *mut ListNode) -> Argument {
        Argument::List(list)
    }
}

impl ListSlot<SListNode> for Argument {
    fn wrap_list(list: *mut SListNode) -> Argument {
        Argument::SList(list)
    }
}

/// `int(value)` narrowed to a C long
fn coerce_signed(value: &HostValue) -> Result<i64> {
    value
        .to_bigint()?
        .to_i64()
        .ok_or_else(|| MarshalError::conversion("int too large to convert to C long"))
}

/// `int(value)` as an unsigned long long; negative values wrap
fn coerce_unsigned(value: &HostValue) -> Result<u64> {
    let number = value.to_bigint()?;
    number
        .to_u64()
        .or_else(|| number.to_i64().map(|v| v as u64))
        .ok_or_else(|| MarshalError::conversion("int too large to convert to C unsigned long long"))
}

fn expect_str(value: &HostValue) -> Result<&str> {
    match value {
        HostValue::Str(s) => Ok(s.as_str()),
        other => Err(MarshalError::type_mismatch("string", other.type_name())),
    }
}

/// Local calendar time to seconds since the epoch
fn datetime_to_time(value: &HostValue) -> Result<i64> {
    let datetime = match value {
        HostValue::DateTime(datetime) => datetime,
        other => return Err(MarshalError::type_mismatch("datetime.datetime", other.type_name())),
    };
    if datetime.tzinfo.is_some() {
        warn!(event = "tzinfo_ignored", "tzinfo ignored; only local time is supported");
    }
    Local
        .from_local_datetime(&datetime.naive)
        .earliest()
        .map(|local| local.timestamp())
        .ok_or_else(|| MarshalError::conversion("datetime conversion failed"))
}
