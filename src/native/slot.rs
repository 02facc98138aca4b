//! Native argument slots
//!
//! `Argument` is the typed form used by the converters; every tag has its
//! own variant so converters match exhaustively. `RawArgument` is the
//! untagged C union handed across the ABI boundary.

use super::array::NativeArray;
use super::error::NativeError;
use super::hash::NativeHashTable;
use super::list::{ListNode, SListNode};
use crate::introspection::{InfoType, TypeInfo, TypeTag};
use crate::types::DynamicType;
use std::ffi::{c_char, c_int, c_long, c_short, c_uint, c_ulong, c_ushort, c_void};
use std::ptr;

/// One native argument or return value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    Void,
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Short(c_short),
    UShort(c_ushort),
    Int(c_int),
    UInt(c_uint),
    Long(c_long),
    ULong(c_ulong),
    SSize(isize),
    Size(usize),
    Float(f32),
    Double(f64),
    /// Seconds since the epoch
    Time(i64),
    GType(DynamicType),
    String(*mut c_char),
    Array(*mut NativeArray),
    List(*mut ListNode),
    SList(*mut SListNode),
    HashTable(*mut NativeHashTable),
    /// Enum or flags value
    Enum(i64),
    /// Struct, boxed, object, variant, closure or untyped payload
    Pointer(*mut c_void),
    /// Cell holding an optional error
    Error(*mut *mut NativeError),
}

impl Argument {
    /// Zero value for the slot shape of `info`
    pub fn zeroed(info: &TypeInfo) -> Argument {
        match info.tag() {
            TypeTag::Void if info.is_pointer() => Self::Pointer(ptr::null_mut()),
            TypeTag::Void => Self::Void,
            TypeTag::Boolean => Self::Boolean(false),
            TypeTag::Int8 => Self::Int8(0),
            TypeTag::UInt8 => Self::UInt8(0),
            TypeTag::Int16 => Self::Int16(0),
            TypeTag::UInt16 => Self::UInt16(0),
            TypeTag::Int32 => Self::Int32(0),
            TypeTag::UInt32 => Self::UInt32(0),
            TypeTag::Int64 => Self::Int64(0),
            TypeTag::UInt64 => Self::UInt64(0),
            TypeTag::Short => Self::Short(0),
            TypeTag::UShort => Self::UShort(0),
            TypeTag::Int => Self::Int(0),
            TypeTag::UInt => Self::UInt(0),
            TypeTag::Long => Self::Long(0),
            TypeTag::ULong => Self::ULong(0),
            TypeTag::SSize => Self::SSize(0),
            TypeTag::Size => Self::Size(0),
            TypeTag::Float => Self::Float(0.0),
            TypeTag::Double => Self::Double(0.0),
            TypeTag::TimeT => Self::Time(0),
            TypeTag::GType => Self::GType(DynamicType::INVALID),
            TypeTag::Utf8 | TypeTag::Filename => Self::String(ptr::null_mut()),
            TypeTag::Array => Self::Array(ptr::null_mut()),
            TypeTag::GList => Self::List(ptr::null_mut()),
            TypeTag::GSList => Self::SList(ptr::null_mut()),
            TypeTag::GHash => Self::HashTable(ptr::null_mut()),
            TypeTag::Error => Self::Error(ptr::null_mut()),
            TypeTag::Interface => match info.interface_info().map(|i| i.info_type()) {
                Some(InfoType::Enum | InfoType::Flags) => Self::Enum(0),
                _ => Self::Pointer(ptr::null_mut()),
            },
        }
    }

    /// Variant name for diagnostics
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean(_) => "boolean",
            Self::Int8(_) => "int8",
            Self::UInt8(_) => "uint8",
            Self::Int16(_) => "int16",
            Self::UInt16(_) => "uint16",
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Short(_) => "short",
            Self::UShort(_) => "ushort",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Long(_) => "long",
            Self::ULong(_) => "ulong",
            Self::SSize(_) => "ssize",
            Self::Size(_) => "size",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Time(_) => "time",
            Self::GType(_) => "gtype",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::List(_) => "list",
            Self::SList(_) => "slist",
            Self::HashTable(_) => "hash table",
            Self::Enum(_) => "enum",
            Self::Pointer(_) => "pointer",
            Self::Error(_) => "error",
        }
    }

    /// Pointer payload, or null for scalar variants
    pub fn as_ptr(&self) -> *mut c_void {
        match *self {
            Self::String(p) => p as *mut c_void,
            Self::Array(p) => p as *mut c_void,
            Self::List(p) => p as *mut c_void,
            Self::SList(p) => p as *mut c_void,
            Self::HashTable(p) => p as *mut c_void,
            Self::Pointer(p) => p,
            Self::Error(p) => p as *mut c_void,
            _ => ptr::null_mut(),
        }
    }

    /// True for pointer variants holding null
    pub fn is_null(&self) -> bool {
        match self {
            Self::String(_)
            | Self::Array(_)
            | Self::List(_)
            | Self::SList(_)
            | Self::HashTable(_)
            | Self::Pointer(_)
            | Self::Error(_) => self.as_ptr().is_null(),
            _ => false,
        }
    }

    /// Bit pattern used for identity hashing
    pub fn identity_bits(&self) -> u64 {
        match *self {
            Self::Void => 0,
            Self::Boolean(v) => v as u64,
            Self::Int8(v) => v as u64,
            Self::UInt8(v) => v as u64,
            Self::Int16(v) => v as u64,
            Self::UInt16(v) => v as u64,
            Self::Int32(v) => v as u64,
            Self::UInt32(v) => v as u64,
            Self::Int64(v) | Self::Time(v) | Self::Enum(v) => v as u64,
            Self::UInt64(v) => v,
            Self::Short(v) => v as u64,
            Self::UShort(v) => v as u64,
            Self::Int(v) => v as u64,
            Self::UInt(v) => v as u64,
            Self::Long(v) => v as u64,
            Self::ULong(v) => v as u64,
            Self::SSize(v) => v as u64,
            Self::Size(v) => v as u64,
            Self::Float(v) => v.to_bits() as u64,
            Self::Double(v) => v.to_bits(),
            Self::GType(t) => t.raw() as u64,
            _ => self.as_ptr() as usize as u64,
        }
    }
}

/// Untagged value as laid out by the C ABI
#[repr(C)]
pub union RawArgument {
    pub v_int8: i8,
    pub v_uint8: u8,
    pub v_int16: i16,
    pub v_uint16: u16,
    pub v_int32: i32,
    pub v_uint32: u32,
    pub v_int64: i64,
    pub v_uint64: u64,
    pub v_short: c_short,
    pub v_ushort: c_ushort,
    pub v_int: c_int,
    pub v_uint: c_uint,
    pub v_long: c_long,
    pub v_ulong: c_ulong,
    pub v_ssize: isize,
    pub v_size: usize,
    pub v_float: f32,
    pub v_double: f64,
    pub v_pointer: *mut c_void,
}

impl RawArgument {
    #[inline]
    pub const fn zeroed() -> Self {
        Self { v_uint64: 0 }
    }

    /// Encode a typed argument; integers are widened to 64 bits the way
    /// closure return slots expect
    pub fn from_argument(arg: Argument) -> Self {
        let mut raw = Self::zeroed();
        match arg {
            Argument::Void => {}
            Argument::Boolean(v) => raw.v_int64 = v as i64,
            Argument::Int8(v) => raw.v_int64 = v as i64,
            Argument::UInt8(v) => raw.v_uint64 = v as u64,
            Argument::Int16(v) => raw.v_int64 = v as i64,
            Argument::UInt16(v) => raw.v_uint64 = v as u64,
            Argument::Int32(v) => raw.v_int64 = v as i64,
            Argument::UInt32(v) => raw.v_uint64 = v as u64,
            Argument::Int64(v) | Argument::Time(v) | Argument::Enum(v) => raw.v_int64 = v,
            Argument::UInt64(v) => raw.v_uint64 = v,
            Argument::Short(v) => raw.v_int64 = v as i64,
            Argument::UShort(v) => raw.v_uint64 = v as u64,
            Argument::Int(v) => raw.v_int64 = v as i64,
            Argument::UInt(v) => raw.v_uint64 = v as u64,
            Argument::Long(v) => raw.v_int64 = v as i64,
            Argument::ULong(v) => raw.v_uint64 = v as u64,
            Argument::SSize(v) => raw.v_int64 = v as i64,
            Argument::Size(v) => raw.v_uint64 = v as u64,
            Argument::Float(v) => raw.v_float = v,
            Argument::Double(v) => raw.v_double = v,
            Argument::GType(t) => raw.v_size = t.raw() as usize,
            other => raw.v_pointer = other.as_ptr(),
        }
        raw
    }

    /// Decode the value stored at `ptr` according to `info`
    ///
    /// # Safety
    /// `ptr` must point to readable storage of `info.storage_size()` bytes.
    /// Inline structs decode to the address of their storage.
    pub unsafe fn read(ptr: *const c_void, info: &TypeInfo) -> Argument {
        macro_rules! load {
            ($ty:ty) => {
                ptr::read_unaligned(ptr as *const $ty)
            };
        }
        match info.tag() {
            TypeTag::Void if info.is_pointer() => Argument::Pointer(load!(*mut c_void)),
            TypeTag::Void => Argument::Void,
            TypeTag::Boolean => Argument::Boolean(load!(c_int) != 0),
            TypeTag::Int8 => Argument::Int8(load!(i8)),
            TypeTag::UInt8 => Argument::UInt8(load!(u8)),
            TypeTag::Int16 => Argument::Int16(load!(i16)),
            TypeTag::UInt16 => Argument::UInt16(load!(u16)),
            TypeTag::Int32 => Argument::Int32(load!(i32)),
            TypeTag::UInt32 => Argument::UInt32(load!(u32)),
            TypeTag::Int64 => Argument::Int64(load!(i64)),
            TypeTag::UInt64 => Argument::UInt64(load!(u64)),
            TypeTag::Short => Argument::Short(load!(c_short)),
            TypeTag::UShort => Argument::UShort(load!(c_ushort)),
            TypeTag::Int => Argument::Int(load!(c_int)),
            TypeTag::UInt => Argument::UInt(load!(c_uint)),
            TypeTag::Long => Argument::Long(load!(c_long)),
            TypeTag::ULong => Argument::ULong(load!(c_ulong)),
            TypeTag::SSize => Argument::SSize(load!(isize)),
            TypeTag::Size => Argument::Size(load!(usize)),
            TypeTag::Float => Argument::Float(load!(f32)),
            TypeTag::Double => Argument::Double(load!(f64)),
            TypeTag::TimeT => Argument::Time(load!(i64)),
            TypeTag::GType => Argument::GType(DynamicType::from_raw(load!(usize) as u32)),
            TypeTag::Utf8 | TypeTag::Filename => Argument::String(load!(*mut c_char)),
            TypeTag::Array => Argument::Array(load!(*mut NativeArray)),
            TypeTag::GList => Argument::List(load!(*mut ListNode)),
            TypeTag::GSList => Argument::SList(load!(*mut SListNode)),
            TypeTag::GHash => Argument::HashTable(load!(*mut NativeHashTable)),
            TypeTag::Error => Argument::Error(load!(*mut *mut NativeError)),
            TypeTag::Interface => match info.interface_info().map(|i| i.info_type()) {
                Some(InfoType::Enum | InfoType::Flags) => Argument::Enum(load!(c_int) as i64),
                Some(InfoType::Struct | InfoType::Boxed | InfoType::Union) if !info.is_pointer() => {
                    Argument::Pointer(ptr as *mut c_void)
                }
                _ => Argument::Pointer(load!(*mut c_void)),
            },
        }
    }
}

impl Default for RawArgument {
    #[inline]
    fn default() -> Self {
        Self::zeroed()
    }
}

// Manual implementations for Copy, Clone, and Debug since union doesn't auto-derive
impl Copy for RawArgument {}
impl Clone for RawArgument {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl std::fmt::Debug for RawArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawArgument({:#x})", unsafe { self.v_uint64 })
    }
}
