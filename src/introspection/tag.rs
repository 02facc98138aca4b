//! Type tags - the discriminant of a type descriptor

use std::ffi::{c_int, c_long, c_short};
use std::mem::size_of;

/// Which kind of value a slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    SSize,
    Size,
    Float,
    Double,
    TimeT,
    GType,
    Utf8,
    Filename,
    Array,
    Interface,
    GList,
    GSList,
    GHash,
    Error,
}

impl TypeTag {
    /// Every tag, in declaration order
    pub const ALL: [TypeTag; 30] = [
        Self::Void,
        Self::Boolean,
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Short,
        Self::UShort,
        Self::Int,
        Self::UInt,
        Self::Long,
        Self::ULong,
        Self::SSize,
        Self::Size,
        Self::Float,
        Self::Double,
        Self::TimeT,
        Self::GType,
        Self::Utf8,
        Self::Filename,
        Self::Array,
        Self::Interface,
        Self::GList,
        Self::GSList,
        Self::GHash,
        Self::Error,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Boolean => "gboolean",
            Self::Int8 => "gint8",
            Self::UInt8 => "guint8",
            Self::Int16 => "gint16",
            Self::UInt16 => "guint16",
            Self::Int32 => "gint32",
            Self::UInt32 => "guint32",
            Self::Int64 => "gint64",
            Self::UInt64 => "guint64",
            Self::Short => "gshort",
            Self::UShort => "gushort",
            Self::Int => "gint",
            Self::UInt => "guint",
            Self::Long => "glong",
            Self::ULong => "gulong",
            Self::SSize => "gssize",
            Self::Size => "gsize",
            Self::Float => "gfloat",
            Self::Double => "gdouble",
            Self::TimeT => "time_t",
            Self::GType => "GType",
            Self::Utf8 => "utf8",
            Self::Filename => "filename",
            Self::Array => "array",
            Self::Interface => "interface",
            Self::GList => "glist",
            Self::GSList => "gslist",
            Self::GHash => "ghash",
            Self::Error => "error",
        }
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::UInt8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Short
                | Self::UShort
                | Self::Int
                | Self::UInt
                | Self::Long
                | Self::ULong
                | Self::SSize
                | Self::Size
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::Utf8 | Self::Filename)
    }

    /// Tags whose slot holds a pointer to heap data
    #[inline]
    pub const fn is_pointer_tag(self) -> bool {
        matches!(
            self,
            Self::Utf8
                | Self::Filename
                | Self::Array
                | Self::GList
                | Self::GSList
                | Self::GHash
                | Self::Error
        )
    }

    /// Storage size of a scalar tag; pointer-sized otherwise
    pub const fn scalar_size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Boolean | Self::Int => size_of::<c_int>(),
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float => 4,
            Self::Int64 | Self::UInt64 | Self::Double | Self::TimeT => 8,
            Self::Short | Self::UShort => size_of::<c_short>(),
            Self::UInt => size_of::<c_int>(),
            Self::Long | Self::ULong => size_of::<c_long>(),
            _ => size_of::<usize>(),
        }
    }
}

/// Refinement of the interface tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    Callback,
    Enum,
    Flags,
    Struct,
    Boxed,
    Object,
    Interface,
    Union,
}

impl InfoType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::Enum => "enum",
            Self::Flags => "flags",
            Self::Struct => "struct",
            Self::Boxed => "boxed",
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Union => "union",
        }
    }
}
