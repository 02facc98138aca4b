//! Closed numeric ranges per tag, computed once

use crate::introspection::TypeTag;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::ffi::{c_int, c_long, c_short, c_uint, c_ulong, c_ushort};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Int { lower: i128, upper: i128 },
    Float { lower: f64, upper: f64 },
}

impl Bounds {
    /// Lower bound as shown in range errors
    pub fn lower_display(&self) -> String {
        match self {
            Self::Int { lower, .. } => lower.to_string(),
            Self::Float { lower, .. } => format!("{:e}", lower),
        }
    }

    /// Upper bound as shown in range errors
    pub fn upper_display(&self) -> String {
        match self {
            Self::Int { upper, .. } => upper.to_string(),
            Self::Float { upper, .. } => format!("{:e}", upper),
        }
    }
}

static BOUNDS: Lazy<HashMap<TypeTag, Bounds>> = Lazy::new(|| {
    fn int(lower: i128, upper: i128) -> Bounds {
        Bounds::Int { lower, upper }
    }

    HashMap::from([
        (TypeTag::Int8, int(i8::MIN as i128, i8::MAX as i128)),
        (TypeTag::UInt8, int(0, u8::MAX as i128)),
        (TypeTag::Int16, int(i16::MIN as i128, i16::MAX as i128)),
        (TypeTag::UInt16, int(0, u16::MAX as i128)),
        (TypeTag::Int32, int(i32::MIN as i128, i32::MAX as i128)),
        (TypeTag::UInt32, int(0, u32::MAX as i128)),
        (TypeTag::Int64, int(i64::MIN as i128, i64::MAX as i128)),
        (TypeTag::UInt64, int(0, u64::MAX as i128)),
        (TypeTag::Short, int(c_short::MIN as i128, c_short::MAX as i128)),
        (TypeTag::UShort, int(0, c_ushort::MAX as i128)),
        (TypeTag::Int, int(c_int::MIN as i128, c_int::MAX as i128)),
        (TypeTag::UInt, int(0, c_uint::MAX as i128)),
        (TypeTag::Long, int(c_long::MIN as i128, c_long::MAX as i128)),
        (TypeTag::SSize, int(c_long::MIN as i128, c_long::MAX as i128)),
        (TypeTag::ULong, int(0, c_ulong::MAX as i128)),
        (TypeTag::Size, int(0, c_ulong::MAX as i128)),
        (
            TypeTag::Float,
            Bounds::Float {
                lower: -(f32::MAX as f64),
                upper: f32::MAX as f64,
            },
        ),
        (
            TypeTag::Double,
            Bounds::Float {
                lower: -f64::MAX,
                upper: f64::MAX,
            },
        ),
    ])
});

/// Range of a numeric tag; `None` for non-numeric tags
#[inline]
pub fn bounds(tag: TypeTag) -> Option<Bounds> {
    BOUNDS.get(&tag).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_numeric_tag_has_bounds() {
        for tag in TypeTag::ALL {
            assert_eq!(
                bounds(tag).is_some(),
                tag.is_integer() || tag.is_float(),
                "{}",
                tag.name()
            );
        }
    }

    #[test]
    fn test_known_ranges() {
        assert_eq!(bounds(TypeTag::Int8), Some(Bounds::Int { lower: -128, upper: 127 }));
        assert_eq!(
            bounds(TypeTag::UInt32),
            Some(Bounds::Int { lower: 0, upper: 4294967295 })
        );
        match bounds(TypeTag::Float) {
            Some(Bounds::Float { lower, upper }) => {
                assert_eq!(upper, f32::MAX as f64);
                assert_eq!(lower, -upper);
            }
            other => panic!("unexpected bounds {:?}", other),
        }
    }
}
