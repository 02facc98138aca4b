//! Wrapping raw C arrays returned by native calls

use super::validate::element_type;
use super::Marshaller;
use crate::error::{MarshalError, Result};
use crate::introspection::TypeInfo;
use crate::logging;
use crate::native::{Argument, NativeArray, RawArgument};
use std::ffi::c_void;

impl Marshaller {
    /// Copy a raw C array into a `NativeArray`
    ///
    /// The length comes from zero termination, then the fixed size, then
    /// the sibling length argument in `args` (index shifted down by one
    /// for methods, whose receiver is not in `args`). The raw buffer stays
    /// with the caller.
    ///
    /// # Safety
    /// `data` must be null or point to as many elements of the element
    /// type as the length source says, plus the terminator when zero
    /// terminated.
    pub unsafe fn array_from_c(
        &self,
        data: *const c_void,
        info: &TypeInfo,
        args: &[Argument],
        is_method: bool,
    ) -> Result<*mut NativeArray> {
        if data.is_null() {
            return Ok(std::ptr::null_mut());
        }
        let _perf = logging::perf::track("array_from_c");

        let item_info = element_type(info)?;
        let item_size = item_info.storage_size();
        if item_size == 0 {
            return Err(MarshalError::conversion("array element type has no storage size"));
        }

        let length = if info.is_zero_terminated() {
            zero_terminated_len(data as *const u8, item_size)
        } else if let Some(fixed) = info.array_fixed_size() {
            fixed
        } else {
            length_from_args(info, args, is_method)?
        };

        let array = NativeArray::sized_new(info.is_zero_terminated(), item_size, length);
        let base = data as *const u8;
        for i in 0..length {
            let item = RawArgument::read(base.add(i * item_size) as *const c_void, &item_info);
            (*array).push(item);
        }

        Ok(array)
    }
}

/// Count elements up to the first all-zero one
unsafe fn zero_terminated_len(base: *const u8, item_size: usize) -> usize {
    let mut length = 0;
    loop {
        let element = std::slice::from_raw_parts(base.add(length * item_size), item_size);
        if element.iter().all(|&b| b == 0) {
            return length;
        }
        length += 1;
    }
}

fn length_from_args(info: &TypeInfo, args: &[Argument], is_method: bool) -> Result<usize> {
    let position = info
        .array_length_arg()
        .ok_or_else(|| MarshalError::conversion("array has no length information"))?;
    let index = if is_method {
        position
            .checked_sub(1)
            .ok_or_else(|| MarshalError::conversion("length argument refers to the receiver"))?
    } else {
        position
    };

    let arg = args.get(index).ok_or_else(|| {
        MarshalError::conversion(format!("length argument {} is out of range", index))
    })?;

    let length: i128 = match *arg {
        Argument::Int8(v) => v.into(),
        Argument::UInt8(v) => v.into(),
        Argument::Int16(v) => v.into(),
        Argument::UInt16(v) => v.into(),
        Argument::Int32(v) => v.into(),
        Argument::UInt32(v) => v.into(),
        Argument::Int64(v) => v.into(),
        Argument::UInt64(v) => v.into(),
        Argument::Short(v) => v.into(),
        Argument::UShort(v) => v.into(),
        Argument::Int(v) => v.into(),
        Argument::UInt(v) => v.into(),
        Argument::Long(v) => v.into(),
        Argument::ULong(v) => v.into(),
        Argument::SSize(v) => v as i128,
        Argument::Size(v) => v as i128,
        other => {
            return Err(MarshalError::type_mismatch("integer length", other.variant_name()));
        }
    };

    usize::try_from(length)
        .map_err(|_| MarshalError::conversion(format!("invalid array length {}", length)))
}
