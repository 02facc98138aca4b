//! NUL-terminated native strings and filesystem-encoding transcoding

use super::tally::{record_alloc, record_free, HeapKind};
use crate::config::FilenameEncoding;
use crate::error::{MarshalError, Result};
use std::ffi::{c_char, CStr, CString};

/// Duplicate `bytes` into a new native string
pub fn bytes_new(bytes: &[u8]) -> Result<*mut c_char> {
    let owned = CString::new(bytes)
        .map_err(|_| MarshalError::conversion("embedded null byte in string"))?;
    record_alloc(HeapKind::String);
    Ok(owned.into_raw())
}

/// Duplicate a UTF-8 string
#[inline]
pub fn string_new(s: &str) -> Result<*mut c_char> {
    bytes_new(s.as_bytes())
}

/// Free a string allocated by this module
///
/// # Safety
/// `ptr` must be null or come from `bytes_new` and not be freed yet.
pub unsafe fn string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(CString::from_raw(ptr));
    record_free(HeapKind::String);
}

/// Borrow the bytes of a native string (without the terminator)
///
/// # Safety
/// `ptr` must be a valid NUL-terminated string that outlives `'a`.
pub unsafe fn string_bytes<'a>(ptr: *const c_char) -> &'a [u8] {
    CStr::from_ptr(ptr).to_bytes()
}

/// Transcode UTF-8 into the filesystem encoding
pub fn filename_from_utf8(s: &str, encoding: FilenameEncoding) -> Result<*mut c_char> {
    match encoding {
        FilenameEncoding::Utf8 => string_new(s),
        FilenameEncoding::Latin1 => {
            let bytes = s
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| {
                    MarshalError::conversion(
                        "Invalid byte sequence in conversion input",
                    )
                })?;
            bytes_new(&bytes)
        }
    }
}

/// Transcode a filesystem-encoded string into UTF-8
///
/// # Safety
/// `ptr` must be a valid NUL-terminated string.
pub unsafe fn filename_to_utf8(ptr: *const c_char, encoding: FilenameEncoding) -> Result<String> {
    let bytes = string_bytes(ptr);
    match encoding {
        FilenameEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| MarshalError::conversion("Invalid byte sequence in conversion input")),
        FilenameEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
