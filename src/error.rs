//! Marshalling errors
//!
//! Every failure carries a kind plus a breadcrumb of positional prefixes, so a
//! nested failure renders as a path from outermost to innermost:
//! `Item 2: Key 0: Must be number, not str`.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("Must be {expected}, not {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Must range from {lower} to {upper}")]
    Range { lower: String, upper: String },

    #[error("Must contain {expected} items, not {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("{0} is not supported yet")]
    Unsupported(String),

    #[error("failed to allocate {0}")]
    Allocation(&'static str),

    #[error("{0}")]
    Conversion(String),

    #[error("Function {0} has multiple callbacks, not supported")]
    MultipleCallbacks(String),

    #[error("Function {0} has multiple user_data arguments, not supported")]
    MultipleUserData(String),

    #[error("Function {0} has multiple GDestroyNotify, not supported")]
    MultipleDestroyNotify(String),

    #[error("Error invoking {function}: Invalid callback given for argument {argument}")]
    InvalidCallback { function: String, argument: String },

    #[error("couldn't find a wrapper for type '{0}'")]
    NoWrapper(String),

    #[error("{found} slot cannot hold a {tag} value")]
    SlotMismatch { tag: &'static str, found: &'static str },

    #[error("{name}: {message}")]
    HostException { name: String, message: String },

    #[error("trampoline {0} has already been freed")]
    TrampolineFreed(u64),

    #[error("{0}")]
    Config(String),
}

impl ErrorKind {
    /// Name of the host exception class this error surfaces as
    pub fn host_exception_name(&self) -> &str {
        match self {
            Self::Range { .. } => "ValueError",
            Self::Unsupported(_) => "NotImplementedError",
            Self::Allocation(_) => "MemoryError",
            Self::Conversion(_) | Self::SlotMismatch { .. } | Self::TrampolineFreed(_) => {
                "RuntimeError"
            }
            Self::NoWrapper(_) => "ImportError",
            Self::HostException { name, .. } => name,
            Self::Config(_) => "OSError",
            Self::TypeMismatch { .. }
            | Self::LengthMismatch { .. }
            | Self::MultipleCallbacks(_)
            | Self::MultipleUserData(_)
            | Self::MultipleDestroyNotify(_)
            | Self::InvalidCallback { .. } => "TypeError",
        }
    }
}

/// Error with positional context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalError {
    kind: ErrorKind,
    path: Vec<String>,
}

pub type Result<T> = std::result::Result<T, MarshalError>;

impl MarshalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, path: Vec::new() }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Breadcrumb prefixes, outermost first
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Prepend a positional prefix such as `"Item 3: "`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path.insert(0, prefix.into());
        self
    }

    pub fn at_item(self, index: usize) -> Self {
        self.with_prefix(format!("Item {}: ", index))
    }

    pub fn at_key(self, index: usize) -> Self {
        self.with_prefix(format!("Key {}: ", index))
    }

    pub fn at_value(self, index: usize) -> Self {
        self.with_prefix(format!("Value {}: ", index))
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        })
    }

    pub fn range(lower: impl fmt::Display, upper: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Range {
            lower: lower.to_string(),
            upper: upper.to_string(),
        })
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported(what.into()))
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion(message.into()))
    }

    pub fn host_exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HostException {
            name: name.into(),
            message: message.into(),
        })
    }
}

impl From<ErrorKind> for MarshalError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for prefix in &self.path {
            f.write_str(prefix)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for MarshalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumb_renders_outermost_first() {
        let err = MarshalError::type_mismatch("number", "str").at_key(0).at_item(2);
        assert_eq!(err.to_string(), "Item 2: Key 0: Must be number, not str");
        assert_eq!(err.path().len(), 2);
    }

    #[test]
    fn test_exception_names() {
        assert_eq!(MarshalError::range(-128, 127).kind().host_exception_name(), "ValueError");
        assert_eq!(
            MarshalError::unsupported("union marshalling").kind().host_exception_name(),
            "NotImplementedError"
        );
        assert_eq!(
            MarshalError::host_exception("ZeroDivisionError", "division by zero")
                .kind()
                .host_exception_name(),
            "ZeroDivisionError"
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            MarshalError::range(0, 255).to_string(),
            "Must range from 0 to 255"
        );
        assert_eq!(
            MarshalError::new(ErrorKind::LengthMismatch { expected: 3, found: 2 }).to_string(),
            "Must contain 3 items, not 2"
        );
        assert_eq!(
            MarshalError::unsupported("union marshalling").to_string(),
            "union marshalling is not supported yet"
        );
    }
}
