//! Host values - the dynamic side of a crossing

use super::class::{HostClass, HostInstance};
use crate::error::{MarshalError, Result};
use crate::types::DynamicType;
use chrono::{FixedOffset, NaiveDateTime};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use std::fmt;
use std::sync::Arc;

type CallableFn = dyn Fn(&[HostValue]) -> Result<HostValue> + Send + Sync;

/// A host function object
#[derive(Clone)]
pub struct HostCallable {
    name: Arc<str>,
    func: Arc<CallableFn>,
}

impl HostCallable {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        (self.func)(args)
    }

    pub fn ptr_eq(&self, other: &HostCallable) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// Insertion-ordered mapping with host equality on keys
#[derive(Debug, Clone, Default)]
pub struct HostDict {
    entries: Vec<(HostValue, HostValue)>,
}

impl HostDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing the value of an equal key
    pub fn insert(&mut self, key: HostValue, value: HostValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &HostValue) -> Option<&HostValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostValue, &HostValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(HostValue, HostValue)> for HostDict {
    fn from_iter<I: IntoIterator<Item = (HostValue, HostValue)>>(iter: I) -> Self {
        let mut dict = HostDict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

/// Equal when both hold the same pairs, in any order
impl PartialEq for HostDict {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

/// Calendar date-time with an optional timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDateTime {
    pub naive: NaiveDateTime,
    pub tzinfo: Option<FixedOffset>,
}

impl HostDateTime {
    pub fn naive(naive: NaiveDateTime) -> Self {
        Self { naive, tzinfo: None }
    }
}

/// Instance of an enum or flags wrapper class
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub class: Arc<HostClass>,
    pub value: i64,
}

#[derive(Clone)]
pub enum HostValue {
    None,
    Bool(bool),
    Int(i64),
    /// Unbounded integer
    Long(BigInt),
    Float(f64),
    Str(String),
    Tuple(Vec<HostValue>),
    List(Vec<HostValue>),
    Dict(HostDict),
    DateTime(HostDateTime),
    GType(DynamicType),
    Enum(EnumValue),
    Callable(HostCallable),
    Instance(Arc<HostInstance>),
    Class(Arc<HostClass>),
}

enum Numeric {
    Int(BigInt),
    Float(f64),
}

impl HostValue {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Name of the value's host type, as shown in error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::None => "NoneType".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Long(_) => "long".into(),
            Self::Float(_) => "float".into(),
            Self::Str(_) => "str".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::List(_) => "list".into(),
            Self::Dict(_) => "dict".into(),
            Self::DateTime(_) => "datetime".into(),
            Self::GType(_) => "GType".into(),
            Self::Enum(e) => e.class.name().into(),
            Self::Callable(_) => "function".into(),
            Self::Instance(i) => i.class().name().into(),
            Self::Class(_) => "type".into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::Long(_) | Self::Float(_) | Self::Enum(_)
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_) | Self::Class(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(v) => *v != 0,
            Self::Long(v) => !v.is_zero(),
            Self::Float(v) => *v != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(v) | Self::List(v) => !v.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            Self::Enum(e) => e.value != 0,
            _ => true,
        }
    }

    pub fn as_sequence(&self) -> Option<&[HostValue]> {
        match self {
            Self::Tuple(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&HostDict> {
        match self {
            Self::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Class this value is an instance of, for isinstance checks
    pub fn instance_class(&self) -> Option<Arc<HostClass>> {
        match self {
            Self::Instance(instance) => Some(instance.class().clone()),
            Self::Enum(e) => Some(e.class.clone()),
            _ => None,
        }
    }

    /// `int(value)`
    pub fn to_bigint(&self) -> Result<BigInt> {
        match self {
            Self::Bool(b) => Ok(BigInt::from(*b as i64)),
            Self::Int(v) => Ok(BigInt::from(*v)),
            Self::Long(v) => Ok(v.clone()),
            Self::Enum(e) => Ok(BigInt::from(e.value)),
            Self::Float(f) => {
                if f.is_finite() {
                    BigInt::from_f64(f.trunc())
                        .ok_or_else(|| MarshalError::conversion("float too large to convert"))
                } else {
                    Err(MarshalError::conversion(format!(
                        "cannot convert float {} to integer",
                        f
                    )))
                }
            }
            Self::Str(s) => s.trim().parse::<BigInt>().map_err(|_| {
                MarshalError::conversion(format!(
                    "invalid literal for int() with base 10: '{}'",
                    s
                ))
            }),
            other => Err(MarshalError::conversion(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        }
    }

    /// `float(value)`
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Self::Float(f) => Ok(*f),
            Self::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                MarshalError::conversion(format!("could not convert string to float: '{}'", s))
            }),
            other if other.is_number() => other
                .to_bigint()?
                .to_f64()
                .ok_or_else(|| MarshalError::conversion("long int too large to convert to float")),
            other => Err(MarshalError::conversion(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        }
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            Self::Float(f) => Some(Numeric::Float(*f)),
            Self::Bool(_) | Self::Int(_) | Self::Long(_) | Self::Enum(_) => {
                self.to_bigint().ok().map(Numeric::Int)
            }
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return match (a, b) {
                (Numeric::Int(a), Numeric::Int(b)) => a == b,
                (Numeric::Float(a), Numeric::Float(b)) => a == b,
                (Numeric::Int(i), Numeric::Float(f)) | (Numeric::Float(f), Numeric::Int(i)) => {
                    i.to_f64() == Some(f)
                }
            };
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) | (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::GType(a), Self::GType(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Instance(a), Self::Instance(b)) => {
                Arc::ptr_eq(a, b) || (!a.pointer().is_null() && a.pointer() == b.pointer())
            }
            (Self::Class(a), Self::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}L", v),
            Self::Float(v) => write!(f, "{:?}", v),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Tuple(items) => f.debug_tuple("").field(items).finish(),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Dict(dict) => f.debug_map().entries(dict.iter()).finish(),
            Self::DateTime(dt) => write!(f, "datetime({})", dt.naive),
            Self::GType(t) => write!(f, "<GType {}>", t.raw()),
            Self::Enum(e) => write!(f, "<{} {}>", e.class.name(), e.value),
            Self::Callable(c) => write!(f, "{:?}", c),
            Self::Instance(i) => write!(f, "<{} at {:?}>", i.class().name(), i.pointer()),
            Self::Class(c) => write!(f, "<class '{}'>", c.name()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<BigInt> for HostValue {
    fn from(v: BigInt) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cross_equality() {
        assert_eq!(HostValue::Int(5), HostValue::Long(BigInt::from(5)));
        assert_eq!(HostValue::Bool(true), HostValue::Int(1));
        assert_eq!(HostValue::Float(2.0), HostValue::Int(2));
        assert_ne!(HostValue::Int(2), HostValue::str("2"));
    }

    #[test]
    fn test_dict_order_independent() {
        let a: HostDict = [(HostValue::from("x"), HostValue::Int(1)), (HostValue::from("y"), HostValue::Int(2))]
            .into_iter()
            .collect();
        let b: HostDict = [(HostValue::from("y"), HostValue::Int(2)), (HostValue::from("x"), HostValue::Int(1))]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_int_coercion() {
        assert_eq!(HostValue::Float(-3.9).to_bigint().unwrap(), BigInt::from(-3));
        assert_eq!(HostValue::str(" 42 ").to_bigint().unwrap(), BigInt::from(42));
        assert!(HostValue::Float(f64::NAN).to_bigint().is_err());
        assert!(HostValue::None.to_bigint().is_err());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(HostValue::str("hello").type_name(), "str");
        assert_eq!(HostValue::None.type_name(), "NoneType");
        assert_eq!(HostValue::List(vec![]).type_name(), "list");
    }

    #[test]
    fn test_truthiness() {
        assert!(!HostValue::Int(0).is_truthy());
        assert!(HostValue::str("x").is_truthy());
        assert!(!HostValue::List(vec![]).is_truthy());
    }
}
