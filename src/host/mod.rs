//! Host side of a crossing - dynamic values, wrapper classes, the object
//! model the converters call into, and the execution lock.

pub mod class;
pub mod exec;
pub mod model;
pub mod value;

pub use class::{ClassKind, HostClass, HostInstance, InstancePayload, StructFreeFn};
pub use exec::{ExecutionContext, ExecutionGuard};
pub use model::{HostObjectModel, ObjectModel, WrapperConstructor, WrapperRegistry};
pub use value::{EnumValue, HostCallable, HostDateTime, HostDict, HostValue};
