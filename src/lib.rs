//! typthon-marshal - type-descriptor-driven marshalling between host values
//! and a C-like ABI
//!
//! A `Marshaller` converts in both directions under an explicit ownership
//! transfer contract, validates host values against descriptors, and
//! releases whatever the contract leaves behind. A `TrampolineManager`
//! exposes host callables as native callbacks with scope-driven lifetimes.

// Core modules
pub mod config;
pub mod error;
pub mod host;
pub mod introspection;
pub mod logging;
pub mod marshal;
pub mod native;
pub mod trampoline;
pub mod types;

// Re-export commonly used items
pub use config::MarshalConfig;
pub use error::{ErrorKind, MarshalError, Result};
pub use host::{ExecutionContext, HostCallable, HostObjectModel, HostValue, ObjectModel};
pub use introspection::{
    ArgInfo, CallableInfo, Direction, InfoType, InterfaceInfo, Repository, ScopeType, Transfer,
    TypeInfo, TypeTag,
};
pub use marshal::Marshaller;
pub use native::{Argument, RawArgument};
pub use trampoline::{scan_for_callback_slots, CallbackSlots, TrampolineHandle, TrampolineManager};
pub use types::{DynamicType, TypeSystem};
