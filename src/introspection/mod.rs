//! Introspection - descriptors of slots, interfaces and callables
//!
//! Design: descriptors are shared `Arc` handles; acquiring a nested
//! descriptor (`param_type`, `interface_info`, `arg`) clones a handle and
//! the handle releases itself when dropped.
//!
//! Architecture:
//! - `tag.rs` - type tags and interface refinements
//! - `type_info.rs` - `TypeInfo` and `InterfaceInfo`
//! - `callable.rs` - `CallableInfo`, `ArgInfo`, transfer/direction/scope
//! - `repository.rs` - lookup by namespace and name

mod callable;
mod repository;
mod tag;
mod type_info;

pub use callable::{ArgInfo, CallableBuilder, CallableInfo, Direction, ScopeType, Transfer};
pub use repository::{is_destroy_notify, Repository, DESTROY_NOTIFY_NAME, DESTROY_NOTIFY_NAMESPACE};
pub use tag::{InfoType, TypeTag};
pub use type_info::{ArrayLayout, InterfaceInfo, TypeInfo};
