//! Marshaller - converts values across the host/native boundary
//!
//! Design: a single `Marshaller` owns the collaborators every conversion
//! needs (dynamic type system, host object model, configuration, opaque
//! handle table) and exposes the four entry points:
//! - `check_value` - is a host value acceptable for a descriptor
//! - `to_native` - host value into a native slot
//! - `to_host` - native slot into a host value
//! - `release` - free what the transfer contract leaves to the caller
//!
//! All four are driven by the descriptor tag and match exhaustively.
//! Descriptors are borrowed; nested handles acquired during a conversion
//! drop on every exit path.
//!
//! Architecture:
//! - `validate.rs` - value validation with breadcrumb errors
//! - `to_native.rs` - host → native conversion with partial-failure unwinding
//! - `to_host.rs` - native → host conversion
//! - `release.rs` - the ownership releaser
//! - `carray.rs` - wrapping raw C arrays
//! - `bounds.rs` - numeric ranges per tag
//! - `opaque.rs` - keys for host values crossing `void*` slots

mod bounds;
mod carray;
mod opaque;
mod release;
mod to_host;
mod to_native;
mod validate;


pub use bounds::{bounds, Bounds};
pub use opaque::OpaqueTable;

use crate::config::MarshalConfig;
use crate::host::{HostObjectModel, ObjectModel};
use crate::introspection::{Transfer, TypeTag};
use crate::logging;
use crate::types::TypeSystem;
use std::sync::Arc;

/// Conversion engine bound to one type system and host object model
pub struct Marshaller {
    types: Arc<TypeSystem>,
    model: Arc<dyn HostObjectModel>,
    config: MarshalConfig,
    opaque: OpaqueTable,
}

impl Marshaller {
    pub fn new(types: Arc<TypeSystem>, model: Arc<dyn HostObjectModel>, config: MarshalConfig) -> Self {
        Self {
            types,
            model,
            config,
            opaque: OpaqueTable::new(),
        }
    }

    /// Marshaller over the registry-backed object model
    pub fn with_defaults(types: Arc<TypeSystem>) -> Self {
        let model = Arc::new(ObjectModel::new(types.clone()));
        Self::new(types, model, MarshalConfig::from_env())
    }

    pub fn types(&self) -> &Arc<TypeSystem> {
        &self.types
    }

    pub fn model(&self) -> &Arc<dyn HostObjectModel> {
        &self.model
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Host values currently parked behind `void*` keys
    pub fn opaque(&self) -> &OpaqueTable {
        &self.opaque
    }

    /// Warn about a transfer mode that is accepted but probably wrong
    fn check_transfer(&self, ok: bool, tag: TypeTag, transfer: Transfer, detail: &str) {
        if !ok && self.config.transfer.warn_on_suspicious {
            logging::log_transfer_warning(tag.name(), transfer.as_str(), detail);
        }
    }

    /// Display name of a dynamic type for error messages
    fn type_name(&self, g_type: crate::types::DynamicType) -> String {
        self.types
            .name(g_type)
            .unwrap_or_else(|| format!("<type {}>", g_type.raw()))
    }
}

impl std::fmt::Debug for Marshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marshaller")
            .field("config", &self.config)
            .field("opaque_handles", &self.opaque.len())
            .finish()
    }
}
