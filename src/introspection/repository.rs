//! Lookup of interface descriptors by namespace and name

use super::callable::{ArgInfo, CallableInfo};
use super::tag::InfoType;
use super::type_info::{InterfaceInfo, TypeInfo};
use parking_lot::RwLock;
use std::collections::HashMap;

pub const DESTROY_NOTIFY_NAMESPACE: &str = "GLib";
pub const DESTROY_NOTIFY_NAME: &str = "DestroyNotify";

/// Registered interface descriptors
pub struct Repository {
    entries: RwLock<HashMap<(String, String), InterfaceInfo>>,
}

impl Repository {
    /// Repository pre-populated with `GLib.DestroyNotify`
    pub fn new() -> Self {
        let repository = Self {
            entries: RwLock::new(HashMap::new()),
        };
        let signature = CallableInfo::builder(DESTROY_NOTIFY_NAMESPACE, DESTROY_NOTIFY_NAME)
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
            .build();
        repository.register(InterfaceInfo::callback(signature));
        repository
    }

    /// Register (or replace) an interface descriptor
    pub fn register(&self, info: InterfaceInfo) {
        let key = (info.namespace().to_string(), info.name().to_string());
        self.entries.write().insert(key, info);
    }

    pub fn find_by_name(&self, namespace: &str, name: &str) -> Option<InterfaceInfo> {
        self.entries
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Signature of the destroy notifier callback
    pub fn destroy_notify(&self) -> Option<CallableInfo> {
        self.find_by_name(DESTROY_NOTIFY_NAMESPACE, DESTROY_NOTIFY_NAME)
            .and_then(|info| info.as_callable())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a callback interface is the destroy notifier type
pub fn is_destroy_notify(info: &InterfaceInfo) -> bool {
    info.info_type() == InfoType::Callback
        && info.namespace() == DESTROY_NOTIFY_NAMESPACE
        && info.name() == DESTROY_NOTIFY_NAME
}
