//! Callback trampolines - host callables exposed as native function pointers
//!
//! Design: a function signature is scanned for its callback, user-data and
//! destroy-notify arguments; the host callable supplied for the callback
//! is bound into a `Trampoline` owned by the `TrampolineManager`. Its
//! scope decides when it is released:
//! - `call` - freed right after its first invocation
//! - `notified` - freed when the shared destroy notifier fires
//! - `async` - queued after its invocation, freed on the next drain
//!
//! Architecture:
//! - `scan.rs` - callback slot discovery
//! - `manager.rs` - creation, invocation, disposal
//! - `native.rs` - libffi closures behind the native code pointers
//!   (`native` feature)

mod manager;
mod scan;

#[cfg(feature = "native")]
mod native;

pub use manager::{DestroyNotifier, Trampoline, TrampolineHandle, TrampolineManager};
pub use scan::{scan_for_callback_slots, CallbackSlots};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarshalConfig;
    use crate::error::ErrorKind;
    use crate::host::{ExecutionContext, HostCallable, HostValue, ObjectModel};
    use crate::introspection::{ArgInfo, CallableInfo, InterfaceInfo, Repository, ScopeType, Transfer, TypeInfo, TypeTag};
    use crate::marshal::Marshaller;
    use crate::native::Argument;
    use crate::types::TypeSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager_with(config: MarshalConfig) -> TrampolineManager {
        let types = Arc::new(TypeSystem::new());
        let model = Arc::new(ObjectModel::new(types.clone()));
        let marshaller = Arc::new(Marshaller::new(types, model, config));
        TrampolineManager::new(marshaller, Arc::new(Repository::new()), ExecutionContext::new())
    }

    fn manager() -> TrampolineManager {
        manager_with(MarshalConfig::default())
    }

    fn unary(scope: ScopeType) -> CallableInfo {
        let signature = CallableInfo::builder("Test", "Unary")
            .arg(ArgInfo::new("value", TypeInfo::new(TypeTag::Int32)))
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
            .returns(TypeInfo::new(TypeTag::Int32), Transfer::Nothing)
            .build();
        CallableInfo::builder("Test", "run")
            .arg(
                ArgInfo::new("func", TypeInfo::interface(InterfaceInfo::callback(signature)))
                    .with_scope(scope)
                    .with_closure(1),
            )
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
            .build()
    }

    fn create(manager: &TrampolineManager, scope: ScopeType, callable: HostCallable, data: HostValue) -> TrampolineHandle {
        let function = unary(scope);
        let slots = scan_for_callback_slots(&function).unwrap();
        manager
            .create_trampoline(&function, &slots, &[HostValue::Callable(callable), data])
            .unwrap()
    }

    #[test]
    fn test_user_data_passed_through() {
        let manager = manager();
        let callable = HostCallable::new("add", |args: &[HostValue]| {
            assert_eq!(args.len(), 2);
            Ok(HostValue::Int(args[0].to_f64()? as i64 + 1))
        });
        let handle = create(&manager, ScopeType::Notified, callable, HostValue::str("tag"));

        let result = unsafe {
            manager.invoke(handle.id(), &[Argument::Int32(41), Argument::Pointer(handle.user_data_token())])
        };
        assert_eq!(result.unwrap(), Argument::Int32(42));
    }

    #[test]
    fn test_none_user_data_omitted() {
        let manager = manager();
        let callable = HostCallable::new("count", |args: &[HostValue]| Ok(HostValue::Int(args.len() as i64)));
        let handle = create(&manager, ScopeType::Notified, callable, HostValue::None);

        let result = unsafe { manager.invoke(handle.id(), &[Argument::Int32(0), Argument::Pointer(std::ptr::null_mut())]) };
        assert_eq!(result.unwrap(), Argument::Int32(1));
    }

    #[test]
    fn test_call_scope_freed_after_invocation() {
        let manager = manager();
        let callable = HostCallable::new("id", |args: &[HostValue]| Ok(args[0].clone()));
        let handle = create(&manager, ScopeType::Call, callable, HostValue::None);

        unsafe { manager.invoke(handle.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) }.unwrap();
        assert!(!manager.is_live(handle.id()));

        let err = unsafe { manager.invoke(handle.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) }
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TrampolineFreed(handle.id()));
    }

    #[test]
    fn test_async_queued_then_drained() {
        let manager = manager();
        let callable = HostCallable::new("id", |args: &[HostValue]| Ok(args[0].clone()));
        let handle = create(&manager, ScopeType::Async, callable, HostValue::None);

        unsafe { manager.invoke(handle.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) }.unwrap();
        assert!(manager.is_live(handle.id()));
        assert_eq!(manager.pending_count(), 1);

        assert_eq!(manager.drain_pending(), 1);
        assert!(!manager.is_live(handle.id()));
        assert_eq!(manager.drain_pending(), 0);
    }

    #[test]
    fn test_drain_skips_running_trampoline() {
        let manager = manager();
        let inner = manager.clone();
        let drained = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = drained.clone();
        let callable = HostCallable::new("reenter", move |args: &[HostValue]| {
            seen.store(inner.drain_pending(), Ordering::SeqCst);
            Ok(args[0].clone())
        });
        let first = create(&manager, ScopeType::Async, callable, HostValue::None);

        // Queue the trampoline, then invoke it again while it sits in the queue
        unsafe { manager.invoke(first.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) }.unwrap();
        unsafe { manager.invoke(first.id(), &[Argument::Int32(2), Argument::Pointer(std::ptr::null_mut())]) }.unwrap();

        assert_eq!(drained.load(Ordering::SeqCst), 0);
        assert!(manager.is_live(first.id()));
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(manager.drain_pending(), 1);
    }

    #[test]
    fn test_failure_zeroes_result_and_stashes_error() {
        let manager = manager();
        let callable = HostCallable::new("boom", |_: &[HostValue]| Ok(HostValue::str("not a number")));
        let handle = create(&manager, ScopeType::Notified, callable, HostValue::None);

        let result = unsafe { manager.invoke(handle.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) };
        assert_eq!(result.unwrap(), Argument::Int32(0));
        let err = manager.take_callback_error().unwrap();
        assert!(matches!(err.kind(), ErrorKind::TypeMismatch { .. }));
        assert!(manager.take_callback_error().is_none());
    }

    #[test]
    fn test_failure_propagates_when_zeroing_disabled() {
        let mut config = MarshalConfig::default();
        config.callbacks.zero_result_on_error = false;
        let manager = manager_with(config);
        let callable = HostCallable::new("boom", |_: &[HostValue]| Ok(HostValue::str("x")));
        let handle = create(&manager, ScopeType::Notified, callable, HostValue::None);

        let result = unsafe { manager.invoke(handle.id(), &[Argument::Int32(1), Argument::Pointer(std::ptr::null_mut())]) };
        assert!(result.is_err());
    }

    #[test]
    fn test_non_callable_rejected() {
        let manager = manager();
        let function = unary(ScopeType::Call);
        let slots = scan_for_callback_slots(&function).unwrap();
        let err = manager
            .create_trampoline(&function, &slots, &[HostValue::Int(3), HostValue::None])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error invoking Test.run: Invalid callback given for argument func"
        );
        assert_eq!(manager.live_count(), 0);
    }

    #[test]
    fn test_notify_frees_by_token() {
        let manager = manager();
        let callable = HostCallable::new("id", |args: &[HostValue]| Ok(args[0].clone()));
        let handle = create(&manager, ScopeType::Notified, callable, HostValue::None);

        assert!(manager.destroy_notifier().is_ok());
        assert!(manager.notify(handle.user_data_token()));
        assert!(!manager.is_live(handle.id()));
        assert!(!manager.notify(handle.user_data_token()));
    }
}
