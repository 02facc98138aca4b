use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use typthon_marshal::{
    scan_for_callback_slots, ArgInfo, Argument, CallableInfo, ErrorKind, ExecutionContext, HostCallable,
    HostValue, InterfaceInfo, MarshalConfig, Marshaller, ObjectModel, Repository, ScopeType, Transfer,
    TrampolineManager, TypeInfo, TypeSystem, TypeTag,
};

fn setup() -> (TrampolineManager, Arc<Repository>) {
    let types = Arc::new(TypeSystem::new());
    let model = Arc::new(ObjectModel::new(types.clone()));
    let marshaller = Arc::new(Marshaller::new(types, model, MarshalConfig::default()));
    let repository = Arc::new(Repository::new());
    let manager = TrampolineManager::new(marshaller, repository.clone(), ExecutionContext::new());
    (manager, repository)
}

/// `void (*Visit)(const char *name, void *data)`
fn visit_signature() -> CallableInfo {
    CallableInfo::builder("Test", "Visit")
        .arg(ArgInfo::new("name", TypeInfo::new(TypeTag::Utf8)))
        .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
        .build()
}

fn destroy_type(repository: &Repository) -> TypeInfo {
    TypeInfo::interface(InterfaceInfo::callback(repository.destroy_notify().unwrap()))
}

/// `void foreach(Visit func, void *data, DestroyNotify notify)`
fn foreach(signature: &CallableInfo, scope: ScopeType, repository: &Repository) -> CallableInfo {
    CallableInfo::builder("Test", "foreach")
        .arg(
            ArgInfo::new("func", TypeInfo::interface(InterfaceInfo::callback(signature.clone())))
                .with_scope(scope)
                .with_closure(1)
                .with_destroy(2),
        )
        .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
        .arg(ArgInfo::new("notify", destroy_type(repository)))
        .build()
}

fn visit_args(name: &str) -> [Argument; 2] {
    let name = std::ffi::CString::new(name).unwrap().into_raw();
    [Argument::String(name), Argument::Pointer(std::ptr::null_mut())]
}

fn free_visit_args(args: [Argument; 2]) {
    if let Argument::String(p) = args[0] {
        drop(unsafe { std::ffi::CString::from_raw(p) });
    }
}

/// Counts drops of the captured state, i.e. releases of the host callable
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn recording_callable(calls: Arc<AtomicUsize>, drops: Arc<AtomicUsize>) -> HostCallable {
    let sentinel = DropCounter(drops);
    HostCallable::new("visit", move |args: &[HostValue]| {
        let _alive = &sentinel;
        assert_eq!(args[0], HostValue::str("entry"));
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(HostValue::None)
    })
}

#[test]
fn test_call_scope_freed_after_invocation() {
    let (manager, repository) = setup();
    let signature = visit_signature();
    let function = foreach(&signature, ScopeType::Call, &repository);
    let slots = scan_for_callback_slots(&function).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let callable = recording_callable(calls.clone(), drops.clone());
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(callable)])
        .unwrap();

    let args = visit_args("entry");
    unsafe { manager.invoke(handle.id(), &args) }.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!manager.is_live(handle.id()));

    let err = unsafe { manager.invoke(handle.id(), &args) }.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TrampolineFreed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    free_visit_args(args);
}

#[test]
fn test_async_freed_exactly_once_on_drain() {
    let (manager, repository) = setup();
    let signature = visit_signature();
    let function = foreach(&signature, ScopeType::Async, &repository);
    let slots = scan_for_callback_slots(&function).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let callable = recording_callable(calls.clone(), drops.clone());
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(callable)])
        .unwrap();

    let args = visit_args("entry");
    unsafe { manager.invoke(handle.id(), &args) }.unwrap();
    free_visit_args(args);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert_eq!(manager.pending_count(), 1);

    // Creating the next trampoline drains the queue first
    let other = HostCallable::new("other", |_: &[HostValue]| Ok(HostValue::None));
    manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(other)])
        .unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!manager.is_live(handle.id()));

    assert_eq!(manager.drain_pending(), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_notified_scope_waits_for_destroy_notify() {
    let (manager, repository) = setup();
    let signature = visit_signature();
    let function = foreach(&signature, ScopeType::Notified, &repository);
    let slots = scan_for_callback_slots(&function).unwrap();
    assert_eq!(slots.destroy_notify, Some(2));

    let calls = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let callable = recording_callable(calls.clone(), drops.clone());
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(callable), HostValue::None])
        .unwrap();

    for _ in 0..3 {
        let args = visit_args("entry");
        unsafe { manager.invoke(handle.id(), &args) }.unwrap();
        free_visit_args(args);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(manager.is_live(handle.id()));

    let notifier = manager.destroy_notifier().unwrap();
    assert_eq!(notifier.signature().full_name(), "GLib.DestroyNotify");
    assert!(manager.notify(handle.user_data_token()));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_count(), 0);
}

#[test]
fn test_two_callbacks_rejected_before_creation() {
    let (manager, _) = setup();
    let signature = visit_signature();
    let callback = TypeInfo::interface(InterfaceInfo::callback(signature));
    let function = CallableInfo::builder("Test", "pair")
        .arg(ArgInfo::new("first", callback.clone()))
        .arg(ArgInfo::new("second", callback))
        .build();

    let err = scan_for_callback_slots(&function).unwrap_err();
    assert_eq!(err.to_string(), "Function Test.pair has multiple callbacks, not supported");
    assert_eq!(manager.live_count(), 0);
}

#[test]
fn test_invalid_callback_message() {
    let (manager, repository) = setup();
    let function = foreach(&visit_signature(), ScopeType::Call, &repository);
    let slots = scan_for_callback_slots(&function).unwrap();

    let err = manager
        .create_trampoline(&function, &slots, &[HostValue::str("not callable")])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error invoking Test.foreach: Invalid callback given for argument func"
    );
    assert_eq!(manager.live_count(), 0);
}

#[test]
fn test_descriptor_handles_released() {
    let (manager, repository) = setup();
    let signature = visit_signature();
    let function = foreach(&signature, ScopeType::Call, &repository);
    let baseline = signature.handle_count();

    let slots = scan_for_callback_slots(&function).unwrap();
    let callable = HostCallable::new("noop", |_: &[HostValue]| Ok(HostValue::None));
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(callable)])
        .unwrap();
    assert!(signature.handle_count() > baseline);

    let args = visit_args("entry");
    unsafe { manager.invoke(handle.id(), &args) }.unwrap();
    free_visit_args(args);
    assert_eq!(signature.handle_count(), baseline);
}

#[test]
fn test_method_receiver_skipped() {
    let (manager, _) = setup();
    let signature = visit_signature();
    let function = CallableInfo::builder("Test", "each")
        .arg(
            ArgInfo::new("func", TypeInfo::interface(InterfaceInfo::callback(signature)))
                .with_closure(2),
        )
        .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
        .method()
        .build();
    let slots = scan_for_callback_slots(&function).unwrap();
    assert_eq!(slots.user_data, Some(1));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = seen.clone();
    let callable = HostCallable::new("visit", move |args: &[HostValue]| {
        record.lock().extend_from_slice(args);
        Ok(HostValue::None)
    });
    let receiver = HostValue::str("self");
    let handle = manager
        .create_trampoline(
            &function,
            &slots,
            &[receiver, HostValue::Callable(callable), HostValue::Int(7)],
        )
        .unwrap();

    let args = visit_args("entry");
    unsafe { manager.invoke(handle.id(), &args) }.unwrap();
    free_visit_args(args);
    assert_eq!(*seen.lock(), vec![HostValue::str("entry"), HostValue::Int(7)]);
}

#[test]
fn test_failing_callback_zeroes_result() {
    let (manager, repository) = setup();
    let signature = CallableInfo::builder("Test", "Compare")
        .arg(ArgInfo::new("name", TypeInfo::new(TypeTag::Utf8)))
        .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
        .returns(TypeInfo::new(TypeTag::Int32), Transfer::Nothing)
        .build();
    let function = foreach(&signature, ScopeType::Notified, &repository);
    let slots = scan_for_callback_slots(&function).unwrap();

    let callable = HostCallable::new("raise", |_: &[HostValue]| {
        Err(typthon_marshal::MarshalError::new(ErrorKind::HostException {
            name: "KeyError".into(),
            message: "missing".into(),
        }))
    });
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(callable)])
        .unwrap();

    let args = visit_args("entry");
    let result = unsafe { manager.invoke(handle.id(), &args) }.unwrap();
    free_visit_args(args);
    assert_eq!(result, Argument::Int32(0));

    let err = manager.take_callback_error().unwrap();
    assert_eq!(err.to_string(), "KeyError: missing");
    assert_eq!(err.kind().host_exception_name(), "KeyError");
}
