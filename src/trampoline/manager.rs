//! Trampoline lifecycle - creation, invocation and scope-driven disposal
//!
//! Trampolines are keyed by id. An invocation clones the trampoline out of
//! the live table before calling into the host, so a reentrant call that
//! creates or frees trampolines never contends with it. Ids with a call in
//! progress are skipped by the pending-free drain and picked up by a later
//! one.

use crate::error::{ErrorKind, MarshalError, Result};
use crate::host::{ExecutionContext, HostCallable, HostValue};
use crate::introspection::{CallableInfo, Direction, Repository, ScopeType, TypeTag};
use crate::logging;
use crate::marshal::Marshaller;
use crate::native::Argument;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::scan::CallbackSlots;

#[cfg(feature = "native")]
use super::native::NativeEntry;

/// A host callable bound to a callback signature
pub struct Trampoline {
    id: u64,
    callback: CallableInfo,
    function: HostCallable,
    user_data: Option<HostValue>,
    scope: ScopeType,
}

impl Trampoline {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn callback(&self) -> &CallableInfo {
        &self.callback
    }

    pub fn function(&self) -> &HostCallable {
        &self.function
    }

    pub fn user_data(&self) -> Option<&HostValue> {
        self.user_data.as_ref()
    }

    pub fn scope(&self) -> ScopeType {
        self.scope
    }
}

impl std::fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trampoline")
            .field("id", &self.id)
            .field("callback", &self.callback.full_name())
            .field("function", &self.function)
            .field("scope", &self.scope)
            .finish()
    }
}

/// What the call dispatcher hands to native code for a callback argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrampolineHandle {
    id: u64,
    scope: ScopeType,
    code: *const c_void,
}

impl TrampolineHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> ScopeType {
        self.scope
    }

    /// Native entry point; null unless built with the `native` feature
    pub fn code_ptr(&self) -> *const c_void {
        self.code
    }

    /// Value for the native user-data slot; the destroy notifier receives
    /// it back and frees this trampoline
    pub fn user_data_token(&self) -> *mut c_void {
        self.id as usize as *mut c_void
    }
}

/// Process-wide destroy notifier, created on first use
pub struct DestroyNotifier {
    signature: CallableInfo,
    #[cfg(feature = "native")]
    entry: NativeEntry,
}

impl DestroyNotifier {
    fn new(shared: &Arc<Shared>, signature: CallableInfo) -> Result<Self> {
        #[cfg(feature = "native")]
        let entry = NativeEntry::destroy_notify(Arc::downgrade(shared), &signature)?;
        #[cfg(not(feature = "native"))]
        let _ = shared;

        Ok(Self {
            signature,
            #[cfg(feature = "native")]
            entry,
        })
    }

    pub fn signature(&self) -> &CallableInfo {
        &self.signature
    }

    /// Native entry point; null unless built with the `native` feature
    pub fn code_ptr(&self) -> *const c_void {
        #[cfg(feature = "native")]
        {
            self.entry.code_ptr()
        }
        #[cfg(not(feature = "native"))]
        {
            std::ptr::null()
        }
    }
}

pub(super) struct Shared {
    marshaller: Arc<Marshaller>,
    context: ExecutionContext,
    repository: Arc<Repository>,
    live: DashMap<u64, Arc<Trampoline>>,
    /// Invocations in progress per id
    active: DashMap<u64, usize>,
    pending_free: Mutex<Vec<u64>>,
    next_id: AtomicU64,
    destroy_notify: OnceCell<DestroyNotifier>,
    last_error: Mutex<Option<MarshalError>>,
    #[cfg(feature = "native")]
    entries: DashMap<u64, NativeEntry>,
    /// Code of freed trampolines, reclaimed at the next drain
    #[cfg(feature = "native")]
    retired: Mutex<Vec<(u64, NativeEntry)>>,
}

/// Marks an id as being invoked for the guard's lifetime
struct ActiveCall<'a> {
    shared: &'a Shared,
    id: u64,
}

impl<'a> ActiveCall<'a> {
    fn enter(shared: &'a Shared, id: u64) -> Self {
        *shared.active.entry(id).or_insert(0) += 1;
        Self { shared, id }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.shared.active.get_mut(&self.id) {
            *count -= 1;
        }
        self.shared.active.remove_if(&self.id, |_, count| *count == 0);
    }
}

impl Shared {
    fn is_active(&self, id: u64) -> bool {
        self.active.get(&id).is_some_and(|count| *count > 0)
    }

    /// Drop a trampoline from the live table
    fn free(&self, id: u64, reason: &str) -> bool {
        let removed = self.live.remove(&id).is_some();
        #[cfg(feature = "native")]
        if let Some((_, entry)) = self.entries.remove(&id) {
            self.retired.lock().push((id, entry));
        }
        if removed {
            logging::log_trampoline_freed(id, reason);
        }
        removed
    }

    fn defer(&self, id: u64) {
        let mut pending = self.pending_free.lock();
        if !pending.contains(&id) {
            pending.push(id);
        }
        let threshold = self.marshaller.config().callbacks.pending_free_warn;
        if pending.len() > threshold {
            warn!(
                event = "pending_free_backlog",
                pending = pending.len(),
                threshold,
                "async trampolines waiting to be freed"
            );
        }
    }

    fn dispose(&self, trampoline: &Trampoline) {
        match trampoline.scope {
            ScopeType::Call => {
                self.free(trampoline.id, "call scope");
            }
            ScopeType::Notified => {}
            ScopeType::Async => self.defer(trampoline.id),
        }
    }

    /// Convert arguments, call the host, convert the result
    unsafe fn run(&self, trampoline: &Trampoline, args: &[Argument]) -> Result<Argument> {
        let callback = &trampoline.callback;
        let mut host_args: SmallVec<[HostValue; 8]> = SmallVec::new();

        for (i, arg) in callback.args().enumerate() {
            if arg.is_user_data() {
                if let Some(data) = &trampoline.user_data {
                    host_args.push(data.clone());
                }
                continue;
            }
            let info = arg.type_info();
            if info.tag() == TypeTag::Error && arg.direction() != Direction::In {
                continue;
            }
            let native = args.get(i).copied().ok_or_else(|| {
                MarshalError::conversion(format!(
                    "{} expects {} arguments, got {}",
                    callback.full_name(),
                    callback.n_args(),
                    args.len()
                ))
            })?;
            host_args.push(self.marshaller.to_host(native, &info, arg.transfer())?);
        }

        let result = trampoline.function.call(&host_args)?;

        let return_type = callback.return_type();
        if return_type.tag() == TypeTag::Void && !return_type.is_pointer() {
            return Ok(Argument::Void);
        }
        self.marshaller.check_value(&return_type, &result)?;
        self.marshaller
            .to_native(&result, &return_type, callback.caller_owns())
    }

    /// Stash a callback failure; native code gets a zeroed result
    fn recover(&self, trampoline: &Trampoline, error: MarshalError) -> Result<Argument> {
        logging::log_callback_error(trampoline.function.name(), &error.to_string());
        *self.last_error.lock() = Some(error.clone());
        if self.marshaller.config().callbacks.zero_result_on_error {
            Ok(Argument::zeroed(&trampoline.callback.return_type()))
        } else {
            Err(error)
        }
    }
}

/// Creates trampolines for callback arguments and owns them until their
/// scope says they are done
#[derive(Clone)]
pub struct TrampolineManager {
    shared: Arc<Shared>,
}

impl TrampolineManager {
    pub fn new(marshaller: Arc<Marshaller>, repository: Arc<Repository>, context: ExecutionContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                marshaller,
                context,
                repository,
                live: DashMap::new(),
                active: DashMap::new(),
                pending_free: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                destroy_notify: OnceCell::new(),
                last_error: Mutex::new(None),
                #[cfg(feature = "native")]
                entries: DashMap::new(),
                #[cfg(feature = "native")]
                retired: Mutex::new(Vec::new()),
            }),
        }
    }

    #[cfg(feature = "native")]
    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn marshaller(&self) -> &Arc<Marshaller> {
        &self.shared.marshaller
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.shared.context
    }

    /// Bind the host callable supplied for `slots.callback` into a trampoline
    ///
    /// `host_args` are the caller's arguments in declaration order, with
    /// the receiver first for methods. The destroy notifier takes no host
    /// argument. Pending async trampolines are drained first.
    pub fn create_trampoline(
        &self,
        function: &CallableInfo,
        slots: &CallbackSlots,
        host_args: &[HostValue],
    ) -> Result<TrampolineHandle> {
        let _context = self.shared.context.enter();
        self.drain_pending();

        let callback_index = slots.callback.ok_or_else(|| {
            MarshalError::conversion(format!("{} has no callback argument", function.full_name()))
        })?;
        let callback_arg = function.arg(callback_index).ok_or_else(|| {
            MarshalError::conversion(format!(
                "{} has no argument {}",
                function.full_name(),
                callback_index
            ))
        })?;
        let invalid = || {
            MarshalError::new(ErrorKind::InvalidCallback {
                function: function.full_name(),
                argument: callback_arg.name().to_string(),
            })
        };
        let callback = callback_arg
            .type_info()
            .interface_info()
            .and_then(|iface| iface.as_callable())
            .ok_or_else(invalid)?;

        let mut position = usize::from(function.is_method());
        let mut supplied = None;
        let mut user_data = None;
        for i in 0..function.n_args() {
            if Some(i) == slots.destroy_notify {
                continue;
            }
            let value = host_args.get(position);
            if i == callback_index {
                supplied = value;
            } else if Some(i) == slots.user_data {
                user_data = value.filter(|v| !v.is_none()).cloned();
            }
            position += 1;
        }

        let function_value = match supplied {
            Some(HostValue::Callable(callable)) => callable.clone(),
            _ => return Err(invalid()),
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let scope = callback_arg.scope();
        let trampoline = Arc::new(Trampoline {
            id,
            callback,
            function: function_value,
            user_data,
            scope,
        });

        #[cfg(feature = "native")]
        let code = {
            let entry = NativeEntry::trampoline(Arc::downgrade(&self.shared), id, &trampoline.callback)?;
            let code = entry.code_ptr();
            self.shared.entries.insert(id, entry);
            code
        };
        #[cfg(not(feature = "native"))]
        let code = std::ptr::null();

        logging::log_trampoline_created(id, &trampoline.callback.full_name(), scope.as_str());
        self.shared.live.insert(id, trampoline);

        Ok(TrampolineHandle { id, scope, code })
    }

    /// Run trampoline `id` with native arguments laid out per its callback
    /// signature, then dispose of it according to its scope
    ///
    /// A failing host callable never propagates into native code: the
    /// error is logged and kept for `take_callback_error`, and the result
    /// is zeroed unless configured otherwise.
    ///
    /// # Safety
    /// Pointer arguments must be null or live and match the signature.
    pub unsafe fn invoke(&self, id: u64, args: &[Argument]) -> Result<Argument> {
        let shared = &*self.shared;
        let _context = shared.context.enter();

        let trampoline = shared
            .live
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MarshalError::new(ErrorKind::TrampolineFreed(id)))?;

        let outcome = {
            let _active = ActiveCall::enter(shared, id);
            shared.run(&trampoline, args)
        };
        shared.dispose(&trampoline);

        outcome.or_else(|error| shared.recover(&trampoline, error))
    }

    /// Free every queued async trampoline not currently running
    pub fn drain_pending(&self) -> usize {
        let shared = &*self.shared;
        let _context = shared.context.enter();
        let _perf = logging::perf::track("drain_pending");

        let ready: Vec<u64> = {
            let mut pending = shared.pending_free.lock();
            let (ready, running): (Vec<u64>, Vec<u64>) =
                pending.drain(..).partition(|id| !shared.is_active(*id));
            *pending = running;
            ready
        };
        for id in &ready {
            shared.free(*id, "async drain");
        }

        #[cfg(feature = "native")]
        shared.retired.lock().retain(|(id, _)| shared.is_active(*id));

        ready.len()
    }

    /// The shared destroy notifier, built on first use
    pub fn destroy_notifier(&self) -> Result<&DestroyNotifier> {
        self.shared.destroy_notify.get_or_try_init(|| {
            let signature = self.shared.repository.destroy_notify().ok_or_else(|| {
                MarshalError::conversion("GLib.DestroyNotify is not registered")
            })?;
            DestroyNotifier::new(&self.shared, signature)
        })
    }

    /// Destroy notification for the trampoline behind `user_data`
    pub fn notify(&self, user_data: *mut c_void) -> bool {
        let _context = self.shared.context.enter();
        let id = user_data as usize as u64;
        let freed = self.shared.free(id, "destroy notify");
        if !freed {
            warn!(event = "destroy_notify_unknown", id, "no live trampoline for destroy notify");
        }
        freed
    }

    /// Callback signature of a live trampoline
    pub fn signature(&self, id: u64) -> Option<CallableInfo> {
        self.shared.live.get(&id).map(|entry| entry.callback.clone())
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.shared.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.shared.live.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending_free.lock().len()
    }

    /// Last failure raised inside a host callback, cleared on read
    pub fn take_callback_error(&self) -> Option<MarshalError> {
        self.shared.last_error.lock().take()
    }
}

impl std::fmt::Debug for TrampolineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrampolineManager")
            .field("live", &self.live_count())
            .field("pending_free", &self.pending_count())
            .finish()
    }
}
