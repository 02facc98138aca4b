//! Locating the callback, user data and destroy notifier of a signature

use crate::error::{ErrorKind, MarshalError, Result};
use crate::introspection::{is_destroy_notify, CallableInfo, InfoType, TypeTag};

/// Argument positions that take part in a callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackSlots {
    pub callback: Option<usize>,
    pub user_data: Option<usize>,
    pub destroy_notify: Option<usize>,
}

impl CallbackSlots {
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

/// Find the single callback argument of `function` and the arguments it
/// is paired with
///
/// Closure and destroy indices are declared counting the receiver for
/// methods; they are shifted down so they index `function`'s argument
/// list. A role claimed by two different positions is rejected.
pub fn scan_for_callback_slots(function: &CallableInfo) -> Result<CallbackSlots> {
    let n_args = function.n_args();
    let mut slots = CallbackSlots::default();

    for (i, arg) in function.args().enumerate() {
        let type_info = arg.type_info();
        if type_info.tag() == TypeTag::Interface {
            if let Some(iface) = type_info.interface_info() {
                if iface.info_type() == InfoType::Callback && !is_destroy_notify(&iface) {
                    claim(&mut slots.callback, i, || ErrorKind::MultipleCallbacks(function.full_name()))?;
                }
            }
        }

        if let Some(destroy) = paired_index(arg.destroy(), function.is_method(), n_args) {
            claim(&mut slots.destroy_notify, destroy, || {
                ErrorKind::MultipleDestroyNotify(function.full_name())
            })?;
        }

        if let Some(closure) = paired_index(arg.closure(), function.is_method(), n_args) {
            claim(&mut slots.user_data, closure, || {
                ErrorKind::MultipleUserData(function.full_name())
            })?;
        }
    }

    tracing::trace!(
        event = "callback_scan",
        function = %function.full_name(),
        callback = ?slots.callback,
        user_data = ?slots.user_data,
        destroy_notify = ?slots.destroy_notify
    );
    Ok(slots)
}

fn paired_index(declared: Option<usize>, is_method: bool, n_args: usize) -> Option<usize> {
    let index = if is_method {
        declared?.checked_sub(1)?
    } else {
        declared?
    };
    (index < n_args).then_some(index)
}

fn claim(slot: &mut Option<usize>, index: usize, conflict: impl FnOnce() -> ErrorKind) -> Result<()> {
    match *slot {
        Some(existing) if existing != index => Err(MarshalError::new(conflict())),
        _ => {
            *slot = Some(index);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::{ArgInfo, InterfaceInfo, Repository, TypeInfo};

    fn callback_type(name: &str) -> TypeInfo {
        let signature = CallableInfo::builder("Test", name).build();
        TypeInfo::interface(InterfaceInfo::callback(signature))
    }

    fn destroy_type() -> TypeInfo {
        let repository = Repository::new();
        let signature = repository.destroy_notify().unwrap();
        TypeInfo::interface(InterfaceInfo::callback(signature))
    }

    #[test]
    fn test_finds_all_three_roles() {
        let function = CallableInfo::builder("Test", "watch")
            .arg(ArgInfo::new("func", callback_type("Func")).with_closure(1).with_destroy(2))
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
            .arg(ArgInfo::new("notify", destroy_type()))
            .build();

        let slots = scan_for_callback_slots(&function).unwrap();
        assert_eq!(
            slots,
            CallbackSlots {
                callback: Some(0),
                user_data: Some(1),
                destroy_notify: Some(2),
            }
        );
    }

    #[test]
    fn test_method_indices_shift() {
        let function = CallableInfo::builder("Test", "connect")
            .arg(ArgInfo::new("func", callback_type("Func")).with_closure(2))
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()))
            .method()
            .build();

        let slots = scan_for_callback_slots(&function).unwrap();
        assert_eq!(slots.callback, Some(0));
        assert_eq!(slots.user_data, Some(1));
        assert_eq!(slots.destroy_notify, None);
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let function = CallableInfo::builder("Test", "f")
            .arg(ArgInfo::new("func", callback_type("Func")).with_closure(5))
            .build();
        assert_eq!(scan_for_callback_slots(&function).unwrap().user_data, None);
    }

    #[test]
    fn test_two_callbacks_rejected() {
        let function = CallableInfo::builder("Test", "both")
            .arg(ArgInfo::new("a", callback_type("A")))
            .arg(ArgInfo::new("b", callback_type("B")))
            .build();

        let err = scan_for_callback_slots(&function).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Function Test.both has multiple callbacks, not supported"
        );
    }

    #[test]
    fn test_repeated_user_data_index_accepted() {
        let function = CallableInfo::builder("Test", "same")
            .arg(ArgInfo::new("func", callback_type("Func")).with_closure(1))
            .arg(ArgInfo::new("data", TypeInfo::void_pointer()).with_closure(1))
            .build();
        assert_eq!(scan_for_callback_slots(&function).unwrap().user_data, Some(1));
    }

    #[test]
    fn test_conflicting_user_data_rejected() {
        let function = CallableInfo::builder("Test", "split")
            .arg(ArgInfo::new("func", callback_type("Func")).with_closure(1))
            .arg(ArgInfo::new("a", TypeInfo::void_pointer()).with_closure(2))
            .arg(ArgInfo::new("b", TypeInfo::void_pointer()))
            .build();
        let err = scan_for_callback_slots(&function).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MultipleUserData(_)));
    }
}
