//! Executable entry points for trampolines, built with libffi closures

use super::manager::{Shared, TrampolineManager};
use crate::error::{MarshalError, Result};
use crate::introspection::{CallableInfo, InfoType, TypeInfo, TypeTag};
use crate::native::{Argument, RawArgument};
use libffi::low;
use libffi::middle::{Cif, Closure, Type};
use std::ffi::c_void;
use std::sync::Weak;
use tracing::error;

enum EntryKind {
    Trampoline(u64),
    DestroyNotify,
}

struct EntryData {
    shared: Weak<Shared>,
    kind: EntryKind,
}

/// A libffi closure plus the data its handler reads
pub(super) struct NativeEntry {
    // Declared first so the closure is torn down before its data
    closure: Closure<'static>,
    _data: Box<EntryData>,
}

// The closure only reads `EntryData`, which is itself thread safe
unsafe impl Send for NativeEntry {}
unsafe impl Sync for NativeEntry {}

impl NativeEntry {
    pub(super) fn trampoline(shared: Weak<Shared>, id: u64, signature: &CallableInfo) -> Result<Self> {
        let cif = cif_for(signature)?;
        Ok(Self::build(
            cif,
            EntryData {
                shared,
                kind: EntryKind::Trampoline(id),
            },
        ))
    }

    pub(super) fn destroy_notify(shared: Weak<Shared>, signature: &CallableInfo) -> Result<Self> {
        let cif = cif_for(signature)?;
        Ok(Self::build(
            cif,
            EntryData {
                shared,
                kind: EntryKind::DestroyNotify,
            },
        ))
    }

    fn build(cif: Cif, data: EntryData) -> Self {
        let data = Box::new(data);
        // Safety: the box is never moved out of and outlives the closure
        let userdata: &'static EntryData = unsafe { &*(data.as_ref() as *const EntryData) };
        let closure = Closure::new(cif, handle, userdata);
        Self { closure, _data: data }
    }

    pub(super) fn code_ptr(&self) -> *const c_void {
        *self.closure.code_ptr() as *const c_void
    }
}

unsafe extern "C" fn handle(
    _cif: &low::ffi_cif,
    result: &mut RawArgument,
    args: *const *const c_void,
    data: &EntryData,
) {
    let Some(shared) = data.shared.upgrade() else {
        error!(event = "trampoline_orphaned", "native callback fired after its manager was dropped");
        *result = RawArgument::zeroed();
        return;
    };
    let manager = TrampolineManager::from_shared(shared);

    match &data.kind {
        EntryKind::DestroyNotify => {
            let user_data = std::ptr::read(*args as *const *mut c_void);
            manager.notify(user_data);
        }
        EntryKind::Trampoline(id) => {
            let Some(signature) = manager.signature(*id) else {
                error!(event = "trampoline_freed_call", id, "native code called a freed trampoline");
                *result = RawArgument::zeroed();
                return;
            };
            let native_args: Vec<Argument> = signature
                .args()
                .enumerate()
                .map(|(i, arg)| read_arg(*args.add(i), &arg.type_info()))
                .collect();

            let return_type = signature.return_type();
            *result = match manager.invoke(*id, &native_args) {
                Ok(value) if return_type.tag() != TypeTag::Void || return_type.is_pointer() => {
                    RawArgument::from_argument(value)
                }
                Ok(_) => RawArgument::zeroed(),
                Err(e) => {
                    error!(event = "trampoline_failed", id, error = %e, "native callback failed");
                    RawArgument::zeroed()
                }
            };
        }
    }
}

/// Read one incoming argument. Inline structs are declared to libffi as
/// pointers, so their slot holds the struct's address rather than the
/// struct itself.
unsafe fn read_arg(slot: *const c_void, info: &TypeInfo) -> Argument {
    if passed_by_address(info) {
        return Argument::Pointer(*(slot as *const *mut c_void));
    }
    RawArgument::read(slot, info)
}

fn passed_by_address(info: &TypeInfo) -> bool {
    info.tag() == TypeTag::Interface
        && !info.is_pointer()
        && matches!(
            info.interface_info().map(|i| i.info_type()),
            Some(InfoType::Struct | InfoType::Boxed | InfoType::Union)
        )
}

fn cif_for(signature: &CallableInfo) -> Result<Cif> {
    let params = signature
        .args()
        .map(|arg| ffi_type(&arg.type_info()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Cif::new(params, ffi_type(&signature.return_type())?))
}

/// libffi type for a slot; inline structs travel by address
fn ffi_type(info: &TypeInfo) -> Result<Type> {
    let ty = match info.tag() {
        TypeTag::Void if info.is_pointer() => Type::pointer(),
        TypeTag::Void => Type::void(),
        TypeTag::Boolean => Type::c_int(),
        TypeTag::Int8 => Type::i8(),
        TypeTag::UInt8 => Type::u8(),
        TypeTag::Int16 => Type::i16(),
        TypeTag::UInt16 => Type::u16(),
        TypeTag::Int32 => Type::i32(),
        TypeTag::UInt32 => Type::u32(),
        TypeTag::Int64 | TypeTag::TimeT => Type::i64(),
        TypeTag::UInt64 => Type::u64(),
        TypeTag::Short => Type::c_short(),
        TypeTag::UShort => Type::c_ushort(),
        TypeTag::Int => Type::c_int(),
        TypeTag::UInt => Type::c_uint(),
        TypeTag::Long => Type::c_long(),
        TypeTag::ULong => Type::c_ulong(),
        TypeTag::SSize => Type::isize(),
        TypeTag::Size | TypeTag::GType => Type::usize(),
        TypeTag::Float => Type::f32(),
        TypeTag::Double => Type::f64(),
        TypeTag::Utf8
        | TypeTag::Filename
        | TypeTag::Array
        | TypeTag::GList
        | TypeTag::GSList
        | TypeTag::GHash
        | TypeTag::Error => Type::pointer(),
        TypeTag::Interface => {
            let iface = info
                .interface_info()
                .ok_or_else(|| MarshalError::conversion("interface descriptor has no interface"))?;
            match iface.info_type() {
                InfoType::Enum | InfoType::Flags => Type::c_int(),
                _ => Type::pointer(),
            }
        }
    };
    Ok(ty)
}
