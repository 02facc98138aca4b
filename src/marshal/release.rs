//! Ownership releaser
//!
//! Frees whatever the transfer contract leaves with the caller. Inputs are
//! values the caller built with `to_native`; outputs are values native code
//! handed back. In/out slots are never freed here.
//!
//! | payload    | In                      | Out                          |
//! |------------|-------------------------|------------------------------|
//! | string     | Nothing                 | Everything                   |
//! | elements   | Nothing, Container      | Everything                   |
//! | container  | Nothing                 | Container, Everything        |
//! | object     | -                       | Everything                   |

use super::validate::{element_type, entry_types};
use super::Marshaller;
use crate::introspection::{Direction, InfoType, InterfaceInfo, Transfer, TypeInfo, TypeTag};
use crate::logging;
use crate::native::list::{self, Node};
use crate::native::string::string_free;
use crate::native::{
    error_cell_free, typthon_object_unref, Argument, NativeArray, NativeClosure, NativeHashTable,
    NativeObject, NativeValue,
};
use crate::types::DynamicType;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Contract {
    transfer: Transfer,
    direction: Direction,
}

impl Contract {
    fn is_in(self) -> bool {
        self.direction == Direction::In
    }

    fn is_out(self) -> bool {
        self.direction == Direction::Out
    }

    fn frees_items(self) -> bool {
        (self.is_in() && self.transfer != Transfer::Everything)
            || (self.is_out() && self.transfer == Transfer::Everything)
    }

    fn frees_container(self) -> bool {
        (self.is_in() && self.transfer == Transfer::Nothing)
            || (self.is_out() && self.transfer != Transfer::Nothing)
    }

    fn frees_string(self) -> bool {
        (self.is_in() && self.transfer == Transfer::Nothing)
            || (self.is_out() && self.transfer == Transfer::Everything)
    }

    /// Elements were converted with the item transfer: borrowed on the
    /// way in, owned on the way out
    fn item_transfer(self) -> Transfer {
        if self.is_in() {
            Transfer::Nothing
        } else {
            Transfer::Everything
        }
    }
}

impl Marshaller {
    /// Free the parts of `arg` the transfer contract leaves to the caller
    ///
    /// Never fails; a slot that does not match `info` is logged and skipped.
    ///
    /// # Safety
    /// Every pointer reachable from `arg` must be null or live, and must
    /// have been produced by `to_native` or by native code following the
    /// same allocation rules. Nothing reachable may be used after it is
    /// released.
    pub unsafe fn release(&self, arg: Argument, info: &TypeInfo, transfer: Transfer, direction: Direction) {
        let tag = info.tag();
        logging::log_release(tag.name(), direction.as_str(), transfer.as_str());

        if direction == Direction::InOut || arg.is_null() {
            return;
        }
        let contract = Contract { transfer, direction };

        match (tag, arg) {
            (TypeTag::Void, Argument::Pointer(key)) => {
                if contract.frees_container() {
                    self.opaque.retire(key);
                }
            }
            (TypeTag::Void, Argument::Void) => {}

            (TypeTag::Utf8 | TypeTag::Filename, Argument::String(p)) => {
                if contract.frees_string() {
                    string_free(p);
                }
            }

            (TypeTag::Array, Argument::Array(array)) => {
                if contract.frees_items() {
                    if let Some(item_info) = nested(element_type(info)) {
                        for item in (*array).items() {
                            self.release(*item, &item_info, contract.item_transfer(), direction);
                        }
                    }
                }
                if contract.frees_container() {
                    NativeArray::free(array);
                }
            }

            (TypeTag::GList, Argument::List(head)) => self.release_list(head, info, contract),
            (TypeTag::GSList, Argument::SList(head)) => self.release_list(head, info, contract),

            (TypeTag::GHash, Argument::HashTable(table)) => self.release_hash(table, info, contract),

            (TypeTag::Error, Argument::Error(cell)) => error_cell_free(cell),

            (TypeTag::Interface, slot) => match info.interface_info() {
                Some(iface) => self.release_interface(slot, info, &iface, contract),
                None => warn!(event = "release_skipped", reason = "interface descriptor has no interface info"),
            },

            (tag, slot) if is_scalar(tag, &slot) => {}

            (tag, slot) => warn!(
                event = "release_skipped",
                tag = tag.name(),
                slot = slot.variant_name(),
                "slot does not match its descriptor"
            ),
        }
    }

    unsafe fn release_list<N: Node>(&self, head: *mut N, info: &TypeInfo, contract: Contract) {
        if contract.frees_items() {
            if let Some(item_info) = nested(element_type(info)) {
                for item in list::iter(head) {
                    self.release(*item, &item_info, contract.item_transfer(), contract.direction);
                }
            }
        }
        if contract.frees_container() {
            list::free(head);
        }
    }

    unsafe fn release_hash(&self, table: *mut NativeHashTable, info: &TypeInfo, contract: Contract) {
        let entries = || -> Vec<(Argument, Argument)> { (*table).iter().map(|(k, v)| (*k, *v)).collect() };

        if contract.is_in() && contract.transfer != Transfer::Everything {
            if let Some((key_info, value_info)) = nested(entry_types(info)) {
                for (key, value) in entries() {
                    self.release(key, &key_info, Transfer::Nothing, Direction::In);
                    self.release(value, &value_info, Transfer::Nothing, Direction::In);
                }
            }
        } else if contract.is_out() && contract.transfer == Transfer::Container {
            (*table).steal_all();
        } else if contract.is_out()
            && contract.transfer == Transfer::Everything
            && !(*table).has_destroy_fns()
        {
            if let Some((key_info, value_info)) = nested(entry_types(info)) {
                for (key, value) in entries() {
                    self.release(key, &key_info, Transfer::Everything, Direction::Out);
                    self.release(value, &value_info, Transfer::Everything, Direction::Out);
                }
            }
            (*table).steal_all();
        }

        if contract.frees_container() {
            NativeHashTable::unref(table);
        }
    }

    unsafe fn release_interface(
        &self,
        slot: Argument,
        info: &TypeInfo,
        iface: &InterfaceInfo,
        contract: Contract,
    ) {
        let Contract { transfer, direction } = contract;
        match (iface.info_type(), slot) {
            (InfoType::Callback, _) | (InfoType::Enum | InfoType::Flags, Argument::Enum(_)) => {}

            (InfoType::Struct | InfoType::Boxed | InfoType::Union, Argument::Pointer(p)) => {
                let g_type = iface.registered_type();
                if self.types.is_a(g_type, DynamicType::VALUE) {
                    let value = p as *mut NativeValue;
                    if (contract.is_in() && transfer != Transfer::Everything)
                        || (contract.is_out() && transfer == Transfer::Everything)
                    {
                        (*value).unset(&self.types);
                    }
                    if contract.frees_container() {
                        NativeValue::free(value);
                    }
                } else if self.types.is_a(g_type, DynamicType::CLOSURE) {
                    if contract.is_in() && transfer == Transfer::Nothing {
                        NativeClosure::unref(p as *mut NativeClosure);
                    }
                } else if self.types.is_a(g_type, DynamicType::BOXED) {
                    // Boxed copies belong to whoever received them
                } else if self.types.is_a(g_type, DynamicType::POINTER) || g_type == DynamicType::NONE {
                    self.check_transfer(
                        !info.is_pointer() || transfer == Transfer::Nothing,
                        TypeTag::Interface,
                        transfer,
                        "plain structs are never freed",
                    );
                }
            }

            (InfoType::Object | InfoType::Interface, Argument::Pointer(p)) => {
                if direction == Direction::Out && transfer == Transfer::Everything {
                    typthon_object_unref(p as *mut NativeObject);
                }
            }

            (info_type, slot) => warn!(
                event = "release_skipped",
                interface = info_type.name(),
                slot = slot.variant_name(),
                "slot does not match its descriptor"
            ),
        }
    }
}

fn nested<T>(descriptor: crate::error::Result<T>) -> Option<T> {
    descriptor
        .map_err(|e| warn!(event = "release_skipped", error = %e))
        .ok()
}

/// Scalars own nothing; any matching slot is fine
fn is_scalar(tag: TypeTag, slot: &Argument) -> bool {
    !matches!(
        slot,
        Argument::String(_)
            | Argument::Array(_)
            | Argument::List(_)
            | Argument::SList(_)
            | Argument::HashTable(_)
            | Argument::Error(_)
            | Argument::Pointer(_)
    ) && !matches!(
        tag,
        TypeTag::Utf8
            | TypeTag::Filename
            | TypeTag::Array
            | TypeTag::GList
            | TypeTag::GSList
            | TypeTag::GHash
            | TypeTag::Error
            | TypeTag::Void
    )
}
