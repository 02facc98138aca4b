//! Callable signatures and their arguments

use super::type_info::TypeInfo;
use super::tag::TypeTag;
use std::fmt;
use std::sync::Arc;

/// Who releases heap payloads after a crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transfer {
    Nothing,
    Container,
    Everything,
}

impl Transfer {
    pub const ALL: [Transfer; 3] = [Self::Nothing, Self::Container, Self::Everything];

    /// Transfer applied to container elements during conversion
    #[inline]
    pub const fn item_transfer(self) -> Transfer {
        match self {
            Self::Container => Self::Nothing,
            other => other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Container => "container",
            Self::Everything => "everything",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::InOut => "inout",
        }
    }
}

/// Lifetime policy of a callback trampoline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScopeType {
    /// Valid only for the duration of the call
    #[default]
    Call,
    /// Freed when the paired destroy notifier runs
    Notified,
    /// Invoked exactly once, possibly after the call returned
    Async,
}

impl ScopeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Notified => "notified",
            Self::Async => "async",
        }
    }
}

#[derive(Clone)]
struct ArgData {
    name: String,
    type_info: TypeInfo,
    direction: Direction,
    transfer: Transfer,
    scope: ScopeType,
    closure: Option<usize>,
    destroy: Option<usize>,
}

/// Descriptor of one declared argument
#[derive(Clone)]
pub struct ArgInfo(Arc<ArgData>);

impl ArgInfo {
    /// Inbound argument with transfer nothing
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self(Arc::new(ArgData {
            name: name.into(),
            type_info,
            direction: Direction::In,
            transfer: Transfer::Nothing,
            scope: ScopeType::Call,
            closure: None,
            destroy: None,
        }))
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        Arc::make_mut(&mut self.0).direction = direction;
        self
    }

    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        Arc::make_mut(&mut self.0).transfer = transfer;
        self
    }

    pub fn with_scope(mut self, scope: ScopeType) -> Self {
        Arc::make_mut(&mut self.0).scope = scope;
        self
    }

    /// Index of the user-data argument paired with this callback
    pub fn with_closure(mut self, index: usize) -> Self {
        Arc::make_mut(&mut self.0).closure = Some(index);
        self
    }

    /// Index of the destroy notifier paired with this callback
    pub fn with_destroy(mut self, index: usize) -> Self {
        Arc::make_mut(&mut self.0).destroy = Some(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn type_info(&self) -> TypeInfo {
        self.0.type_info.clone()
    }

    pub fn direction(&self) -> Direction {
        self.0.direction
    }

    pub fn transfer(&self) -> Transfer {
        self.0.transfer
    }

    pub fn scope(&self) -> ScopeType {
        self.0.scope
    }

    pub fn closure(&self) -> Option<usize> {
        self.0.closure
    }

    pub fn destroy(&self) -> Option<usize> {
        self.0.destroy
    }

    /// Untyped `void*` parameter, the slot user data travels through
    pub fn is_user_data(&self) -> bool {
        let info = &self.0.type_info;
        info.tag() == TypeTag::Void && info.is_pointer()
    }
}

impl fmt::Debug for ArgInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgInfo")
            .field("name", &self.0.name)
            .field("type", &self.0.type_info)
            .field("direction", &self.0.direction)
            .field("transfer", &self.0.transfer)
            .finish()
    }
}

struct CallableData {
    namespace: String,
    name: String,
    args: Vec<ArgInfo>,
    return_type: TypeInfo,
    caller_owns: Transfer,
    is_method: bool,
}

/// Signature of a function, method or callback
#[derive(Clone)]
pub struct CallableInfo(Arc<CallableData>);

impl CallableInfo {
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> CallableBuilder {
        CallableBuilder {
            namespace: namespace.into(),
            name: name.into(),
            args: Vec::new(),
            return_type: TypeInfo::new(TypeTag::Void),
            caller_owns: Transfer::Nothing,
            is_method: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.0.namespace
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// `Namespace.name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.0.namespace, self.0.name)
    }

    pub fn n_args(&self) -> usize {
        self.0.args.len()
    }

    pub fn arg(&self, index: usize) -> Option<ArgInfo> {
        self.0.args.get(index).cloned()
    }

    pub fn args(&self) -> impl Iterator<Item = ArgInfo> + '_ {
        self.0.args.iter().cloned()
    }

    pub fn return_type(&self) -> TypeInfo {
        self.0.return_type.clone()
    }

    /// Transfer of the return value
    pub fn caller_owns(&self) -> Transfer {
        self.0.caller_owns
    }

    pub fn is_method(&self) -> bool {
        self.0.is_method
    }

    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for CallableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableInfo")
            .field("name", &self.full_name())
            .field("args", &self.0.args)
            .finish()
    }
}

pub struct CallableBuilder {
    namespace: String,
    name: String,
    args: Vec<ArgInfo>,
    return_type: TypeInfo,
    caller_owns: Transfer,
    is_method: bool,
}

impl CallableBuilder {
    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.args.push(arg);
        self
    }

    pub fn returns(mut self, return_type: TypeInfo, caller_owns: Transfer) -> Self {
        self.return_type = return_type;
        self.caller_owns = caller_owns;
        self
    }

    pub fn method(mut self) -> Self {
        self.is_method = true;
        self
    }

    pub fn build(self) -> CallableInfo {
        CallableInfo(Arc::new(CallableData {
            namespace: self.namespace,
            name: self.name,
            args: self.args,
            return_type: self.return_type,
            caller_owns: self.caller_owns,
            is_method: self.is_method,
        }))
    }
}
