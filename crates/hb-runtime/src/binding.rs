use std::fmt;
use std::rc::Rc;

use hb_core::{HostError, HostHandle, ScriptValue};

use crate::dispatch::Invocation;

pub type HandlerResult = Result<ScriptValue, HostError>;
pub type FunctionHandler = Rc<dyn Fn(&Invocation<'_>) -> HandlerResult>;
pub type GetterHandler = Rc<dyn Fn(HostHandle) -> HandlerResult>;
pub type SetterHandler = Rc<dyn Fn(HostHandle, ScriptValue) -> Result<(), HostError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Method,
}

#[derive(Clone)]
pub struct FunctionBinding {
    pub name: String,
    /// `None` accepts any argument count up to the session's `max_call_args`.
    pub arity: Option<usize>,
    pub kind: FunctionKind,
    pub handler: FunctionHandler,
}

impl FunctionBinding {
    pub fn free(
        name: impl Into<String>,
        handler: impl Fn(&Invocation<'_>) -> HandlerResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: None,
            kind: FunctionKind::Free,
            handler: Rc::new(handler),
        }
    }

    pub fn method(
        name: impl Into<String>,
        handler: impl Fn(&Invocation<'_>) -> HandlerResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: None,
            kind: FunctionKind::Method,
            handler: Rc::new(handler),
        }
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }
}

impl fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PropertyBinding {
    pub name: String,
    pub getter: Option<GetterHandler>,
    pub setter: Option<SetterHandler>,
}

impl PropertyBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            getter: None,
            setter: None,
        }
    }

    pub fn with_getter(mut self, getter: impl Fn(HostHandle) -> HandlerResult + 'static) -> Self {
        self.getter = Some(Rc::new(getter));
        self
    }

    pub fn with_setter(
        mut self,
        setter: impl Fn(HostHandle, ScriptValue) -> Result<(), HostError> + 'static,
    ) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("name", &self.name)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}
