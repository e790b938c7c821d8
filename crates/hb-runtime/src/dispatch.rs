use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hb_core::{
    BridgeError, DecodeError, FromScriptValue, HostError, HostHandle, IdentityError, NotFoundKind,
    ObjectRef, ScriptValue, SessionId, TypeHandle, ValueKind,
};
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, NativeCallContext, Position};
use tracing::{debug, error, trace};

use crate::binding::{FunctionBinding, HandlerResult, PropertyBinding};
use crate::bridge;
use crate::registry::IdentityRegistry;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

type Caller<'a> = dyn Fn(&FnPtr, Vec<Dynamic>) -> RhaiResult<Dynamic> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionToken(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Invoked,
    NameResolved,
    ArgsDecoded,
    HostHandlerRan,
    ResultEncoded,
    Returned,
    ErrorRaised,
}

struct CallTrace<'a> {
    session: SessionId,
    function: &'a str,
    phase: CallPhase,
}

impl<'a> CallTrace<'a> {
    fn start(session: SessionId, function: &'a str) -> Self {
        trace!(%session, function, phase = ?CallPhase::Invoked, "dispatch");
        Self {
            session,
            function,
            phase: CallPhase::Invoked,
        }
    }

    fn advance(&mut self, next: CallPhase) {
        trace!(
            session = %self.session,
            function = self.function,
            from = ?self.phase,
            to = ?next,
            "dispatch"
        );
        self.phase = next;
    }
}

/// Thrown into the engine when a host handler fails. Scripts read `message`,
/// `code` and `function` from it inside `catch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    pub code: String,
    pub message: String,
    pub function: String,
}

impl HostException {
    fn from_error(error: HostError, function: &str) -> Self {
        Self {
            code: error.code,
            message: error.message,
            function: function.to_string(),
        }
    }
}

fn throw(error: HostError, function: &str, position: Position) -> Box<EvalAltResult> {
    debug!(function, code = %error.code, message = %error.message, "host handler failed");
    EvalAltResult::ErrorRuntime(
        Dynamic::from(HostException::from_error(error, function)),
        position,
    )
    .into()
}

fn callback_error(error: Box<EvalAltResult>) -> HostError {
    match *error {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => callback_error(inner),
        EvalAltResult::ErrorRuntime(value, _) if value.is::<HostException>() => {
            let exception = value.cast::<HostException>();
            HostError::new(exception.code, exception.message)
        }
        EvalAltResult::ErrorRuntime(value, _) => {
            HostError::new("BRIDGE_CALLBACK_FAILED", value.to_string())
        }
        other => HostError::new("BRIDGE_CALLBACK_FAILED", other.to_string()),
    }
}

pub(crate) struct CallSite<'a> {
    name: &'a str,
    position: Position,
    caller: Option<&'a Caller<'a>>,
}

impl<'a> CallSite<'a> {
    pub(crate) fn new(name: &'a str, position: Position, caller: &'a Caller<'a>) -> Self {
        Self {
            name,
            position,
            caller: Some(caller),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(name: &'a str) -> Self {
        Self {
            name,
            position: Position::NONE,
            caller: None,
        }
    }
}

pub struct Args<'a> {
    values: &'a [&'a mut Dynamic],
}

impl<'a> Args<'a> {
    fn new(values: &'a [&'a mut Dynamic]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Structural value of argument `index`; missing arguments are `Undefined`.
    pub fn value(&self, index: usize) -> Result<ScriptValue, DecodeError> {
        match self.values.get(index) {
            Some(value) => bridge::decode(value).map_err(|error| error.at_argument(index)),
            None => Ok(ScriptValue::Undefined),
        }
    }

    pub fn get<T: FromScriptValue>(&self, index: usize) -> Result<T, DecodeError> {
        self.value(index)
            .and_then(T::from_script_value)
            .map_err(|error| error.at_argument(index))
    }

    pub fn get_or<T: FromScriptValue>(&self, index: usize, default: T) -> Result<T, DecodeError> {
        match self.value(index)? {
            value if value.is_nullish() => Ok(default),
            value => T::from_script_value(value).map_err(|error| error.at_argument(index)),
        }
    }

    pub fn to_vec(&self) -> Result<Vec<ScriptValue>, DecodeError> {
        (0..self.len()).map(|index| self.value(index)).collect()
    }
}

pub struct Invocation<'a> {
    name: &'a str,
    this: Option<HostHandle>,
    args: Args<'a>,
    state: &'a DispatchState,
    caller: Option<&'a Caller<'a>>,
}

impl<'a> Invocation<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn this(&self) -> Option<HostHandle> {
        self.this
    }

    pub fn handle(&self) -> Result<HostHandle, HostError> {
        self.this.ok_or_else(|| {
            HostError::new(
                "BRIDGE_THIS_MISSING",
                format!("\"{}\" was not called as a method", self.name),
            )
        })
    }

    pub fn args(&self) -> &Args<'a> {
        &self.args
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }

    pub fn arg<T: FromScriptValue>(&self, index: usize) -> Result<T, DecodeError> {
        self.args.get(index)
    }

    pub fn new_instance(
        &self,
        type_handle: TypeHandle,
        handle: HostHandle,
    ) -> Result<ScriptValue, HostError> {
        self.state
            .new_instance(type_handle, handle)
            .map(ScriptValue::Object)
            .map_err(HostError::from)
    }

    pub fn call(&self, function: &ScriptValue, args: &[ScriptValue]) -> HandlerResult {
        let pointer = function
            .as_function()
            .and_then(|function| function.downcast::<FnPtr>())
            .ok_or_else(|| DecodeError::new(ValueKind::Function, function.type_name()))?;
        let Some(caller) = self.caller else {
            return Err(HostError::new(
                "BRIDGE_CALLBACK_UNAVAILABLE",
                format!("\"{}\" cannot call back into the script here", self.name),
            ));
        };
        let args: Vec<Dynamic> = args.iter().map(bridge::encode).collect();
        let result = caller(pointer, args).map_err(callback_error)?;
        bridge::decode(&result).map_err(HostError::from)
    }
}

pub(crate) struct ObjectType {
    pub(crate) name: String,
    methods: HashMap<SymbolId, Rc<FunctionBinding>>,
    properties: HashMap<String, PropertyBinding>,
}

pub(crate) struct DispatchState {
    session: SessionId,
    functions: RefCell<Vec<Rc<FunctionBinding>>>,
    types: RefCell<Vec<ObjectType>>,
    symbols: RefCell<HashMap<String, SymbolId>>,
    registry: RefCell<IdentityRegistry>,
}

impl DispatchState {
    pub(crate) fn new(session: SessionId) -> Self {
        Self {
            session,
            functions: RefCell::new(Vec::new()),
            types: RefCell::new(Vec::new()),
            symbols: RefCell::new(HashMap::new()),
            registry: RefCell::new(IdentityRegistry::new(session)),
        }
    }

    pub(crate) fn has_function(&self, name: &str) -> bool {
        self.functions
            .borrow()
            .iter()
            .any(|binding| binding.name == name)
    }

    pub(crate) fn add_function(&self, binding: FunctionBinding) -> FunctionToken {
        let mut functions = self.functions.borrow_mut();
        functions.push(Rc::new(binding));
        FunctionToken(functions.len() - 1)
    }

    pub(crate) fn intern(&self, name: &str) -> (SymbolId, bool) {
        let mut symbols = self.symbols.borrow_mut();
        if let Some(symbol) = symbols.get(name) {
            return (*symbol, false);
        }
        let symbol = SymbolId(symbols.len());
        symbols.insert(name.to_string(), symbol);
        (symbol, true)
    }

    pub(crate) fn type_handle(&self, name: &str) -> Option<TypeHandle> {
        self.types
            .borrow()
            .iter()
            .position(|ty| ty.name == name)
            .map(|index| TypeHandle::new(self.session, index))
    }

    pub(crate) fn add_type(
        &self,
        name: &str,
        methods: Vec<(SymbolId, FunctionBinding)>,
        properties: Vec<PropertyBinding>,
    ) -> TypeHandle {
        let mut types = self.types.borrow_mut();
        types.push(ObjectType {
            name: name.to_string(),
            methods: methods
                .into_iter()
                .map(|(symbol, binding)| (symbol, Rc::new(binding)))
                .collect(),
            properties: properties
                .into_iter()
                .map(|property| (property.name.clone(), property))
                .collect(),
        });
        TypeHandle::new(self.session, types.len() - 1)
    }

    pub(crate) fn new_instance(
        &self,
        type_handle: TypeHandle,
        handle: HostHandle,
    ) -> Result<ObjectRef, BridgeError> {
        let type_name = self.type_name(type_handle).ok_or_else(|| {
            BridgeError::not_found(NotFoundKind::ObjectType, format!("{:?}", type_handle))
        })?;
        let mut registry = self.registry.borrow_mut();
        let object = registry.allocate(type_handle, &type_name);
        registry.bind(&object, handle)?;
        trace!(session = %self.session, object = %object.id(), %handle, "bound instance");
        Ok(object)
    }

    pub(crate) fn resolve(&self, object: &ObjectRef) -> Result<HostHandle, IdentityError> {
        self.registry.borrow().resolve(object)
    }

    pub(crate) fn prune(&self) -> usize {
        self.registry.borrow_mut().prune()
    }

    pub(crate) fn live_objects(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.registry.borrow_mut().clear();
        self.functions.borrow_mut().clear();
        self.types.borrow_mut().clear();
    }

    fn type_name(&self, type_handle: TypeHandle) -> Option<String> {
        if type_handle.session() != self.session {
            return None;
        }
        self.types
            .borrow()
            .get(type_handle.index())
            .map(|ty| ty.name.clone())
    }

    fn identity_violation(&self, error: IdentityError, function: &str) -> Box<EvalAltResult> {
        error!(session = %self.session, function, %error, "object reached dispatch without a host identity");
        EvalAltResult::ErrorSystem("identity violation".to_string(), Box::new(error)).into()
    }

    fn check_arity(
        &self,
        binding: &FunctionBinding,
        argc: usize,
        position: Position,
    ) -> RhaiResult<()> {
        match binding.arity {
            Some(expected) if expected != argc => Err(throw(
                HostError::new(
                    "BRIDGE_ARITY_MISMATCH",
                    format!(
                        "{} expects {} argument(s), got {}",
                        binding.name, expected, argc
                    ),
                ),
                &binding.name,
                position,
            )),
            _ => Ok(()),
        }
    }

    fn finish(
        &self,
        mut trace: CallTrace<'_>,
        result: HandlerResult,
        position: Position,
    ) -> RhaiResult<Dynamic> {
        trace.advance(CallPhase::HostHandlerRan);
        match result {
            Ok(value) => {
                let encoded = bridge::encode(&value);
                trace.advance(CallPhase::ResultEncoded);
                trace.advance(CallPhase::Returned);
                Ok(encoded)
            }
            Err(error) => {
                trace.advance(CallPhase::ErrorRaised);
                Err(throw(error, trace.function, position))
            }
        }
    }

    pub(crate) fn call_free(
        &self,
        token: FunctionToken,
        site: CallSite<'_>,
        args: &mut [&mut Dynamic],
    ) -> RhaiResult<Dynamic> {
        let position = site.position;
        let binding = self.functions.borrow().get(token.0).cloned();
        let Some(binding) = binding else {
            return Err(EvalAltResult::ErrorFunctionNotFound(site.name.to_string(), position).into());
        };
        let mut trace = CallTrace::start(self.session, &binding.name);
        trace.advance(CallPhase::NameResolved);
        if let Err(error) = self.check_arity(&binding, args.len(), position) {
            trace.advance(CallPhase::ErrorRaised);
            return Err(error);
        }

        let invocation = Invocation {
            name: &binding.name,
            this: None,
            args: Args::new(&*args),
            state: self,
            caller: site.caller,
        };
        trace.advance(CallPhase::ArgsDecoded);
        let result = (binding.handler)(&invocation);
        self.finish(trace, result, position)
    }

    pub(crate) fn call_method(
        &self,
        symbol: SymbolId,
        site: CallSite<'_>,
        args: &mut [&mut Dynamic],
    ) -> RhaiResult<Dynamic> {
        let (fn_name, position) = (site.name, site.position);
        let Some((this, rest)) = args.split_first() else {
            return Err(EvalAltResult::ErrorFunctionNotFound(fn_name.to_string(), position).into());
        };
        let Some(object) = this.flatten_clone().try_cast::<ObjectRef>() else {
            return Err(EvalAltResult::ErrorFunctionNotFound(fn_name.to_string(), position).into());
        };
        let handle = self
            .resolve(&object)
            .map_err(|error| self.identity_violation(error, fn_name))?;

        let binding = self
            .types
            .borrow()
            .get(object.type_handle().index())
            .and_then(|ty| ty.methods.get(&symbol).cloned());
        let Some(binding) = binding else {
            return Err(EvalAltResult::ErrorFunctionNotFound(
                format!("{}.{}", object.type_name(), fn_name),
                position,
            )
            .into());
        };
        let mut trace = CallTrace::start(self.session, &binding.name);
        trace.advance(CallPhase::NameResolved);
        if let Err(error) = self.check_arity(&binding, rest.len(), position) {
            trace.advance(CallPhase::ErrorRaised);
            return Err(error);
        }

        let invocation = Invocation {
            name: &binding.name,
            this: Some(handle),
            args: Args::new(rest),
            state: self,
            caller: site.caller,
        };
        trace.advance(CallPhase::ArgsDecoded);
        let result = (binding.handler)(&invocation);
        self.finish(trace, result, position)
    }

    fn property(&self, object: &ObjectRef, name: &str) -> Option<PropertyBinding> {
        self.types
            .borrow()
            .get(object.type_handle().index())
            .and_then(|ty| ty.properties.get(name).cloned())
    }

    pub(crate) fn get_property(&self, object: &ObjectRef, name: &str) -> RhaiResult<Dynamic> {
        let handle = self
            .resolve(object)
            .map_err(|error| self.identity_violation(error, name))?;
        let getter = self
            .property(object, name)
            .and_then(|property| property.getter);
        let Some(getter) = getter else {
            trace!(session = %self.session, property = name, "no getter registered");
            return Err(EvalAltResult::ErrorPropertyNotFound(name.to_string(), Position::NONE).into());
        };
        getter(handle)
            .map(|value| bridge::encode(&value))
            .map_err(|error| throw(error, name, Position::NONE))
    }

    pub(crate) fn set_property(
        &self,
        object: &ObjectRef,
        name: &str,
        value: Dynamic,
    ) -> RhaiResult<()> {
        let handle = self
            .resolve(object)
            .map_err(|error| self.identity_violation(error, name))?;
        let setter = self
            .property(object, name)
            .and_then(|property| property.setter);
        let Some(setter) = setter else {
            trace!(session = %self.session, property = name, "no setter registered");
            return Err(EvalAltResult::ErrorPropertyNotFound(name.to_string(), Position::NONE).into());
        };
        let value = bridge::decode(&value)
            .map_err(|error| throw(HostError::from(error), name, Position::NONE))?;
        setter(handle, value).map_err(|error| throw(error, name, Position::NONE))
    }
}

pub(crate) fn overload_limit(binding: &FunctionBinding, max_call_args: usize) -> usize {
    binding.arity.map_or(max_call_args, |arity| arity.max(max_call_args))
}

#[allow(deprecated)]
pub(crate) fn install_free_function(
    engine: &mut Engine,
    state: &Rc<DispatchState>,
    token: FunctionToken,
    name: &str,
    max_args: usize,
) {
    for argc in 0..=max_args {
        let state = Rc::clone(state);
        engine.register_raw_fn(
            name.to_string(),
            vec![TypeId::of::<Dynamic>(); argc],
            move |context: NativeCallContext, args: &mut [&mut Dynamic]| {
                let caller = |function: &FnPtr, args: Vec<Dynamic>| {
                    function.call_within_context::<Dynamic>(&context, args)
                };
                let site = CallSite::new(context.fn_name(), context.position(), &caller);
                state.call_free(token, site, args)
            },
        );
    }
}

#[allow(deprecated)]
pub(crate) fn install_method(
    engine: &mut Engine,
    state: &Rc<DispatchState>,
    symbol: SymbolId,
    name: &str,
    min_args: usize,
    max_args: usize,
) {
    for argc in min_args..=max_args {
        let state = Rc::clone(state);
        let mut params = vec![TypeId::of::<ObjectRef>()];
        params.extend(std::iter::repeat(TypeId::of::<Dynamic>()).take(argc));
        engine.register_raw_fn(
            name.to_string(),
            params,
            move |context: NativeCallContext, args: &mut [&mut Dynamic]| {
                let caller = |function: &FnPtr, args: Vec<Dynamic>| {
                    function.call_within_context::<Dynamic>(&context, args)
                };
                let site = CallSite::new(context.fn_name(), context.position(), &caller);
                state.call_method(symbol, site, args)
            },
        );
    }
}

// `object.name` falls back to the string indexer when no accessor exists.
pub(crate) fn install_property_access(engine: &mut Engine, state: &Rc<DispatchState>) {
    let getter_state = Rc::clone(state);
    engine.register_indexer_get(
        move |object: &mut ObjectRef, name: ImmutableString| -> RhaiResult<Dynamic> {
            getter_state.get_property(object, name.as_str())
        },
    );
    let setter_state = Rc::clone(state);
    engine.register_indexer_set(
        move |object: &mut ObjectRef, name: ImmutableString, value: Dynamic| -> RhaiResult<()> {
            setter_state.set_property(object, name.as_str(), value)
        },
    );
}
