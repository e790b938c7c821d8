use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::OnceLock;

use hb_core::{
    BridgeError, DecodeError, ErrorReport, HostHandle, NotFoundKind, ScriptValue, SessionId,
    SessionOptions, TypeHandle, ValueKind,
};
use regex::Regex;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Scope, AST};
use tracing::{debug, trace, warn};

use crate::binding::{FunctionBinding, FunctionKind, PropertyBinding};
use crate::bridge;
use crate::dispatch::{self, DispatchState, FunctionToken, SymbolId};
use crate::engine::{self, PrintSink};
use crate::report::{report_from_decode, report_from_eval, report_from_parse};

/// Wildcard parameters resolve for at most this many arguments.
const MAX_DECLARED_ARITY: usize = 16;

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
}

type ErrorReporter = Box<dyn FnMut(&ErrorReport)>;

#[derive(Debug, Clone)]
pub struct Script {
    ast: AST,
    filename: String,
}

impl Script {
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

struct InstalledMethod {
    symbol: SymbolId,
    max_args: usize,
}

pub struct Session {
    id: SessionId,
    options: SessionOptions,
    engine: Engine,
    scope: Scope<'static>,
    library: AST,
    state: Rc<DispatchState>,
    print: PrintSink,
    reporter: Option<ErrorReporter>,
    methods: HashMap<String, InstalledMethod>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Result<Self, BridgeError> {
        options.validate()?;

        let id = SessionId::next();
        let state = Rc::new(DispatchState::new(id));
        let print: PrintSink = Rc::new(RefCell::new(None));
        let mut engine = engine::build_engine(&options, &print);
        dispatch::install_property_access(&mut engine, &state);

        debug!(session = %id, filename = %options.eval_filename, "session opened");
        Ok(Self {
            id,
            options,
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            state,
            print,
            reporter: None,
            methods: HashMap::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn set_error_reporter(&mut self, reporter: impl FnMut(&ErrorReport) + 'static) {
        self.reporter = Some(Box::new(reporter));
    }

    pub fn set_print_handler(&mut self, handler: impl FnMut(&str) + 'static) {
        *self.print.borrow_mut() = Some(Box::new(handler));
    }

    fn check_name(what: &str, name: &str) -> Result<(), BridgeError> {
        if identifier_regex().is_match(name) {
            Ok(())
        } else {
            Err(BridgeError::Registration(format!(
                "{} name \"{}\" is not a valid identifier",
                what, name
            )))
        }
    }

    fn check_arity(binding: &FunctionBinding) -> Result<(), BridgeError> {
        match binding.arity {
            Some(arity) if arity > MAX_DECLARED_ARITY => Err(BridgeError::Registration(format!(
                "\"{}\" declares {} parameters; at most {} are supported",
                binding.name, arity, MAX_DECLARED_ARITY
            ))),
            _ => Ok(()),
        }
    }

    pub fn register_function(
        &mut self,
        binding: FunctionBinding,
    ) -> Result<FunctionToken, BridgeError> {
        if binding.kind != FunctionKind::Free {
            return Err(BridgeError::Registration(format!(
                "\"{}\" is a method binding; register it with an object type",
                binding.name
            )));
        }
        Self::check_name("function", &binding.name)?;
        Self::check_arity(&binding)?;
        if self.state.has_function(&binding.name) {
            return Err(BridgeError::Registration(format!(
                "function \"{}\" is already registered",
                binding.name
            )));
        }
        if self.methods.contains_key(&binding.name) {
            return Err(BridgeError::Registration(format!(
                "function \"{}\" clashes with a method of the same name",
                binding.name
            )));
        }

        let name = binding.name.clone();
        let max_args = dispatch::overload_limit(&binding, self.options.max_call_args);
        let arity = binding.arity;
        let token = self.state.add_function(binding);
        dispatch::install_free_function(&mut self.engine, &self.state, token, &name, max_args);
        debug!(session = %self.id, function = %name, ?arity, "registered function");
        Ok(token)
    }

    pub fn register_object_type(
        &mut self,
        name: &str,
        methods: Vec<FunctionBinding>,
        properties: Vec<PropertyBinding>,
    ) -> Result<TypeHandle, BridgeError> {
        Self::check_name("object type", name)?;
        if self.state.type_handle(name).is_some() {
            return Err(BridgeError::Registration(format!(
                "object type \"{}\" is already registered",
                name
            )));
        }

        let mut seen = HashSet::new();
        for method in &methods {
            if method.kind != FunctionKind::Method {
                return Err(BridgeError::Registration(format!(
                    "\"{}\" on {} is a free function binding",
                    method.name, name
                )));
            }
            Self::check_name("method", &method.name)?;
            Self::check_arity(method)?;
            if !seen.insert(method.name.as_str()) {
                return Err(BridgeError::Registration(format!(
                    "method \"{}\" appears twice on {}",
                    method.name, name
                )));
            }
            if self.state.has_function(&method.name) {
                return Err(BridgeError::Registration(format!(
                    "method \"{}\" on {} clashes with a function of the same name",
                    method.name, name
                )));
            }
        }

        let mut seen = HashSet::new();
        for property in &properties {
            Self::check_name("property", &property.name)?;
            if property.is_empty() {
                return Err(BridgeError::Registration(format!(
                    "property \"{}\" on {} has neither getter nor setter",
                    property.name, name
                )));
            }
            if !seen.insert(property.name.as_str()) {
                return Err(BridgeError::Registration(format!(
                    "property \"{}\" appears twice on {}",
                    property.name, name
                )));
            }
        }

        let mut table = Vec::with_capacity(methods.len());
        for method in methods {
            let symbol = self.install_method(&method);
            table.push((symbol, method));
        }
        let property_count = properties.len();
        let handle = self.state.add_type(name, table, properties);
        debug!(
            session = %self.id,
            object_type = name,
            properties = property_count,
            "registered object type"
        );
        Ok(handle)
    }

    fn install_method(&mut self, method: &FunctionBinding) -> SymbolId {
        let wanted = dispatch::overload_limit(method, self.options.max_call_args);
        let (symbol, installed_from) = match self.methods.get(&method.name) {
            Some(installed) if installed.max_args >= wanted => return installed.symbol,
            Some(installed) => (installed.symbol, installed.max_args + 1),
            None => (self.state.intern(&method.name).0, 0),
        };
        dispatch::install_method(
            &mut self.engine,
            &self.state,
            symbol,
            &method.name,
            installed_from,
            wanted,
        );
        self.methods.insert(
            method.name.clone(),
            InstalledMethod {
                symbol,
                max_args: wanted,
            },
        );
        symbol
    }

    pub fn type_handle(&self, name: &str) -> Option<TypeHandle> {
        self.state.type_handle(name)
    }

    pub fn require_type(&self, name: &str) -> Result<TypeHandle, BridgeError> {
        self.type_handle(name)
            .ok_or_else(|| BridgeError::not_found(NotFoundKind::ObjectType, name))
    }

    pub fn new_instance(
        &mut self,
        type_handle: TypeHandle,
        handle: HostHandle,
    ) -> Result<ScriptValue, BridgeError> {
        self.state
            .new_instance(type_handle, handle)
            .map(ScriptValue::Object)
    }

    pub fn resolve(&self, value: &ScriptValue) -> Result<HostHandle, BridgeError> {
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::new(ValueKind::Object, value.type_name()))?;
        Ok(self.state.resolve(object)?)
    }

    pub fn live_objects(&self) -> usize {
        self.state.live_objects()
    }

    pub fn set_global(&mut self, name: &str, value: &ScriptValue) -> Result<(), BridgeError> {
        Self::check_name("global", name)?;
        self.scope.set_value(name.to_string(), bridge::encode(value));
        Ok(())
    }

    pub fn global(&self, name: &str) -> Result<Option<ScriptValue>, BridgeError> {
        match self.scope.get(name) {
            Some(value) => Ok(Some(bridge::decode(value)?)),
            None => Ok(None),
        }
    }

    pub fn evaluate(&mut self, source: &str) -> Result<ScriptValue, ErrorReport> {
        let filename = self.options.eval_filename.clone();
        self.evaluate_named(source, &filename)
    }

    pub fn evaluate_named(
        &mut self,
        source: &str,
        filename: &str,
    ) -> Result<ScriptValue, ErrorReport> {
        let script = self.compile(source, filename)?;
        self.execute(&script)
    }

    pub fn compile(&mut self, source: &str, filename: &str) -> Result<Script, ErrorReport> {
        match self.engine.compile_with_scope(&self.scope, source) {
            Ok(mut ast) => {
                ast.set_source(filename);
                Ok(Script {
                    ast,
                    filename: filename.to_string(),
                })
            }
            Err(error) => Err(self.fail(report_from_parse(&error, filename))),
        }
    }

    pub fn execute(&mut self, script: &Script) -> Result<ScriptValue, ErrorReport> {
        let mut ast = self.library.merge(&script.ast);
        ast.set_source(script.filename.as_str());
        trace!(session = %self.id, filename = %script.filename, "evaluating");
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast);
        self.library = self.library.merge(&script.ast.clone_functions_only());
        self.finish(result, &script.filename)
    }

    pub fn call_function(
        &mut self,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ErrorReport> {
        let args: Vec<Dynamic> = args.iter().map(bridge::encode).collect();
        let filename = self.options.eval_filename.clone();
        trace!(session = %self.id, function = name, "calling script function");
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut self.scope, &self.library, name, args);
        self.finish(result, &filename)
    }

    pub fn call_value(
        &mut self,
        function: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ErrorReport> {
        let filename = self.options.eval_filename.clone();
        let pointer = match function.as_function().and_then(|f| f.downcast::<FnPtr>()) {
            Some(pointer) => pointer.clone(),
            None => {
                let error = DecodeError::new(ValueKind::Function, function.type_name());
                return Err(self.fail(report_from_decode(&error, &filename)));
            }
        };
        let args: Vec<Dynamic> = args.iter().map(bridge::encode).collect();
        trace!(session = %self.id, function = pointer.fn_name(), "calling function value");
        let result = pointer.call::<Dynamic>(&self.engine, &self.library, args);
        self.finish(result, &filename)
    }

    fn finish(
        &mut self,
        result: Result<Dynamic, Box<EvalAltResult>>,
        filename: &str,
    ) -> Result<ScriptValue, ErrorReport> {
        let released = self.state.prune();
        if released > 0 {
            trace!(session = %self.id, released, "pruned released objects");
        }
        match result {
            Ok(value) => bridge::decode(&value)
                .map_err(|error| self.fail(report_from_decode(&error, filename))),
            Err(error) => Err(self.fail(report_from_eval(error, filename))),
        }
    }

    fn fail(&mut self, report: ErrorReport) -> ErrorReport {
        warn!(
            session = %self.id,
            kind = ?report.kind,
            filename = %report.filename,
            line = report.line,
            message = %report.message,
            "evaluation failed"
        );
        if let Some(reporter) = self.reporter.as_mut() {
            reporter(&report);
        }
        report
    }

    /// Tears the session down. Objects still held by the host stop resolving.
    pub fn close(mut self) {
        let live = self.state.live_objects();
        self.state.clear();
        self.scope.clear();
        self.library.clear_functions();
        debug!(session = %self.id, live_objects = live, "session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
