pub use hb_core::*;
pub use hb_runtime::{
    Args, CallPhase, FunctionBinding, FunctionKind, FunctionToken, HandlerResult, HostException,
    Invocation, NullValue, PropertyBinding, Script, Session, SCRIPT_LOG_TARGET,
};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct ObjectTypeBuilder {
    name: String,
    methods: Vec<FunctionBinding>,
    properties: Vec<PropertyBinding>,
}

impl ObjectTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Invocation<'_>) -> HandlerResult + 'static,
    ) -> Self {
        self.methods.push(FunctionBinding::method(name, handler));
        self
    }

    pub fn method_binding(mut self, binding: FunctionBinding) -> Self {
        self.methods.push(binding);
        self
    }

    pub fn property(mut self, property: PropertyBinding) -> Self {
        self.properties.push(property);
        self
    }

    pub fn getter(
        mut self,
        name: &str,
        getter: impl Fn(HostHandle) -> HandlerResult + 'static,
    ) -> Self {
        let property = self.take_property(name).with_getter(getter);
        self.properties.push(property);
        self
    }

    pub fn setter(
        mut self,
        name: &str,
        setter: impl Fn(HostHandle, ScriptValue) -> Result<(), HostError> + 'static,
    ) -> Self {
        let property = self.take_property(name).with_setter(setter);
        self.properties.push(property);
        self
    }

    fn take_property(&mut self, name: &str) -> PropertyBinding {
        match self.properties.iter().position(|property| property.name == name) {
            Some(index) => self.properties.remove(index),
            None => PropertyBinding::new(name),
        }
    }

    pub fn register(self, session: &mut Session) -> Result<TypeHandle, BridgeError> {
        session.register_object_type(&self.name, self.methods, self.properties)
    }
}

#[derive(Default)]
pub struct SessionBuilder {
    options: SessionOptions,
    functions: Vec<FunctionBinding>,
    object_types: Vec<ObjectTypeBuilder>,
    on_error: Option<Box<dyn FnMut(&ErrorReport)>>,
    on_print: Option<Box<dyn FnMut(&str)>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn function(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Invocation<'_>) -> HandlerResult + 'static,
    ) -> Self {
        self.functions.push(FunctionBinding::free(name, handler));
        self
    }

    pub fn function_binding(mut self, binding: FunctionBinding) -> Self {
        self.functions.push(binding);
        self
    }

    pub fn object_type(mut self, object_type: ObjectTypeBuilder) -> Self {
        self.object_types.push(object_type);
        self
    }

    pub fn on_error(mut self, reporter: impl FnMut(&ErrorReport) + 'static) -> Self {
        self.on_error = Some(Box::new(reporter));
        self
    }

    pub fn on_print(mut self, handler: impl FnMut(&str) + 'static) -> Self {
        self.on_print = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<Session, BridgeError> {
        let mut session = Session::new(self.options)?;
        let function_count = self.functions.len();
        let type_count = self.object_types.len();
        for object_type in self.object_types {
            object_type.register(&mut session)?;
        }
        for binding in self.functions {
            session.register_function(binding)?;
        }
        if let Some(reporter) = self.on_error {
            session.set_error_reporter(reporter);
        }
        if let Some(handler) = self.on_print {
            session.set_print_handler(handler);
        }
        debug!(
            session = %session.id(),
            functions = function_count,
            object_types = type_count,
            "session built"
        );
        Ok(session)
    }
}

pub fn eval(source: &str) -> Result<ScriptValue, ErrorReport> {
    let options = SessionOptions::default();
    let filename = options.eval_filename.clone();
    let mut session = Session::new(options).map_err(|error| {
        ErrorReport::new(ErrorKind::Internal, error.to_string(), filename).with_code(error.code())
    })?;
    let result = session.evaluate(source);
    session.close();
    result
}
