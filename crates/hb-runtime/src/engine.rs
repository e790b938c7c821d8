use std::cell::RefCell;
use std::rc::Rc;

use hb_core::{ObjectRef, SessionOptions};
use rhai::{Dynamic, Engine};
use tracing::{debug, info};

use crate::bridge::NullValue;
use crate::dispatch::HostException;

pub const SCRIPT_LOG_TARGET: &str = "hostbridge::script";

pub(crate) type PrintHandler = Box<dyn FnMut(&str)>;
pub(crate) type PrintSink = Rc<RefCell<Option<PrintHandler>>>;

pub(crate) fn build_engine(options: &SessionOptions, print: &PrintSink) -> Engine {
    let mut engine = Engine::new();

    engine.set_strict_variables(options.strict_variables);
    engine.set_max_operations(options.max_operations);
    engine.set_max_call_levels(options.max_call_levels);
    engine.set_max_expr_depths(options.max_expr_depth, options.max_function_expr_depth);
    engine.set_max_string_size(options.max_string_size);
    engine.set_max_array_size(options.max_array_size);
    engine.set_max_map_size(options.max_map_size);

    register_host_types(&mut engine);
    route_output(&mut engine, print);
    engine
}

fn register_host_types(engine: &mut Engine) {
    engine
        .register_type_with_name::<NullValue>("null")
        .register_fn("to_string", |_: &mut NullValue| "null".to_string())
        .register_fn("to_debug", |_: &mut NullValue| "null".to_string())
        .register_fn("is_null", |value: Dynamic| value.is::<NullValue>())
        .register_fn("is_undefined", |value: Dynamic| value.is_unit());

    engine
        .register_type_with_name::<ObjectRef>("HostObject")
        .register_fn("to_string", |object: &mut ObjectRef| {
            format!("[object {}]", object.type_name())
        })
        .register_fn("to_debug", |object: &mut ObjectRef| {
            format!("[object {} {}]", object.type_name(), object.id())
        })
        .register_fn("==", |left: &mut ObjectRef, right: ObjectRef| *left == right)
        .register_fn("!=", |left: &mut ObjectRef, right: ObjectRef| *left != right);

    engine
        .register_type_with_name::<HostException>("HostError")
        .register_get("message", |error: &mut HostException| error.message.clone())
        .register_get("code", |error: &mut HostException| error.code.clone())
        .register_get("function", |error: &mut HostException| error.function.clone())
        .register_fn("to_string", |error: &mut HostException| {
            format!("{}: {}", error.code, error.message)
        });
}

// `debug` always goes to the log; `print` only without a host handler.
fn route_output(engine: &mut Engine, print: &PrintSink) {
    let sink = Rc::clone(print);
    engine.on_print(move |text| match sink.borrow_mut().as_mut() {
        Some(handler) => handler(text),
        None => info!(target: SCRIPT_LOG_TARGET, "{}", text),
    });
    engine.on_debug(|text, source, position| {
        debug!(
            target: SCRIPT_LOG_TARGET,
            source = source.unwrap_or("<unknown>"),
            %position,
            "{}",
            text
        );
    });
}
