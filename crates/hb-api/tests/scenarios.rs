use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use hb_api::{
    ErrorKind, ErrorReport, FunctionBinding, HostError, HostHandle, ObjectRef,
    ObjectTypeBuilder, ScriptValue, Session, SessionBuilder, SessionOptions, ValueKind,
};

type Counters = Rc<RefCell<HashMap<HostHandle, ScriptValue>>>;

fn counter_type(counters: &Counters) -> ObjectTypeBuilder {
    let read = Rc::clone(counters);
    let write = Rc::clone(counters);
    let bump = Rc::clone(counters);
    ObjectTypeBuilder::new("Counter")
        .getter("value", move |handle| {
            Ok(read
                .borrow()
                .get(&handle)
                .cloned()
                .unwrap_or(ScriptValue::Undefined))
        })
        .setter("value", move |handle, value| {
            write.borrow_mut().insert(handle, value);
            Ok(())
        })
        .method_binding(
            FunctionBinding::method("inc", move |call| {
                let handle = call.handle()?;
                let step = call.arg::<i64>(0)?;
                let mut counters = bump.borrow_mut();
                let next = counters
                    .get(&handle)
                    .and_then(ScriptValue::as_int)
                    .unwrap_or(0)
                    + step;
                counters.insert(handle, ScriptValue::Int(next));
                Ok(ScriptValue::Int(next))
            })
            .with_arity(1),
        )
}

fn add_binding() -> FunctionBinding {
    FunctionBinding::free("add", |call| {
        Ok(ScriptValue::Int(call.arg::<i64>(0)? + call.arg::<i64>(1)?))
    })
    .with_arity(2)
}

fn counter_session() -> (Session, Counters) {
    let counters: Counters = Rc::new(RefCell::new(HashMap::new()));
    let session = SessionBuilder::new()
        .object_type(counter_type(&counters))
        .build()
        .expect("session should build");
    (session, counters)
}

#[test]
fn free_function_adds_arguments() {
    let mut session = SessionBuilder::new()
        .function_binding(add_binding())
        .build()
        .expect("session should build");
    let value = session.evaluate("add(2,3)").expect("add should succeed");
    assert_eq!(value, ScriptValue::Int(5));
}

#[test]
fn counter_property_round_trips_through_host_state() {
    let (mut session, counters) = counter_session();
    let counter = session.require_type("Counter").expect("registered");
    counters
        .borrow_mut()
        .insert(HostHandle::new(1), ScriptValue::Int(0));
    let c = session
        .new_instance(counter, HostHandle::new(1))
        .expect("instance");
    session.set_global("c", &c).expect("bind global");

    let value = session
        .evaluate("c.value = 5; c.value")
        .expect("property access should succeed");
    assert_eq!(value, ScriptValue::Int(5));
    assert_eq!(
        counters.borrow().get(&HostHandle::new(1)),
        Some(&ScriptValue::Int(5))
    );
}

#[test]
fn syntax_error_reports_eval_filename() {
    let mut session = Session::new(SessionOptions::default()).expect("session");
    let report = session.evaluate("1 +").expect_err("incomplete expression");
    assert_eq!(report.kind, ErrorKind::Parse);
    assert_eq!(report.filename, "Eval()");
    assert!(!report.message.is_empty());
}

#[test]
fn handler_error_is_catchable_by_message() {
    let mut session = SessionBuilder::new()
        .function("throwy", |_| Err(HostError::msg("boom")))
        .build()
        .expect("session should build");
    let value = session
        .evaluate(r#"let r = "no"; try { throwy(); } catch (e) { r = e.message; } r"#)
        .expect("error is caught inside the script");
    assert_eq!(value, ScriptValue::from("boom"));
}

#[test]
fn uncaught_handler_error_reaches_the_reporter() {
    let seen: Rc<RefCell<Vec<ErrorReport>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut session = SessionBuilder::new()
        .function("throwy", |_| Err(HostError::new("E_BOOM", "boom")))
        .on_error(move |report| sink.borrow_mut().push(report.clone()))
        .build()
        .expect("session should build");

    let report = session.evaluate("\nthrowy()").expect_err("not caught");
    assert_eq!(report.kind, ErrorKind::Host);
    assert_eq!(report.message, "boom");
    assert_eq!(report.code.as_deref(), Some("E_BOOM"));
    assert_eq!(report.line, 2);
    assert_eq!(*seen.borrow(), vec![report]);
}

#[test]
fn arity_mismatch_is_catchable() {
    let mut session = SessionBuilder::new()
        .function_binding(add_binding())
        .build()
        .expect("session should build");
    let value = session
        .evaluate(r#"let code = ""; try { add(1); } catch (e) { code = e.code; } code"#)
        .expect("mismatch is caught");
    assert_eq!(value, ScriptValue::from("BRIDGE_ARITY_MISMATCH"));

    let report = session.evaluate("add(1, 2, 3)").expect_err("too many");
    assert_eq!(report.code.as_deref(), Some("BRIDGE_ARITY_MISMATCH"));
}

#[test]
fn variadic_function_sees_exact_argument_count() {
    let mut session = SessionBuilder::new()
        .function("count", |call| Ok(ScriptValue::Int(call.argc() as i64)))
        .build()
        .expect("session should build");
    assert_eq!(session.evaluate("count()").expect("no args"), ScriptValue::Int(0));
    assert_eq!(
        session.evaluate(r#"count(1, "a", ())"#).expect("three args"),
        ScriptValue::Int(3)
    );
}

#[test]
fn argument_decode_failure_names_the_argument() {
    let mut session = SessionBuilder::new()
        .function_binding(add_binding())
        .build()
        .expect("session should build");
    let report = session.evaluate(r#"add("x", 1)"#).expect_err("string argument");
    assert_eq!(report.kind, ErrorKind::Host);
    assert_eq!(report.code.as_deref(), Some("BRIDGE_DECODE_ERROR"));
    assert_eq!(report.message, "cannot decode string as int (argument 0)");
}

#[test]
fn only_the_requested_getter_runs() {
    let x_calls = Rc::new(Cell::new(0));
    let y_calls = Rc::new(Cell::new(0));
    let (x_seen, y_seen) = (Rc::clone(&x_calls), Rc::clone(&y_calls));
    let mut session = SessionBuilder::new()
        .object_type(
            ObjectTypeBuilder::new("Point")
                .getter("x", move |_| {
                    x_seen.set(x_seen.get() + 1);
                    Ok(ScriptValue::Int(1))
                })
                .getter("y", move |_| {
                    y_seen.set(y_seen.get() + 1);
                    Ok(ScriptValue::Int(2))
                }),
        )
        .build()
        .expect("session should build");
    let point = session.require_type("Point").expect("registered");
    let p = session
        .new_instance(point, HostHandle::new(9))
        .expect("instance");
    session.set_global("p", &p).expect("bind global");

    assert_eq!(session.evaluate("p.x").expect("read x"), ScriptValue::Int(1));
    assert_eq!((x_calls.get(), y_calls.get()), (1, 0));

    let report = session.evaluate("p.z").expect_err("no such property");
    assert_eq!(report.kind, ErrorKind::Runtime);
    assert!(report.message.contains('z'));
    assert_eq!((x_calls.get(), y_calls.get()), (1, 0));

    let value = session
        .evaluate(r#"let r = 0; try { r = p.z; } catch { r = -1; } r"#)
        .expect("missing property is catchable");
    assert_eq!(value, ScriptValue::Int(-1));
}

#[test]
fn methods_receive_the_bound_handle() {
    let (mut session, _) = counter_session();
    let counter = session.require_type("Counter").expect("registered");
    let c = session
        .new_instance(counter, HostHandle::new(4))
        .expect("instance");
    session.set_global("c", &c).expect("bind global");
    let value = session
        .evaluate("c.inc(2); c.inc(3)")
        .expect("method calls");
    assert_eq!(value, ScriptValue::Int(5));
}

#[test]
fn script_objects_resolve_to_their_host_handle() {
    let (mut session, _) = counter_session();
    let counter = session.require_type("Counter").expect("registered");
    let c = session
        .new_instance(counter, HostHandle::new(77))
        .expect("instance");
    session.set_global("c", &c).expect("bind global");

    let returned = session.evaluate("let d = c; d").expect("object comes back");
    assert_eq!(returned, c);
    assert_eq!(session.resolve(&returned), Ok(HostHandle::new(77)));
    assert_eq!(
        session.evaluate("c == d").expect("compare"),
        ScriptValue::Bool(true)
    );
    assert!(session.resolve(&ScriptValue::Int(1)).is_err());
}

#[test]
fn handlers_can_construct_objects_mid_call() {
    let counters: Counters = Rc::new(RefCell::new(HashMap::new()));
    let mut session = SessionBuilder::new()
        .object_type(counter_type(&counters))
        .build()
        .expect("session should build");
    let counter = session.require_type("Counter").expect("registered");
    let next_handle = Rc::new(Cell::new(100));
    session
        .register_function(FunctionBinding::free("make_counter", move |call| {
            let handle = HostHandle::new(next_handle.get());
            next_handle.set(next_handle.get() + 1);
            call.new_instance(counter, handle)
        }))
        .expect("register factory");

    let value = session
        .evaluate("let a = make_counter(); let b = make_counter(); a.value = 3; b.value = 4; a.value * 10 + b.value")
        .expect("factory objects work");
    assert_eq!(value, ScriptValue::Int(34));
    assert_eq!(session.live_objects(), 2);

    session
        .evaluate("{ let t = make_counter(); t.value = 1; } ()")
        .expect("temporary object");
    assert_eq!(session.live_objects(), 2);
}

#[test]
fn foreign_objects_are_an_internal_error() {
    let (mut first, _) = counter_session();
    let (mut second, _) = counter_session();
    let counter = first.require_type("Counter").expect("registered");
    let object = first
        .new_instance(counter, HostHandle::new(1))
        .expect("instance");
    second.set_global("c", &object).expect("bind global");

    let report = second.evaluate("c.value").expect_err("identity violation");
    assert_eq!(report.kind, ErrorKind::Internal);

    let report = second
        .evaluate("try { c.value } catch { 0 }")
        .expect_err("identity violations cannot be caught");
    assert_eq!(report.kind, ErrorKind::Internal);
    assert!(second.resolve(&object).is_err());
}

#[test]
fn look_alike_objects_never_reach_a_handler() {
    let reads = Rc::new(Cell::new(0));
    let (secret_reads, other_reads) = (Rc::clone(&reads), Rc::clone(&reads));
    let mut session = SessionBuilder::new()
        .object_type(ObjectTypeBuilder::new("Secret").getter("v", move |_| {
            secret_reads.set(secret_reads.get() + 1);
            Ok(ScriptValue::from("secret"))
        }))
        .object_type(ObjectTypeBuilder::new("Other").getter("v", move |handle| {
            other_reads.set(other_reads.get() + 1);
            Ok(ScriptValue::Int(handle.raw() as i64))
        }))
        .build()
        .expect("session should build");
    let secret = session.require_type("Secret").expect("registered");
    let other = session.require_type("Other").expect("registered");
    let real = session
        .new_instance(secret, HostHandle::new(1234))
        .expect("instance");
    let id = real.as_object().expect("object").id();
    let forged = ScriptValue::Object(ObjectRef::new(session.id(), id, other, "Other"));
    session.set_global("f", &forged).expect("bind global");

    let report = session.evaluate("f.v").expect_err("not issued by the session");
    assert_eq!(report.kind, ErrorKind::Internal);
    assert_eq!(reads.get(), 0);
    assert!(session.resolve(&forged).is_err());

    session.set_global("s", &real).expect("bind global");
    assert_eq!(
        session.evaluate("s.v").expect("real object still works"),
        ScriptValue::from("secret")
    );
    assert_eq!(reads.get(), 1);
}

#[test]
fn property_handler_errors_carry_message_and_code() {
    let seen: Rc<RefCell<Vec<ErrorReport>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut session = SessionBuilder::new()
        .object_type(
            ObjectTypeBuilder::new("Sensor")
                .getter("reading", |_| Err(HostError::new("E_SENSOR", "sensor offline")))
                .setter("reading", |_, _| Err(HostError::new("E_READONLY", "reading is fixed"))),
        )
        .on_error(move |report| sink.borrow_mut().push(report.clone()))
        .build()
        .expect("session should build");
    let sensor = session.require_type("Sensor").expect("registered");
    let s = session
        .new_instance(sensor, HostHandle::new(7))
        .expect("instance");
    session.set_global("s", &s).expect("bind global");

    let report = session.evaluate("s.reading").expect_err("getter fails");
    assert_eq!(report.kind, ErrorKind::Host);
    assert_eq!(report.message, "sensor offline");
    assert_eq!(report.code.as_deref(), Some("E_SENSOR"));

    let report = session.evaluate("s.reading = 1;").expect_err("setter fails");
    assert_eq!(report.kind, ErrorKind::Host);
    assert_eq!(report.message, "reading is fixed");
    assert_eq!(report.code.as_deref(), Some("E_READONLY"));
    assert_eq!(seen.borrow().len(), 2);

    let value = session
        .evaluate(r#"let r = "no"; try { s.reading; } catch (e) { r = e.message; } r"#)
        .expect("getter error is caught inside the script");
    assert_eq!(value, ScriptValue::from("sensor offline"));
    let value = session
        .evaluate(r#"let r = "no"; try { s.reading = 2; } catch (e) { r = e.code; } r"#)
        .expect("setter error is caught inside the script");
    assert_eq!(value, ScriptValue::from("E_READONLY"));
}

#[test]
fn evaluated_closures_are_callable_from_the_host() {
    let mut session = Session::new(SessionOptions::default()).expect("session");
    let add_k = session
        .evaluate("let k = 10; |x| x + k")
        .expect("closure is returned");
    assert_eq!(add_k.kind(), ValueKind::Function);
    assert_eq!(
        session
            .call_value(&add_k, &[ScriptValue::Int(5)])
            .expect("closure call"),
        ScriptValue::Int(15)
    );
}

#[test]
fn handlers_call_script_callbacks() {
    let mut session = SessionBuilder::new()
        .function("apply", |call| {
            let function = call.args().value(0)?;
            let argument = call.args().value(1)?;
            call.call(&function, &[argument])
        })
        .function_binding(add_binding())
        .function("throwy", |_| Err(HostError::new("E_BOOM", "boom")))
        .build()
        .expect("session should build");

    assert_eq!(
        session.evaluate("apply(|v| v * 3, 4)").expect("callback"),
        ScriptValue::Int(12)
    );
    assert_eq!(
        session
            .evaluate("apply(|v| add(v, 1), 4)")
            .expect("callback reenters the host"),
        ScriptValue::Int(5)
    );
    let value = session
        .evaluate(r#"let r = "no"; try { apply(|v| throwy(), 1); } catch (e) { r = e.code; } r"#)
        .expect("callback failure is caught inside the script");
    assert_eq!(value, ScriptValue::from("E_BOOM"));

    let report = session
        .evaluate("apply(42, 1)")
        .expect_err("not a function");
    assert_eq!(report.kind, ErrorKind::Host);
    assert_eq!(report.code.as_deref(), Some("BRIDGE_DECODE_ERROR"));
}

#[test]
fn operation_limit_stops_runaway_scripts() {
    let options = SessionOptions {
        max_operations: 1_000,
        ..SessionOptions::default()
    };
    let mut session = Session::new(options).expect("session");
    let report = session.evaluate("loop { }").expect_err("runs forever");
    assert_eq!(report.kind, ErrorKind::Limit);
    assert_eq!(
        session.evaluate("40 + 2").expect("session still usable"),
        ScriptValue::Int(42)
    );
}

#[test]
fn compiled_scripts_keep_their_filename() {
    let mut session = Session::new(SessionOptions::default()).expect("session");
    let script = session
        .compile("fn twice(x) { x * 2 } twice(21)", "calc.rhai")
        .expect("compiles");
    assert_eq!(script.filename(), "calc.rhai");
    assert_eq!(session.execute(&script).expect("runs"), ScriptValue::Int(42));
    assert_eq!(
        session
            .call_function("twice", &[ScriptValue::Int(5)])
            .expect("defined by the script"),
        ScriptValue::Int(10)
    );

    let report = session
        .evaluate_named("1 +", "broken.rhai")
        .expect_err("syntax error");
    assert_eq!(report.filename, "broken.rhai");
}

#[test]
fn options_load_from_json() {
    let options = SessionOptions::from_json_str(r#"{"evalFilename": "repl", "maxOperations": 500}"#)
        .expect("valid options");
    let mut session = Session::new(options).expect("session");
    let report = session.evaluate("1 +").expect_err("syntax error");
    assert_eq!(report.filename, "repl");

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["kind"], "parse");
    assert_eq!(json["filename"], "repl");
}

#[test]
fn print_reaches_the_host_handler() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&lines);
    let mut session = SessionBuilder::new()
        .on_print(move |text| sink.borrow_mut().push(text.to_string()))
        .build()
        .expect("session should build");
    session.evaluate(r#"print("hello")"#).expect("print");
    assert_eq!(*lines.borrow(), vec!["hello".to_string()]);
}

#[test]
fn null_and_undefined_stay_distinct() {
    let mut session = SessionBuilder::new()
        .function("nothing", |_| Ok(ScriptValue::Null))
        .build()
        .expect("session should build");
    assert_eq!(session.evaluate("nothing()").expect("null"), ScriptValue::Null);
    assert_eq!(session.evaluate("()").expect("unit"), ScriptValue::Undefined);
    assert_eq!(
        session.evaluate("is_null(nothing())").expect("predicate"),
        ScriptValue::Bool(true)
    );
}
