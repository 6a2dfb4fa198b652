#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::json;

use trustgate_gateway::script::{decode_script_text, ScriptEnv, ScriptLimits, ScriptRuntime, ScriptValue};

#[test]
fn last_line_is_the_result() {
    let rt = ScriptRuntime::default();
    let script = rt.compile("sum", "local a = 2\nlocal b = 3\na + b").unwrap();
    let out = rt.execute(&script, &ScriptEnv::new()).unwrap();
    assert_eq!(out, ScriptValue::Integer(5));
    assert!(script.source().ends_with("return a + b"));
}

#[test]
fn explicit_return_is_kept() {
    let rt = ScriptRuntime::default();
    let script = rt.compile("ret", "return 1.5").unwrap();
    assert_eq!(rt.execute(&script, &ScriptEnv::new()).unwrap(), ScriptValue::Number(1.5));
}

#[test]
fn globals_do_not_leak_between_executions() {
    let rt = ScriptRuntime::default();
    let writer = rt.compile("writer", "leaked = 42\nleaked").unwrap();
    let reader = rt.compile("reader", "leaked").unwrap();

    assert_eq!(rt.execute(&writer, &ScriptEnv::new()).unwrap(), ScriptValue::Integer(42));
    assert_eq!(rt.execute(&reader, &ScriptEnv::new()).unwrap(), ScriptValue::Nil);
}

#[test]
fn back_to_back_environments_are_isolated() {
    let rt = ScriptRuntime::default();
    let script = rt.compile("isolation", "x ~= nil and y == nil").unwrap();

    let first = ScriptEnv::new().bind("x", json!(1)).bind("y", json!(2));
    let second = ScriptEnv::new().bind("x", json!(1));

    assert_eq!(rt.execute(&script, &first).unwrap(), ScriptValue::Boolean(false));
    assert_eq!(rt.execute(&script, &second).unwrap(), ScriptValue::Boolean(true));
}

#[test]
fn untrusted_names_are_filtered_and_cannot_shadow_builtins() {
    let mut env = ScriptEnv::new();
    assert!(env.bind_untrusted("device_trust", json!(0.8)));
    assert!(!env.bind_untrusted("9lives", json!(1)));
    assert!(!env.bind_untrusted("has-dash", json!(1)));
    assert!(env.bind_untrusted("math", json!(1)));

    let rt = ScriptRuntime::default();
    let script = rt.compile("builtin", "math.floor(device_trust * 10)").unwrap();
    assert_eq!(rt.execute(&script, &env).unwrap(), ScriptValue::Integer(8));
}

#[test]
fn sandbox_has_no_os_or_io() {
    let rt = ScriptRuntime::default();
    let script = rt.compile("escape", "os == nil and io == nil and require == nil").unwrap();
    assert_eq!(rt.execute(&script, &ScriptEnv::new()).unwrap(), ScriptValue::Boolean(true));
}

#[test]
fn compile_error_is_reported() {
    let rt = ScriptRuntime::default();
    let err = rt.compile("broken", "local = = 1").unwrap_err();
    assert_eq!(err.client_code().as_str(), "SCRIPT");
}

#[test]
fn runtime_error_is_caught() {
    let rt = ScriptRuntime::default();
    let script = rt.compile("boom", "error('boom')").unwrap();
    assert!(rt.execute(&script, &ScriptEnv::new()).is_err());

    // the runtime stays usable afterwards
    let ok = rt.compile("ok", "true").unwrap();
    assert_eq!(rt.execute(&ok, &ScriptEnv::new()).unwrap(), ScriptValue::Boolean(true));
}

#[test]
fn runaway_script_is_stopped() {
    let rt = ScriptRuntime::new(ScriptLimits {
        memory_limit_bytes: 0,
        max_instructions: 10_000,
    });
    let spin = rt.compile("spin", "while true do end").unwrap();
    let err = rt.execute(&spin, &ScriptEnv::new()).unwrap_err();
    assert!(err.to_string().contains("instruction budget exhausted"), "{err}");

    let counted = rt
        .compile("counted", "local i = 0\nwhile true do i = i + 1 end\nreturn i")
        .unwrap();
    assert!(rt.execute(&counted, &ScriptEnv::new()).is_err());
}

#[test]
fn statement_on_last_line_compiles_as_written() {
    let rt = ScriptRuntime::default();
    let script = rt
        .compile("branch", "local t = {}\nif true then t.x = 1 end")
        .unwrap();
    assert!(script.source().ends_with("if true then t.x = 1 end"));
    assert_eq!(rt.execute(&script, &ScriptEnv::new()).unwrap(), ScriptValue::Nil);

    let script = rt.compile("assign", "y = 2").unwrap();
    assert_eq!(script.source(), "y = 2");
}

#[test]
fn truthiness_and_float_conversion() {
    assert!(!ScriptValue::Nil.truthy());
    assert!(!ScriptValue::Boolean(false).truthy());
    assert!(!ScriptValue::Integer(0).truthy());
    assert!(!ScriptValue::String(String::new()).truthy());
    assert!(ScriptValue::Number(0.1).truthy());
    assert!(ScriptValue::Opaque("table").truthy());

    assert_eq!(ScriptValue::Boolean(true).to_f64().unwrap(), 1.0);
    assert_eq!(ScriptValue::String(" 0.25 ".into()).to_f64().unwrap(), 0.25);
    assert!(ScriptValue::String("high".into()).to_f64().is_err());
    assert!(ScriptValue::Opaque("table").to_f64().is_err());
}

#[test]
fn base64_script_text_is_unwrapped() {
    // "device_trust * 0.5"
    let decoded = decode_script_text("##ZGV2aWNlX3RydXN0ICogMC41").unwrap();
    assert_eq!(decoded, "device_trust * 0.5");
    assert_eq!(decode_script_text("  x + 1 \n").unwrap(), "x + 1");
    assert!(decode_script_text("##not base64!").is_err());
}

#[test]
fn renamed_script_reports_its_own_name() {
    let rt = ScriptRuntime::default();
    let first = rt.compile("tscp1:risk", "error('boom')").unwrap();
    let second = rt.rename(&first, "tscp2:risk");

    assert_eq!(first.name(), "tscp1:risk");
    assert_eq!(second.source(), first.source());
    let err = rt.execute(&second, &ScriptEnv::new()).unwrap_err();
    assert!(err.to_string().contains("tscp2:risk"), "{err}");
}
