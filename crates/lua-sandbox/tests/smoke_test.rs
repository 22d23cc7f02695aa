//! Smoke tests for the lua-sandbox library.
//!
//! These exercise the sandbox as a host would: create, init, invoke,
//! terminate, across the lifecycle and quota properties the sandbox
//! controller is expected to uphold.
//!
//! Run with: `cargo test -p lua-sandbox --test smoke_test`

use lua_sandbox::{Metric, Resource, Sandbox, SandboxConfig, SandboxState};

fn config() -> SandboxConfig {
    SandboxConfig {
        output_limit: 1_048_576,
        memory_limit: 8_388_608,
        instruction_limit: 10_000_000,
        module_root: None,
        preservation_path: None,
    }
}

#[test]
fn scalar_output_round_trips_through_the_buffer() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    sandbox
        .init(r#"function process(n) output(n, " ", "ok") return 0 end"#)
        .unwrap();
    let outcome = sandbox.invoke(23).unwrap();
    assert_eq!(outcome.status, 0);
    assert_eq!(outcome.output, b"23 ok");
}

#[test]
fn table_output_is_json_with_trailing_newline() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    sandbox
        .init(r#"function process(n) output({value = n, representation = "B"}) return 0 end"#)
        .unwrap();
    let outcome = sandbox.invoke(42).unwrap();
    let text = String::from_utf8(outcome.output).unwrap();
    assert!(text.ends_with('\n'), "expected trailing newline, got {text:?}");
    assert!(text.contains(r#""value":42"#));
    assert!(text.contains(r#""representation":"B""#));
}

#[test]
fn memory_is_zeroed_on_terminate_but_maximum_survives() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    sandbox
        .init("function process(n) local t = {} for i=1,n do t[i]=i end return 0 end")
        .unwrap();
    sandbox.invoke(50_000).unwrap();
    let max = sandbox.usage(Resource::Memory, Metric::Maximum);
    assert!(max > 0);

    sandbox.terminate();
    assert_eq!(sandbox.usage(Resource::Memory, Metric::Current), 0);
    assert_eq!(sandbox.usage(Resource::Memory, Metric::Maximum), max);
    assert_eq!(sandbox.state(), SandboxState::Terminated);
}

#[test]
fn busy_loop_is_stopped_by_the_instruction_quota() {
    let mut sandbox = Sandbox::create(SandboxConfig {
        instruction_limit: 10_000,
        ..config()
    })
    .unwrap();
    sandbox
        .init("function process(n) local i = 0 while true do i = i + 1 end end")
        .unwrap();
    let outcome = sandbox.invoke(0).unwrap();
    assert_ne!(outcome.status, 0);
    assert_eq!(sandbox.state(), SandboxState::Terminated);
    assert!(sandbox.last_error().unwrap().contains("instruction_limit exceeded"));
}

#[test]
fn output_overflow_preserves_the_prefix_already_written() {
    let mut sandbox = Sandbox::create(SandboxConfig {
        output_limit: 64,
        ..config()
    })
    .unwrap();
    sandbox
        .init(r#"function process(n) for i = 1, 1000 do output("0123456789") end return 0 end"#)
        .unwrap();
    let outcome = sandbox.invoke(0).unwrap();
    assert_ne!(outcome.status, 0);
    assert!(outcome.output.len() <= 64);
    assert!(sandbox.last_error().unwrap().contains("output_limit exceeded"));
}

#[test]
fn require_of_an_unknown_name_without_a_module_root_is_disabled() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    let err = sandbox.init(r#"require("does_not_matter")"#).unwrap_err();
    assert!(err.to_string().contains("external modules are disabled"));
}

#[test]
fn external_module_loads_once_a_root_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("mod.lua"),
        "return { greet = function(name) return 'hi ' .. name end }",
    )
    .unwrap();

    let mut sandbox = Sandbox::create(SandboxConfig {
        module_root: Some(dir.path().to_path_buf()),
        ..config()
    })
    .unwrap();
    sandbox
        .init(
            r#"
            local mod = require("mod")
            function process(n)
                if mod.greet("world") == "hi world" then return 0 else return 1 end
            end
            "#,
        )
        .unwrap();
    let outcome = sandbox.invoke(0).unwrap();
    assert_eq!(outcome.status, 0);
}

#[test]
fn denied_os_symbol_is_nil_and_invoke_reports_nonzero_without_terminating() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    sandbox
        .init(
            r#"
            function process(n)
                local ok, err = pcall(function() return os.execute("echo hi") end)
                if ok then return 0 else return 9 end
            end
            "#,
        )
        .unwrap();
    let outcome = sandbox.invoke(0).unwrap();
    assert_eq!(outcome.status, 9);
    assert_eq!(sandbox.state(), SandboxState::Running);
}

#[test]
fn invalid_module_name_is_rejected_with_the_documented_prefix() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    let err = sandbox.init(r#"require("../etc/passwd")"#).unwrap_err();
    assert!(err.to_string().contains("invalid module name"));
}

#[test]
fn uncaught_guest_error_terminates_the_sandbox() {
    let mut sandbox = Sandbox::create(config()).unwrap();
    sandbox.init("function process(n) error('kaboom') end").unwrap();
    let outcome = sandbox.invoke(0).unwrap();
    assert_ne!(outcome.status, 0);
    assert_eq!(sandbox.state(), SandboxState::Terminated);
    assert!(sandbox.last_error().unwrap().contains("kaboom"));
}
