//! End-to-end scenarios and universal properties (spec §8), driven entirely
//! through the host-facing `Runtime`/`Script` API rather than `vm.rs`'s own
//! unit tests, which exercise the interpreter's internals directly.

use std::rc::Rc;

use jinx_core::value::Value;
use jinx_runtime::{EngineConfig, Runtime};

struct NoContext;

fn run(source: &str) -> jinx_runtime::Script {
    let rt = Runtime::new(EngineConfig::new());
    let bytecode = rt.compile(source, "t", &[]).expect("compile");
    let mut script = rt.create_script(&bytecode, Rc::new(NoContext)).expect("create_script");
    while !script.is_finished() {
        if !script.execute() {
            break;
        }
    }
    script
}

/// Scenario A: assignment and read-back.
#[test]
fn scenario_a_assignment_and_read_back() {
    let script = run("set a to 123\nset b to a\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("b"), Some(&Value::Integer(123)));
}

/// Scenario B: short-circuit AND — the right operand's `increment` must
/// never run when the left operand is already false.
#[test]
fn scenario_b_short_circuit_and_skips_right_operand() {
    let script = run(
        "set x to 0\nif false and increment x by 1 > 0\n    set x to 99\nend\n",
    );
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("x"), Some(&Value::Integer(0)));
}

/// Scenario C: counter loop with step.
#[test]
fn scenario_c_counter_loop_with_step() {
    let script = run("set total to 0\nloop i from 1 to 5\n    increment total by i\nend\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("total"), Some(&Value::Integer(15)));
}

/// Scenario D: iterator loop over a keyed collection, in key order.
#[test]
fn scenario_d_iterator_loop_over_keyed_collection() {
    let script = run(
        "set c to [1, \"a\", 2, \"b\", 3, \"c\"]\nset s to \"\"\nloop it over c\n    set s to s + (it's value)\nend\n",
    );
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("s"), Some(&Value::String("abc".to_string())));
}

/// Scenario E: a coroutine's return value, read back once finished.
#[test]
fn scenario_e_coroutine_return_value() {
    let script = run(
        "function compute\n    return 7 + 8\nend\nset co to async call compute\nwait until co is finished\nset r to co's value\n",
    );
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("r"), Some(&Value::Integer(15)));
}

/// Scenario F: division promotes to Number only when the result isn't exact.
#[test]
fn scenario_f_division_promotes_to_number_when_inexact() {
    let script = run("set a to 7 / 2\nset b to 8 / 2\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("a"), Some(&Value::Number(3.5)));
    assert_eq!(script.get_variable("b"), Some(&Value::Integer(4)));
}

/// A counter loop with a zero step can never make progress; spec §7 lists
/// it as an Arithmetic error rather than an infinite loop.
#[test]
fn counter_loop_with_zero_step_is_an_arithmetic_error() {
    use jinx_core::error::JinxError;

    let script = run("loop i from 1 to 5 by 0\nend\n");
    assert!(matches!(script.error(), Some(JinxError::Arithmetic { .. })));
}

/// Universal property 1: compile output is stable under whitespace and
/// blank-line insertion that doesn't split a token.
#[test]
fn property_compile_is_stable_under_whitespace_variation() {
    let rt = Runtime::new(EngineConfig::new());
    let tight = rt.compile("set a to 1\nset b to a\n", "t", &[]).unwrap();
    let loose = rt
        .compile("set   a   to   1\n\n\nset b    to    a\n", "t", &[])
        .unwrap();
    assert_eq!(tight, loose);
}

/// Universal property 2: stripping debug info doesn't change execution.
#[test]
fn property_strip_debug_info_preserves_execution() {
    let rt = Runtime::new(EngineConfig::new().with_debug_info(true));
    let bytecode = rt.compile("set a to 1\nset b to a + 1\n", "t", &[]).unwrap();
    let stripped = rt.strip_debug_info(&bytecode).unwrap();
    assert!(stripped.len() < bytecode.len());

    let mut with_debug = rt.create_script(&bytecode, Rc::new(NoContext)).unwrap();
    let mut without_debug = rt.create_script(&stripped, Rc::new(NoContext)).unwrap();
    while !with_debug.is_finished() {
        if !with_debug.execute() {
            break;
        }
    }
    while !without_debug.is_finished() {
        if !without_debug.execute() {
            break;
        }
    }
    assert_eq!(with_debug.get_variable("b"), without_debug.get_variable("b"));
    assert_eq!(with_debug.get_variable("b"), Some(&Value::Integer(2)));
}

/// Universal property 4: case folding is idempotent for identifier lookup —
/// a variable declared as `MyVar` is readable back as `myvar`, `MYVAR`, or
/// any other casing, since all three fold to the same id.
#[test]
fn property_identifier_lookup_is_case_fold_invariant() {
    let script = run("set MyVar to 7\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("myvar"), Some(&Value::Integer(7)));
    assert_eq!(script.get_variable("MYVAR"), Some(&Value::Integer(7)));
    assert_eq!(script.get_variable("MyVar"), Some(&Value::Integer(7)));
}

/// Universal property 6: scope integrity — a variable declared inside a
/// `begin...end` block is gone once the block ends.
#[test]
fn property_scope_end_forgets_block_local_bindings() {
    let script = run("set outer to 1\nbegin\n    set inner to 2\nend\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("outer"), Some(&Value::Integer(1)));
    assert_eq!(script.get_variable("inner"), None);
}

/// Universal property 7: frame integrity — a function's local variables
/// never leak into the caller's scope after it returns.
#[test]
fn property_function_locals_do_not_leak_to_caller() {
    let script = run(
        "function add_one {n}\n    set doubled to n + n\n    return n + 1\nend\nset result to add_one 4\n",
    );
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());
    assert_eq!(script.get_variable("result"), Some(&Value::Integer(5)));
    assert_eq!(script.get_variable("doubled"), None);
}

/// Universal property 8: at-most-once return capture — reading a finished
/// coroutine's value repeatedly never re-drives (or re-returns a different
/// value from) the underlying child script.
#[test]
fn property_coroutine_value_is_stable_after_finish() {
    use jinx_core::value::CoroutineObject;

    let mut script = run("function compute\n    return 7 + 8\nend\n");
    assert!(script.error().is_none(), "unexpected error: {:?}", script.error());

    let id = jinx_runtime::Script::find_function("", "compute").unwrap();
    let co = script.call_async_function(id, vec![]).unwrap();
    assert!(co.is_finished());
    let first = co.value();
    let second = co.value();
    assert_eq!(first, second);
    assert_eq!(first, Some(Value::Integer(15)));
}
