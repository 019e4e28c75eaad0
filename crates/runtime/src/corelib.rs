//! The built-in `core` function library (spec §1 lists `write`, `size`,
//! `empty`, iterator accessors, and coroutine predicates as an "external
//! collaborator" — ambient enough that every script expects it present
//! without an explicit `import`, the way a host language's prelude is
//! always in scope). `Runtime::new` installs it once into a fresh
//! `SymbolTable` so every script compiled against that runtime can call it
//! (scenario D's `it's value`, scenario E's `co is finished` / `co's
//! value`).
//!
//! Possessive accessors (`it's value`, `co's value`, `co is finished`) lex
//! to the same tokens as `it value`/`co value`/`co is finished` — the
//! trailing `'s` is discarded by the lexer — so each is just a function
//! whose signature text puts the parameter slot *before* the name part
//! (`"{x} value"`), grounded in `parser.rs`'s own note that `try_parse_call`
//! tries a call candidate even when the leading token already resolved as
//! something else, letting `x's name` read naturally as `x name`.
//!
//! `call` (dynamically invoking a `Value::Function` from script) is also
//! listed alongside these in spec §1, but is intentionally not provided
//! here: doing so would need `NativeContext` to re-enter the VM's own
//! `CallFunc` dispatch, and the trait (spec §4.4) exposes only
//! `report_error`/`user_context`. See `DESIGN.md`.

use jinx_core::registry::NativeContext;
use jinx_core::signature::Visibility;
use jinx_core::value::Value;

use crate::registry::Runtime;

/// Register every `core` builtin against `runtime`. Infallible on a fresh
/// `SymbolTable`: the only way `register_function` fails is a duplicate
/// signature id, which cannot happen for these fixed, unique signatures
/// the moment after construction.
pub(crate) fn install(runtime: &Runtime) {
    let core = runtime.get_library("core");

    core.register_function(Visibility::Public, "write {value}", std::rc::Rc::new(|_ctx, args| {
        println!("{}", display(&args[0]));
        Value::Null
    }))
    .expect("core library registration is infallible");

    core.register_function(Visibility::Public, "size {value}", std::rc::Rc::new(|ctx, args| {
        match size_of(&args[0]) {
            Some(n) => Value::Integer(n as i64),
            None => {
                ctx.report_error(&format!("'size' expects a collection, string, or buffer, found {}", args[0].type_of()));
                Value::Null
            }
        }
    }))
    .expect("core library registration is infallible");

    core.register_function(Visibility::Public, "empty {value}", std::rc::Rc::new(|ctx, args| {
        match size_of(&args[0]) {
            Some(n) => Value::Boolean(n == 0),
            None => {
                ctx.report_error(&format!("'empty' expects a collection, string, or buffer, found {}", args[0].type_of()));
                Value::Null
            }
        }
    }))
    .expect("core library registration is infallible");

    core.register_function(Visibility::Public, "{value} value", std::rc::Rc::new(|ctx, args| {
        match &args[0] {
            Value::Coroutine(c) => c.borrow().value().unwrap_or(Value::Null),
            Value::CollectionIterator(it) => it.borrow().current().map(|(_, v)| v).unwrap_or(Value::Null),
            other => {
                ctx.report_error(&format!("'value' expects a coroutine or iterator, found {}", other.type_of()));
                Value::Null
            }
        }
    }))
    .expect("core library registration is infallible");

    core.register_function(Visibility::Public, "{value} key", std::rc::Rc::new(|ctx, args| {
        match &args[0] {
            Value::CollectionIterator(it) => it.borrow().current().map(|(k, _)| k).unwrap_or(Value::Null),
            other => {
                ctx.report_error(&format!("'key' expects an iterator, found {}", other.type_of()));
                Value::Null
            }
        }
    }))
    .expect("core library registration is infallible");

    core.register_function(Visibility::Public, "{value} is finished", std::rc::Rc::new(|ctx, args| {
        match &args[0] {
            Value::Coroutine(c) => Value::Boolean(c.borrow().is_finished()),
            Value::CollectionIterator(it) => Value::Boolean(it.borrow().is_end()),
            other => {
                ctx.report_error(&format!("'is finished' expects a coroutine or iterator, found {}", other.type_of()));
                Value::Null
            }
        }
    }))
    .expect("core library registration is infallible");
}

fn size_of(v: &Value) -> Option<usize> {
    match v {
        Value::Collection(c) => Some(c.borrow().len()),
        Value::String(s) => Some(s.chars().count()),
        Value::Buffer(b) => Some(b.borrow().len()),
        _ => None,
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use jinx_core::value::{CollectionRef, Iterator_, Key, ValueMap};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NoCtx;
    impl NativeContext for NoCtx {
        fn report_error(&mut self, _message: &str) {}
        fn user_context(&self) -> Rc<dyn std::any::Any> {
            Rc::new(())
        }
    }

    #[test]
    fn size_and_empty_cover_strings_and_collections() {
        let runtime = Runtime::new(EngineConfig::new());
        let lib = runtime.get_library("core");
        assert!(lib.get_property("nothing").is_none());
        let size_id = jinx_core::signature::lookup_id(
            "core",
            &jinx_compiler::parse_native_signature("size {value}").unwrap(),
        );
        let entry = runtime_function(&runtime, size_id);
        let mut ctx = NoCtx;
        if let jinx_core::registry::FunctionBody::Native(f) = entry.body {
            assert!(matches!(f(&mut ctx, &[Value::String("abc".into())]), Value::Integer(3)));
        } else {
            panic!("expected a native body");
        }
    }

    #[test]
    fn iterator_value_and_key_reflect_current_position() {
        let runtime = Runtime::new(EngineConfig::new());
        let mut map = ValueMap::new();
        map.insert(Key::Integer(1), Value::String("a".into()));
        let coll: CollectionRef = Rc::new(RefCell::new(map));
        let mut it = Iterator_::begin(coll);
        it.advance();
        let iter_value = Value::CollectionIterator(Rc::new(RefCell::new(it)));

        let value_id = jinx_core::signature::lookup_id(
            "core",
            &jinx_compiler::parse_native_signature("{value} value").unwrap(),
        );
        let entry = runtime_function(&runtime, value_id);
        let mut ctx = NoCtx;
        if let jinx_core::registry::FunctionBody::Native(f) = entry.body {
            assert!(matches!(f(&mut ctx, &[iter_value]), Value::String(s) if s == "a"));
        } else {
            panic!("expected a native body");
        }
    }

    fn runtime_function(runtime: &Runtime, id: u64) -> jinx_core::registry::FunctionEntry {
        runtime.registry_for_test().function(id).expect("builtin registered")
    }
}
