//! `async call` / `call_async_function` (spec §4.4, §8 scenario E).
//!
//! A coroutine is a second, independent [`Script`] seeded with the callee's
//! arguments already on its stack (spec §4.3's `Finish` return disposition:
//! a frame with no caller to resume). `CoroutineObject::is_finished` takes
//! `&self` (the trait lives in `jinx-core`, shared by values that never
//! need a `&mut` handle), so the inner `Script` sits behind its own
//! `RefCell` — interior mutability is how a cooperative "drive one more
//! slice on demand" step happens without the caller holding `&mut`.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use jinx_core::registry::SymbolTable;
use jinx_core::value::{CoroutineObject, Value};

use crate::config::EngineConfig;
use crate::registry::SharedStats;
use crate::vm::Script;

/// A running (or finished) coroutine: spec §8 property 8's "at-most-once"
/// return value is `Script`'s own `result` field, read once the inner
/// script reports `is_finished()`.
pub struct Coroutine {
    script: RefCell<Script>,
}

impl Coroutine {
    pub(crate) fn spawn(
        buffer: Rc<Vec<u8>>,
        entry_pc: u32,
        args: Vec<Value>,
        registry: Arc<SymbolTable>,
        user_context: Rc<dyn Any>,
        config: EngineConfig,
        stats: SharedStats,
    ) -> Self {
        let script = Script::for_function_call(buffer, entry_pc, args, registry, user_context, config, stats);
        Coroutine {
            script: RefCell::new(script),
        }
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("finished", &self.script.borrow().is_finished())
            .finish()
    }
}

impl CoroutineObject for Coroutine {
    fn is_finished(&self) -> bool {
        let mut script = self.script.borrow_mut();
        while !script.is_finished() {
            if !script.execute() {
                break;
            }
        }
        script.is_finished()
    }

    fn value(&self) -> Option<Value> {
        self.script.borrow().result().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinx_core::bytecode::ByteCodeWriter;
    use jinx_core::opcode::Instruction;
    use jinx_core::value::ValueType;
    use std::sync::Mutex;

    struct NoContext;

    fn make_registry_and_buffer(instructions: &[Instruction]) -> (Arc<SymbolTable>, Rc<Vec<u8>>) {
        let mut w = ByteCodeWriter::new();
        for ins in instructions {
            ins.encode(&mut w).unwrap();
        }
        (Arc::new(SymbolTable::new()), Rc::new(w.into_bytes()))
    }

    #[test]
    fn coroutine_captures_return_value_once_finished() {
        let (registry, buffer) = make_registry_and_buffer(&[
            Instruction::SetIndex { id: 1, stack_index: 0, value_type: ValueType::Any },
            Instruction::SetIndex { id: 2, stack_index: 1, value_type: ValueType::Any },
            Instruction::PushVar(1),
            Instruction::PushVar(2),
            Instruction::Add,
            Instruction::Return,
        ]);
        let stats: SharedStats = Arc::new(Mutex::new(crate::registry::PerformanceStats::default()));
        let coroutine = Coroutine::spawn(
            buffer,
            0,
            vec![Value::Integer(2), Value::Integer(3)],
            registry,
            Rc::new(NoContext),
            EngineConfig::new(),
            stats,
        );
        assert!(coroutine.is_finished());
        assert!(matches!(coroutine.value(), Some(Value::Integer(5))));
        // Repeated calls keep returning the same captured value.
        assert!(matches!(coroutine.value(), Some(Value::Integer(5))));
    }
}
