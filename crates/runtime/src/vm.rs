//! The stack machine that executes compiled bytecode (spec §4.3, §5).
//!
//! Grounded in the teacher's `runtime/src/error.rs` thread-local
//! `set_runtime_error`/`take_runtime_error` pattern for reporting failure
//! across an FFI-like boundary without unwinding: a native function cannot
//! return a `Result` (its signature is fixed by `NativeFn`), so it reports
//! through `NativeContext::report_error`, which this module stores on the
//! `Script` itself and surfaces through `Script::error()` the same way the
//! teacher's FFI callers poll `take_runtime_error()`.
//!
//! Unlike the teacher's own `runtime` crate (which JIT-compiles Seq to
//! native code driving a raw tagged-pointer stack, see `stack.rs`), this
//! machine walks a portable instruction stream over a safe `Vec<Value>` —
//! the architecture spec §4.2's opcode table actually describes. The
//! cooperative-yield discipline (`Wait`, instruction quotas) is the same
//! idea as the teacher's green-thread scheduler (`scheduler.rs`), scaled
//! down to a single stack machine instead of an M:N thread pool.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use jinx_core::error::JinxError;
use jinx_core::opcode::Instruction;
use jinx_core::registry::{FunctionBody, NativeContext, SymbolTable};
use jinx_core::value::{CollectionRef, Iterator_, Key, Value, ValueMap, ValueType};

use crate::config::{EngineConfig, LogLevel};
use crate::coroutine::Coroutine;
use crate::logging;
use crate::registry::SharedStats;

/// A `Jump`/`JumpFalse`/... encodes as one tag byte + one `u32` address.
/// `parse_function_def` always emits exactly one such placeholder `Jump`
/// right after a `Function` declaration instruction to skip over the body;
/// the function's `entry_pc` is the position right after that jump, a fact
/// self-describing bytecode (loaded without the parser ever running) needs
/// in order to re-derive `entry_pc` from the instruction stream alone. See
/// `DESIGN.md`.
const JUMP_INSTRUCTION_LEN: u32 = 5;

/// One lexical scope or call frame's worth of bookkeeping, pushed by
/// `ScopeBegin`/`CallFunc` and popped by `ScopeEnd`/`Return`. Spec §4.3
/// "Frame/stack discipline" calls this the `idIndexData` purge list: every
/// id bound (by `SetVar` declaration or `SetIndex`) while this mark is on
/// top is recorded here so it can be forgotten the moment its mark pops,
/// without scanning the whole bindings table.
struct Mark {
    /// `Frame` marks also carry the return address; `Scope` marks are pure
    /// stack-and-binding checkpoints with no associated caller to resume.
    frame: Option<FrameReturn>,
    stack_len: usize,
    ids: Vec<u64>,
}

struct FrameReturn {
    buffer: Rc<Vec<u8>>,
    pc: u32,
}

/// A single-threaded cooperative scripting coroutine (spec §4.3, §5): one
/// value stack, one bytecode buffer pointer, and a mark stack unifying
/// lexical-scope and call-frame cleanup under the rule spec §8 calls out
/// twice — scope integrity and frame integrity both restore the stack (and
/// purge the id table) to exactly the state recorded at the matching
/// `ScopeBegin`/call.
pub struct Script {
    code: Rc<Vec<u8>>,
    pc: u32,
    stack: Vec<Value>,
    bindings: HashMap<u64, usize>,
    marks: Vec<Mark>,
    registry: Arc<SymbolTable>,
    user_context: Rc<dyn Any>,
    config: EngineConfig,
    stats: SharedStats,
    finished: bool,
    error: Option<JinxError>,
    result: Option<Value>,
}

impl Script {
    pub fn new(
        code: Rc<Vec<u8>>,
        entry_pc: u32,
        registry: Arc<SymbolTable>,
        user_context: Rc<dyn Any>,
        config: EngineConfig,
        stats: SharedStats,
    ) -> Self {
        Script {
            code,
            pc: entry_pc,
            stack: Vec::new(),
            bindings: HashMap::new(),
            marks: Vec::new(),
            registry,
            user_context,
            config,
            stats,
            finished: false,
            error: None,
            result: None,
        }
    }

    /// A fresh execution context for a bytecode function, seeded with its
    /// arguments already on the stack — the shape a coroutine's top-level
    /// call needs (spec §4.3's `Finish` return disposition): no enclosing
    /// frame, so the function's own `Return` marks the coroutine finished
    /// instead of resuming a caller.
    pub(crate) fn for_function_call(
        buffer: Rc<Vec<u8>>,
        entry_pc: u32,
        args: Vec<Value>,
        registry: Arc<SymbolTable>,
        user_context: Rc<dyn Any>,
        config: EngineConfig,
        stats: SharedStats,
    ) -> Self {
        let mut script = Script::new(buffer, entry_pc, registry, user_context, config, stats);
        script.stack = args;
        script
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn error(&self) -> Option<&JinxError> {
        self.error.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn user_context(&self) -> Rc<dyn Any> {
        self.user_context.clone()
    }

    /// `Script.set_variable(name, value)`: seed a root-scope binding the
    /// host declared via a script's `external` statement, before the first
    /// `execute()` call. The id is `hash(folded_name) + stackDepth`, with
    /// root-frame depth fixed at 1 (spec §6).
    pub fn set_variable(&mut self, name: &str, value: Value) {
        let id = jinx_core::hash::variable_id(&jinx_core::casefold::fold_str(name), 1);
        let idx = self.stack.len();
        self.stack.push(value);
        self.bindings.insert(id, idx);
        if let Some(mark) = self.marks.last_mut() {
            mark.ids.push(id);
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        let id = jinx_core::hash::variable_id(&jinx_core::casefold::fold_str(name), 1);
        self.bindings.get(&id).and_then(|&idx| self.stack.get(idx))
    }

    /// `Script.find_function(library, signatureText) -> Option<id>`: the id
    /// a matching `register_function`/script `function` declaration would
    /// have produced, looked up without needing to reconstruct a
    /// `FunctionSignature` (only `Public`/`Private` ids are derivable this
    /// way; a `Local` id is random and only ever known by the compile that
    /// produced it).
    pub fn find_function(library: &str, signature_text: &str) -> Result<u64, JinxError> {
        let parts = jinx_compiler::parse_native_signature(signature_text)?;
        Ok(jinx_core::signature::lookup_id(library, &parts))
    }

    /// `Script.call_function(id, params) -> Value` (spec §6): invoke a
    /// registered function directly from the host, outside the normal
    /// instruction stream. A native function runs immediately; a bytecode
    /// function runs to completion in its own nested `Script` (the same
    /// `for_function_call` shape a coroutine's top-level frame uses) rather
    /// than splicing a frame into this script's own mark stack, since the
    /// host is not mid-`execute()` and has no pc/stack to resume into.
    pub fn call_function(&mut self, id: u64, params: Vec<Value>) -> Result<Value, JinxError> {
        let entry = self
            .registry
            .function(id)
            .ok_or_else(|| JinxError::resolution(format!("unknown function id {id:#x}")))?;
        match entry.body {
            FunctionBody::Native(f) => {
                let mut ctx = NativeCtx {
                    user_context: self.user_context.clone(),
                    error: None,
                };
                let result = f(&mut ctx, &params);
                match ctx.error {
                    Some(message) => Err(JinxError::resolution(message)),
                    None => Ok(result),
                }
            }
            FunctionBody::Bytecode { buffer, entry_pc } => {
                let mut nested = Script::for_function_call(
                    buffer,
                    entry_pc,
                    params,
                    self.registry.clone(),
                    self.user_context.clone(),
                    self.config.clone(),
                    self.stats.clone(),
                );
                while !nested.is_finished() {
                    if !nested.execute() {
                        break;
                    }
                }
                match nested.error {
                    Some(e) => Err(e),
                    None => Ok(nested.result.unwrap_or(Value::Null)),
                }
            }
        }
    }

    /// `Script.call_async_function(id, params) -> Coroutine` (spec §6): the
    /// host-driven counterpart to `async call`'s `CallAsync` opcode — same
    /// `Coroutine::spawn`, just reached directly instead of through a
    /// running instruction stream.
    pub fn call_async_function(&mut self, id: u64, params: Vec<Value>) -> Result<Coroutine, JinxError> {
        let entry = self
            .registry
            .function(id)
            .ok_or_else(|| JinxError::resolution(format!("unknown function id {id:#x}")))?;
        match entry.body {
            FunctionBody::Bytecode { buffer, entry_pc } => Ok(Coroutine::spawn(
                buffer,
                entry_pc,
                params,
                self.registry.clone(),
                self.user_context.clone(),
                self.config.clone(),
                self.stats.clone(),
            )),
            FunctionBody::Native(_) => Err(JinxError::resolution(
                "'call_async_function' requires a bytecode function, not a native one",
            )),
        }
    }

    /// Run one slice: opcodes until `Exit`, `Wait`, completion, a runtime
    /// error, or the instruction quota (spec §4.3 "Execution model").
    /// Returns `false` on error; `true` otherwise (including "suspended,
    /// call again to continue" and "already finished").
    pub fn execute(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let start = Instant::now();
        let outcome = self.execute_slice();
        {
            let mut stats = self.stats.lock().unwrap();
            stats.execution_count += 1;
            stats.total_execution_time += start.elapsed();
            if self.finished {
                stats.completion_count += 1;
            }
        }
        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(e);
                self.finished = true;
                logging::emit(
                    self.config.enable_logging,
                    &self.config.log_fn,
                    LogLevel::Error,
                    &format!("script halted: {}", self.error.as_ref().unwrap()),
                );
                false
            }
        }
    }

    fn execute_slice(&mut self) -> Result<(), JinxError> {
        let mut executed: u32 = 0;
        loop {
            if executed >= self.config.max_instructions {
                if self.config.error_on_max_instructions {
                    return Err(JinxError::quota(format!(
                        "exceeded {} instructions in one slice",
                        self.config.max_instructions
                    )));
                }
                return Ok(());
            }
            let mut reader =
                jinx_core::bytecode::ByteCodeReader::with_pos(self.code.as_slice(), self.pc as usize);
            let instruction = Instruction::decode(&mut reader)?;
            self.pc = reader.position() as u32;
            executed += 1;
            {
                let mut stats = self.stats.lock().unwrap();
                stats.instructions_executed += 1;
            }
            match self.step(instruction)? {
                Step::Continue => {}
                Step::Suspend => return Ok(()),
                Step::Finished => {
                    self.finished = true;
                    return Ok(());
                }
            }
        }
    }

    fn step(&mut self, instruction: Instruction) -> Result<Step, JinxError> {
        use Instruction::*;
        match instruction {
            PushVal(v) => self.stack.push(v),
            PushVar(id) => self.stack.push(self.read_binding(id)?.clone()),
            PushProp(id) => {
                let v = self
                    .registry
                    .property_value(id)
                    .ok_or_else(|| JinxError::resolution(format!("unknown property id {id:#x}")))?;
                self.stack.push(v);
            }
            PushTop => {
                let v = self.peek(0)?.clone();
                self.stack.push(v);
            }
            PushColl(n) => self.push_coll(n)?,
            PushList(n) => self.push_list(n)?,
            PushItr => {
                let coll = self.peek_collection(0)?;
                let iter = Iterator_::begin(coll);
                self.stack.push(Value::CollectionIterator(Rc::new(RefCell::new(iter))));
            }
            PushKeyVal => self.push_key_val()?,
            Pop => {
                self.pop()?;
            }
            PopCount(n) => {
                for _ in 0..n {
                    self.pop()?;
                }
            }
            SetVar(id) => self.set_var(id)?,
            SetProp(id) => {
                let v = self.pop()?;
                self.registry.set_property_value(id, v)?;
            }
            SetVarKeyVal { subs, id } => self.set_key_val(Target::Var(id), subs)?,
            SetPropKeyVal { subs, id } => self.set_key_val(Target::Prop(id), subs)?,
            SetIndex { id, stack_index, value_type } => self.set_index(id, stack_index, value_type)?,
            EraseVarKeyVal { subs, id } => self.erase_key_val(Target::Var(id), subs)?,
            ErasePropKeyVal { subs, id } => self.erase_key_val(Target::Prop(id), subs)?,
            EraseItr(id) => {
                let v = self.read_binding(id)?.clone();
                match v {
                    Value::CollectionIterator(it) => it.borrow_mut().erase_current(),
                    other => {
                        return Err(JinxError::type_mismatch(format!(
                            "cannot erase from a {}",
                            other.type_of()
                        )))
                    }
                }
            }
            Add => self.binary(Value::add)?,
            Subtract => self.binary(Value::subtract)?,
            Multiply => self.binary(Value::multiply)?,
            Divide => self.binary(Value::divide)?,
            Mod => self.binary(Value::modulus)?,
            Negate => {
                let v = self.pop()?;
                self.stack.push(v.negate()?);
            }
            Increment => self.step_by(true)?,
            Decrement => self.step_by(false)?,
            Equals => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Boolean(a.value_eq(&b)));
            }
            NotEquals => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Boolean(!a.value_eq(&b)));
            }
            Less => self.relational(|o| o == std::cmp::Ordering::Less)?,
            LessEq => self.relational(|o| o != std::cmp::Ordering::Greater)?,
            Greater => self.relational(|o| o == std::cmp::Ordering::Greater)?,
            GreaterEq => self.relational(|o| o != std::cmp::Ordering::Less)?,
            And => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Boolean(a.is_truthy() && b.is_truthy()));
            }
            Or => {
                let (a, b) = self.pop_pair()?;
                self.stack.push(Value::Boolean(a.is_truthy() || b.is_truthy()));
            }
            Not => {
                let v = self.pop()?;
                self.stack.push(Value::Boolean(!v.is_truthy()));
            }
            Jump(addr) => self.pc = addr,
            JumpFalse(addr) => {
                if !self.pop()?.is_truthy() {
                    self.pc = addr;
                }
            }
            JumpTrue(addr) => {
                if self.pop()?.is_truthy() {
                    self.pc = addr;
                }
            }
            JumpFalseCheck(addr) => {
                if !self.peek(0)?.is_truthy() {
                    self.pc = addr;
                }
            }
            JumpTrueCheck(addr) => {
                if self.peek(0)?.is_truthy() {
                    self.pc = addr;
                }
            }
            Cast(target) => {
                let v = self.pop()?;
                self.stack.push(v.cast(target)?);
            }
            Type => {
                let v = self.pop()?;
                self.stack.push(Value::ValueType(v.type_of()));
            }
            CallFunc(id) => return self.call(id, false),
            CallAsync(id) => return self.call(id, true),
            Return => return self.do_return(),
            Function(sig) => self.declare_function(sig)?,
            Library(name) => self.registry.get_or_create_library(&name),
            Property(name, default) => {
                if self.registry.property_value(name.id).is_none() {
                    let _ = self.registry.register_property(name, default);
                }
            }
            LoopCount => self.loop_count()?,
            LoopOver => self.loop_over()?,
            ScopeBegin => self.marks.push(Mark {
                frame: None,
                stack_len: self.stack.len(),
                ids: Vec::new(),
            }),
            ScopeEnd => self.pop_scope_mark()?,
            Wait => return Ok(Step::Suspend),
            Exit => return Ok(Step::Finished),
        }
        Ok(Step::Continue)
    }

    // -- stack helpers --------------------------------------------------

    fn pop(&mut self) -> Result<Value, JinxError> {
        self.stack
            .pop()
            .ok_or_else(|| JinxError::stack("pop from an empty stack"))
    }

    fn pop_pair(&mut self) -> Result<(Value, Value), JinxError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    fn peek(&self, from_top: usize) -> Result<&Value, JinxError> {
        let len = self.stack.len();
        if from_top >= len {
            return Err(JinxError::stack("peek past the bottom of the stack"));
        }
        Ok(&self.stack[len - 1 - from_top])
    }

    fn peek_collection(&self, from_top: usize) -> Result<CollectionRef, JinxError> {
        match self.peek(from_top)? {
            Value::Collection(c) => Ok(c.clone()),
            other => Err(JinxError::type_mismatch(format!(
                "expected a collection, found {}",
                other.type_of()
            ))),
        }
    }

    fn binary(&mut self, op: fn(&Value, &Value) -> Result<Value, JinxError>) -> Result<(), JinxError> {
        let (a, b) = self.pop_pair()?;
        self.stack.push(op(&a, &b)?);
        Ok(())
    }

    fn relational(&mut self, keep: fn(std::cmp::Ordering) -> bool) -> Result<(), JinxError> {
        let (a, b) = self.pop_pair()?;
        self.stack.push(Value::Boolean(keep(a.compare(&b)?)));
        Ok(())
    }

    /// `Increment`/`Decrement`: restricted to Integer/Number, unlike `Add`
    /// (which also accepts strings) — spec §4.2 lists them as a distinct
    /// pair from `Add`/`Subtract` for exactly this reason.
    fn step_by(&mut self, up: bool) -> Result<(), JinxError> {
        let (a, b) = self.pop_pair()?;
        if !matches!(a, Value::Integer(_) | Value::Number(_))
            || !matches!(b, Value::Integer(_) | Value::Number(_))
        {
            return Err(JinxError::type_mismatch(format!(
                "cannot {} a {} by a {}",
                if up { "increment" } else { "decrement" },
                a.type_of(),
                b.type_of()
            )));
        }
        self.stack.push(if up { a.add(&b)? } else { a.subtract(&b)? });
        Ok(())
    }

    // -- bindings ---------------------------------------------------------

    fn read_binding(&self, id: u64) -> Result<&Value, JinxError> {
        let idx = *self
            .bindings
            .get(&id)
            .ok_or_else(|| JinxError::resolution(format!("unknown variable id {id:#x}")))?;
        self.stack
            .get(idx)
            .ok_or_else(|| JinxError::stack("variable binding points past the stack top"))
    }

    fn bind(&mut self, id: u64, idx: usize) {
        self.bindings.insert(id, idx);
        if let Some(mark) = self.marks.last_mut() {
            mark.ids.push(id);
        }
    }

    /// `SetVar`: reassigns an existing binding if `id` is already bound
    /// (popping the new value into its slot), otherwise declares a fresh
    /// one over the value already sitting on top of the stack (the parser
    /// never pops on a declaring `set`, so the pushed initializer becomes
    /// the variable's home slot directly).
    fn set_var(&mut self, id: u64) -> Result<(), JinxError> {
        if let Some(&idx) = self.bindings.get(&id) {
            let v = self.pop()?;
            *self
                .stack
                .get_mut(idx)
                .ok_or_else(|| JinxError::stack("variable binding points past the stack top"))? = v;
        } else {
            let idx = self.stack.len() - 1;
            self.bind(id, idx);
        }
        Ok(())
    }

    /// `SetIndex`: bind a parameter slot (non-negative, frame-relative) or
    /// a loop-internal (negative, top-relative) id to an existing stack
    /// slot, coercing it to `value_type` if not `Any` (spec §4.3 "Type
    /// coercion on call").
    fn set_index(&mut self, id: u64, stack_index: i32, value_type: ValueType) -> Result<(), JinxError> {
        let base = self.current_frame_base();
        let idx = if stack_index >= 0 {
            base + stack_index as usize
        } else {
            self.stack
                .len()
                .checked_sub((-stack_index) as usize)
                .ok_or_else(|| JinxError::stack("SetIndex stack_index underflows the stack"))?
        };
        let slot = self
            .stack
            .get_mut(idx)
            .ok_or_else(|| JinxError::stack("SetIndex target index is out of range"))?;
        if value_type != ValueType::Any {
            *slot = slot.cast(value_type)?;
        }
        self.bind(id, idx);
        Ok(())
    }

    fn current_frame_base(&self) -> usize {
        self.marks
            .iter()
            .rev()
            .find_map(|m| m.frame.is_some().then_some(m.stack_len))
            .unwrap_or(0)
    }

    // -- scopes and frames -------------------------------------------------

    fn pop_scope_mark(&mut self) -> Result<(), JinxError> {
        let mark = self
            .marks
            .pop()
            .ok_or_else(|| JinxError::stack("ScopeEnd with no matching ScopeBegin"))?;
        for id in &mark.ids {
            self.bindings.remove(id);
        }
        self.stack.truncate(mark.stack_len);
        Ok(())
    }

    /// `Return`: pop the value, unwind through any open scopes up to (and
    /// including) the nearest call frame, purging every id bound since,
    /// then resume the caller with the value pushed. With no enclosing
    /// frame — a coroutine's own top level, or a bare `return` reached at
    /// script top level — the value becomes the script's result instead
    /// (spec §4.3's `Finish` disposition).
    fn do_return(&mut self) -> Result<Step, JinxError> {
        let value = self.pop()?;
        loop {
            let mark = match self.marks.pop() {
                Some(m) => m,
                None => {
                    self.result = Some(value);
                    return Ok(Step::Finished);
                }
            };
            for id in &mark.ids {
                self.bindings.remove(id);
            }
            self.stack.truncate(mark.stack_len);
            if let Some(ret) = mark.frame {
                self.stack.push(value);
                self.code = ret.buffer;
                self.pc = ret.pc;
                return Ok(Step::Continue);
            }
        }
    }

    fn call(&mut self, id: u64, as_async: bool) -> Result<Step, JinxError> {
        let entry = self
            .registry
            .function(id)
            .ok_or_else(|| JinxError::resolution(format!("unknown function id {id:#x}")))?;
        let param_count = entry.signature.param_count();
        if self.stack.len() < param_count {
            return Err(JinxError::stack("not enough arguments on the stack for call"));
        }
        let base = self.stack.len() - param_count;
        if as_async {
            let args = self.stack.split_off(base);
            let coroutine = match &entry.body {
                FunctionBody::Bytecode { buffer, entry_pc } => Coroutine::spawn(
                    buffer.clone(),
                    *entry_pc,
                    args,
                    self.registry.clone(),
                    self.user_context.clone(),
                    self.config.clone(),
                    self.stats.clone(),
                ),
                FunctionBody::Native(_) => {
                    return Err(JinxError::resolution(
                        "'async call' requires a bytecode function, not a native one",
                    ))
                }
            };
            self.stack.push(Value::Coroutine(Rc::new(RefCell::new(coroutine))));
            return Ok(Step::Continue);
        }
        match &entry.body {
            FunctionBody::Bytecode { buffer, entry_pc } => {
                self.marks.push(Mark {
                    frame: Some(FrameReturn {
                        buffer: self.code.clone(),
                        pc: self.pc,
                    }),
                    stack_len: base,
                    ids: Vec::new(),
                });
                self.code = buffer.clone();
                self.pc = *entry_pc;
                Ok(Step::Continue)
            }
            FunctionBody::Native(f) => {
                let args = self.stack.split_off(base);
                let mut ctx = NativeCtx {
                    user_context: self.user_context.clone(),
                    error: None,
                };
                let result = f(&mut ctx, &args);
                if let Some(message) = ctx.error {
                    return Err(JinxError::resolution(message));
                }
                self.stack.push(result);
                Ok(Step::Continue)
            }
        }
    }

    /// Self-describing bytecode registers its own function declarations as
    /// they're executed, so bytecode loaded without ever running the
    /// parser (spec §4.2's `Function` doc note) still populates the
    /// registry. A normal compile-then-run script finds the function
    /// already registered (the parser registered it at compile time) and
    /// this is a no-op.
    fn declare_function(&mut self, sig: jinx_core::signature::FunctionSignature) -> Result<(), JinxError> {
        if self.registry.function(sig.id).is_none() {
            let entry_pc = self.pc + JUMP_INSTRUCTION_LEN;
            let _ = self.registry.register_function(jinx_core::registry::FunctionEntry {
                signature: sig,
                body: FunctionBody::Bytecode { buffer: self.code.clone(), entry_pc },
            });
        }
        Ok(())
    }

    // -- loops --------------------------------------------------------------

    /// `LoopCount`: peek (never mutate) the `[current, limit, step]` triple
    /// a counter loop keeps at the top of the stack and push whether the
    /// loop should keep going. Stepping `current` itself is ordinary
    /// `PushVar`/`Add`/`SetVar` bytecode the parser emits after the body.
    fn loop_count(&mut self) -> Result<(), JinxError> {
        let step = self.peek(0)?.clone();
        let limit = self.peek(1)?.clone();
        let current = self.peek(2)?.clone();
        let step_cmp = step
            .compare(&Value::Integer(0))
            .map_err(|_| JinxError::type_mismatch("loop step must be numeric"))?;
        if step_cmp == std::cmp::Ordering::Equal {
            return Err(JinxError::arithmetic("loop step must not be zero"));
        }
        let keep_going = if step_cmp != std::cmp::Ordering::Less {
            current.compare(&limit)? != std::cmp::Ordering::Greater
        } else {
            current.compare(&limit)? != std::cmp::Ordering::Less
        };
        self.stack.push(Value::Boolean(keep_going));
        Ok(())
    }

    /// `LoopOver`: advance the iterator on top of the stack, push whether
    /// it's now past the end.
    fn loop_over(&mut self) -> Result<(), JinxError> {
        let top = self.peek(0)?.clone();
        match top {
            Value::CollectionIterator(it) => {
                it.borrow_mut().advance();
                let done = it.borrow().is_end();
                self.stack.push(Value::Boolean(done));
                Ok(())
            }
            other => Err(JinxError::type_mismatch(format!(
                "expected a collection iterator, found {}",
                other.type_of()
            ))),
        }
    }

    // -- collections ----------------------------------------------------

    fn push_coll(&mut self, pairs: u32) -> Result<(), JinxError> {
        let n = pairs as usize * 2;
        if self.stack.len() < n {
            return Err(JinxError::stack("not enough values on the stack for a collection literal"));
        }
        let raw = self.stack.split_off(self.stack.len() - n);
        let mut map = ValueMap::new();
        for pair in raw.chunks_exact(2) {
            let key = pair[0].to_key()?;
            map.insert(key, pair[1].clone());
        }
        self.stack.push(Value::Collection(Rc::new(RefCell::new(map))));
        Ok(())
    }

    fn push_list(&mut self, n: u32) -> Result<(), JinxError> {
        let n = n as usize;
        if self.stack.len() < n {
            return Err(JinxError::stack("not enough values on the stack for a list literal"));
        }
        let raw = self.stack.split_off(self.stack.len() - n);
        let mut map = ValueMap::new();
        for (i, v) in raw.into_iter().enumerate() {
            map.insert(Key::Integer(i as i64 + 1), v);
        }
        self.stack.push(Value::Collection(Rc::new(RefCell::new(map))));
        Ok(())
    }

    /// `PushKeyVal`: pop key then container, push `container[key]`.
    /// Strings additionally support 1-based single-character indexing —
    /// not a `Collection`, so it has no home in `jinx-core::value`'s own
    /// methods; it lives here because only the VM's key/container opcodes
    /// need it. See `DESIGN.md`.
    fn push_key_val(&mut self) -> Result<(), JinxError> {
        let key = self.pop()?;
        let container = self.pop()?;
        let result = match &container {
            Value::Collection(c) => {
                let k = key.to_key()?;
                c.borrow()
                    .get(&k)
                    .cloned()
                    .ok_or_else(|| JinxError::bounds(format!("no element at key {:?}", k.to_value())))?
            }
            Value::String(s) => {
                let i = match key {
                    Value::Integer(i) => i,
                    other => {
                        return Err(JinxError::type_mismatch(format!(
                            "string index must be an integer, found {}",
                            other.type_of()
                        )))
                    }
                };
                let chars: Vec<char> = s.chars().collect();
                if i < 1 || i as usize > chars.len() {
                    return Err(JinxError::bounds(format!("string index {i} out of range")));
                }
                Value::String(chars[i as usize - 1].to_string())
            }
            other => {
                return Err(JinxError::type_mismatch(format!(
                    "cannot index into a {}",
                    other.type_of()
                )))
            }
        };
        self.stack.push(result);
        Ok(())
    }

    /// Shared by `SetVarKeyVal`/`SetPropKeyVal`/`EraseVarKeyVal`/
    /// `ErasePropKeyVal`: pop the `subs` key expressions (pushed outermost
    /// key first, so popping restores that order after a reverse), then
    /// read the target's current value.
    fn pop_keys_and_target(&mut self, target: &Target, subs: u32) -> Result<(Value, Vec<Value>), JinxError> {
        let mut keys = Vec::with_capacity(subs as usize);
        for _ in 0..subs {
            keys.push(self.pop()?);
        }
        keys.reverse();
        let current = match target {
            Target::Var(id) => self.read_binding(*id)?.clone(),
            Target::Prop(id) => self
                .registry
                .property_value(*id)
                .ok_or_else(|| JinxError::resolution(format!("unknown property id {id:#x}")))?,
        };
        Ok((current, keys))
    }

    fn write_back(&mut self, target: &Target, value: Value) -> Result<(), JinxError> {
        match target {
            Target::Var(id) => {
                let idx = *self
                    .bindings
                    .get(id)
                    .ok_or_else(|| JinxError::resolution(format!("unknown variable id {id:#x}")))?;
                self.stack[idx] = value;
                Ok(())
            }
            Target::Prop(id) => self.registry.set_property_value(*id, value),
        }
    }

    /// Navigate `subs - 1` levels deep into a collection chain, returning
    /// the final map to mutate and the last key. Errors if any
    /// intermediate value isn't a `Collection`.
    fn navigate(container: &Value, keys: &[Value]) -> Result<(CollectionRef, Key), JinxError> {
        let mut current = match container {
            Value::Collection(c) => c.clone(),
            other => {
                return Err(JinxError::type_mismatch(format!(
                    "cannot index into a {}",
                    other.type_of()
                )))
            }
        };
        for key in &keys[..keys.len() - 1] {
            let k = key.to_key()?;
            let next = current
                .borrow()
                .get(&k)
                .cloned()
                .ok_or_else(|| JinxError::bounds(format!("no element at key {:?}", k.to_value())))?;
            current = match next {
                Value::Collection(c) => c,
                other => {
                    return Err(JinxError::type_mismatch(format!(
                        "cannot index into a {}",
                        other.type_of()
                    )))
                }
            };
        }
        let last = keys.last().unwrap().to_key()?;
        Ok((current, last))
    }

    fn set_key_val(&mut self, target: Target, subs: u32) -> Result<(), JinxError> {
        let value = self.pop()?;
        let (container, keys) = self.pop_keys_and_target(&target, subs)?;
        if keys.len() == 1 {
            if let Value::String(s) = &container {
                let idx = match &keys[0] {
                    Value::Integer(i) => *i,
                    other => {
                        return Err(JinxError::type_mismatch(format!(
                            "string index must be an integer, found {}",
                            other.type_of()
                        )))
                    }
                };
                let ch = match &value {
                    Value::String(v) if v.chars().count() == 1 => v.chars().next().unwrap(),
                    other => {
                        return Err(JinxError::type_mismatch(format!(
                            "cannot assign a {} into a string character slot",
                            other.type_of()
                        )))
                    }
                };
                let mut chars: Vec<char> = s.chars().collect();
                if idx < 1 || idx as usize > chars.len() {
                    return Err(JinxError::bounds(format!("string index {idx} out of range")));
                }
                chars[idx as usize - 1] = ch;
                return self.write_back(&target, Value::String(chars.into_iter().collect()));
            }
        }
        let (map, last_key) = Self::navigate(&container, &keys)?;
        map.borrow_mut().insert(last_key, value);
        Ok(())
    }

    fn erase_key_val(&mut self, target: Target, subs: u32) -> Result<(), JinxError> {
        let (container, keys) = self.pop_keys_and_target(&target, subs)?;
        let (map, last_key) = Self::navigate(&container, &keys)?;
        map.borrow_mut().remove(&last_key);
        Ok(())
    }
}

enum Step {
    Continue,
    Suspend,
    Finished,
}

enum Target {
    Var(u64),
    Prop(u64),
}

/// `NativeContext` for one native call: routes `report_error` into a plain
/// field rather than propagating a `Result`, the same shape as the
/// teacher's thread-local `set_runtime_error` (`runtime/src/error.rs`) —
/// adapted to a per-call struct instead of a thread-local since a `Script`
/// is already confined to one thread at a time (spec §5).
struct NativeCtx {
    user_context: Rc<dyn Any>,
    error: Option<String>,
}

impl NativeContext for NativeCtx {
    fn report_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    fn user_context(&self) -> Rc<dyn Any> {
        self.user_context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinx_core::bytecode::ByteCodeWriter;
    use jinx_core::registry::{FunctionEntry, SymbolTable};
    use jinx_core::signature::{FunctionSignature, NamePart, ParamSlot, SignaturePart, Visibility};
    use std::sync::Mutex;

    struct NoContext;

    fn script_for(instructions: &[Instruction]) -> Script {
        let mut w = ByteCodeWriter::new();
        for ins in instructions {
            ins.encode(&mut w).unwrap();
        }
        let stats: SharedStats = Arc::new(Mutex::new(crate::registry::PerformanceStats::default()));
        Script::new(
            Rc::new(w.into_bytes()),
            0,
            Arc::new(SymbolTable::new()),
            Rc::new(NoContext),
            EngineConfig::new(),
            stats,
        )
    }

    #[test]
    fn arithmetic_and_return_produces_expected_value() {
        let mut script = script_for(&[
            Instruction::PushVal(Value::Integer(2)),
            Instruction::PushVal(Value::Integer(3)),
            Instruction::Add,
            Instruction::Return,
        ]);
        while !script.is_finished() {
            assert!(script.execute());
        }
        assert!(matches!(script.result(), Some(Value::Integer(5))));
    }

    #[test]
    fn scope_end_forgets_bindings_declared_inside_it() {
        let mut script = script_for(&[
            Instruction::ScopeBegin,
            Instruction::PushVal(Value::Integer(1)),
            Instruction::SetVar(77),
            Instruction::ScopeEnd,
            Instruction::PushVal(Value::Integer(42)),
            Instruction::Return,
        ]);
        while !script.is_finished() {
            assert!(script.execute());
        }
        assert!(matches!(script.result(), Some(Value::Integer(42))));
        assert!(!script.bindings.contains_key(&77));
    }

    #[test]
    fn return_from_an_open_scope_unwinds_through_it() {
        // No enclosing call frame: `Return` inside the still-open `ScopeBegin`
        // must pop both the scope mark and the (absent) frame mark, landing
        // on "script finished" rather than erroring on a stray `ScopeEnd`.
        let mut script = script_for(&[
            Instruction::ScopeBegin,
            Instruction::PushVal(Value::Integer(7)),
            Instruction::Return,
        ]);
        while !script.is_finished() {
            assert!(script.execute());
        }
        assert!(script.error().is_none());
        assert!(matches!(script.result(), Some(Value::Integer(7))));
    }

    fn add_function(registry: &SymbolTable) -> u64 {
        let signature = FunctionSignature::new(
            "test",
            Visibility::Public,
            vec![
                SignaturePart::Param(ParamSlot { param_type: None, name: None }),
                SignaturePart::Name(NamePart::new(vec!["plus".to_string()], false)),
                SignaturePart::Param(ParamSlot { param_type: None, name: None }),
            ],
        )
        .unwrap();
        let id = signature.id;
        registry
            .register_function(FunctionEntry {
                signature,
                body: FunctionBody::Native(Rc::new(|_ctx, args| args[0].add(&args[1]).unwrap())),
            })
            .unwrap();
        id
    }

    #[test]
    fn call_function_invokes_a_native_body_directly() {
        let registry = Arc::new(SymbolTable::new());
        let id = add_function(&registry);
        let mut script = Script::new(
            Rc::new(Vec::new()),
            0,
            registry,
            Rc::new(NoContext),
            EngineConfig::new(),
            Arc::new(Mutex::new(crate::registry::PerformanceStats::default())),
        );
        let result = script
            .call_function(id, vec![Value::Integer(2), Value::Integer(3)])
            .unwrap();
        assert!(matches!(result, Value::Integer(5)));
    }

    #[test]
    fn native_error_surfaces_through_script_error() {
        let registry = Arc::new(SymbolTable::new());
        let signature = FunctionSignature::new(
            "test",
            Visibility::Public,
            vec![SignaturePart::Name(NamePart::new(vec!["fail".to_string()], false))],
        )
        .unwrap();
        let id = signature.id;
        registry
            .register_function(FunctionEntry {
                signature,
                body: FunctionBody::Native(Rc::new(|ctx, _args| {
                    ctx.report_error("deliberate failure");
                    Value::Null
                })),
            })
            .unwrap();

        let mut w = ByteCodeWriter::new();
        Instruction::CallFunc(id).encode(&mut w).unwrap();
        Instruction::Return.encode(&mut w).unwrap();
        let mut script = Script::new(
            Rc::new(w.into_bytes()),
            0,
            registry,
            Rc::new(NoContext),
            EngineConfig::new(),
            Arc::new(Mutex::new(crate::registry::PerformanceStats::default())),
        );
        while !script.is_finished() {
            script.execute();
        }
        assert!(script.error().is_some());
        assert!(script.is_finished());
    }

    #[test]
    fn get_and_set_variable_round_trip_by_name() {
        let mut script = script_for(&[]);
        script.set_variable("count", Value::Integer(10));
        assert!(matches!(script.get_variable("count"), Some(Value::Integer(10))));
        assert!(script.get_variable("unknown").is_none());
    }
}
