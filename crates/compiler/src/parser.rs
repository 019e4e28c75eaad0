//! Token stream → bytecode (spec §4.2).
//!
//! Mirrors the teacher's recursive-descent emitter (`compiler/src/parser.rs`):
//! a flat token cursor, precedence-climbing expression parsing, and
//! statements that emit straight into a `ByteCodeWriter` rather than
//! building an intermediate AST. Jump targets are back-patched the same way
//! the teacher patches its own `Jump`/`JumpIfFalse` immediates — reserve the
//! four-byte slot, remember its offset, fill it in once the real target is
//! known.

use std::collections::HashMap;
use std::rc::Rc;

use jinx_core::bytecode::ByteCodeWriter;
use jinx_core::error::{JinxError, SourcePos};
use jinx_core::hash::variable_id;
use jinx_core::registry::{FunctionBody, FunctionEntry, SymbolTable};
use jinx_core::signature::{FunctionSignature, NamePart, ParamSlot, PropertyName, SignaturePart, Visibility};
use jinx_core::value::{Value, ValueType};
use jinx_core::Instruction;

use crate::lexer::{Literal, Token, TokenKind};

/// A pending break jump inside the loop currently being parsed.
struct LoopCtx {
    break_patches: Vec<usize>,
}

/// One function body still waiting for the whole script's bytecode buffer
/// to be finalized before it can be registered (its `FunctionBody::Bytecode`
/// needs the final `Rc<Vec<u8>>`, but the buffer is still being appended to
/// while later functions and statements compile).
struct PendingFunction {
    signature: FunctionSignature,
    entry_pc: u32,
}

/// What a compiled script needs at call time: the shared bytecode buffer,
/// the PC instructions start running from, and the function ids this
/// compile registered (so a `Script` drop, or a re-compile, can unregister
/// them).
pub struct CompiledScript {
    pub buffer: Rc<Vec<u8>>,
    pub entry_pc: u32,
    pub registered_functions: Vec<u64>,
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    registry: &'a SymbolTable,
    script_name: String,
    current_library: String,
    imports: Vec<String>,
    writer: ByteCodeWriter,
    /// One `HashMap<folded-name, variable-id>` per lexical scope currently
    /// open; `scopes.len()` doubles as the depth fed to `variable_id`.
    scopes: Vec<HashMap<String, u64>>,
    loop_stack: Vec<LoopCtx>,
    pending_functions: Vec<PendingFunction>,
    /// Counter for ids that back counter-loop bookkeeping slots (current/
    /// step) but are never reachable by source-level name lookup. Keyed
    /// at depth 0, a depth no real variable ever uses, so these can never
    /// collide with a user binding.
    internal_id_counter: u64,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, registry: &'a SymbolTable, script_name: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            registry,
            script_name: script_name.to_string(),
            current_library: "".to_string(),
            imports: Vec::new(),
            writer: ByteCodeWriter::new(),
            scopes: vec![HashMap::new()],
            loop_stack: Vec::new(),
            pending_functions: Vec::new(),
            internal_id_counter: 0,
        }
    }

    /// A fresh id for a bytecode-internal bookkeeping slot, never visible
    /// to `lookup_variable`.
    fn internal_id(&mut self) -> u64 {
        self.internal_id_counter += 1;
        variable_id(&format!("@loop-internal#{}", self.internal_id_counter), 0)
    }

    // --- token cursor -----------------------------------------------------

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.cur().kind == kind
    }

    fn check_at(&self, offset: usize, kind: TokenKind) -> bool {
        self.at(offset).kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn pos_of_current(&self) -> SourcePos {
        SourcePos::new(self.cur().line, self.cur().column)
    }

    fn err_here(&self, message: impl Into<String>) -> JinxError {
        JinxError::syntax(message, self.pos_of_current())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, JinxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.err_here(format!(
                "expected {:?}, found {:?} ('{}')",
                kind,
                self.cur().kind,
                self.cur().text
            )))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::NewLine) {
            self.advance();
        }
    }

    // --- emission helpers ---------------------------------------------------

    fn emit(&mut self, ins: Instruction) -> Result<(), JinxError> {
        ins.encode(&mut self.writer)
    }

    /// Emit a jump with a placeholder target, returning the byte offset of
    /// the u32 immediate to patch once the real target is known.
    fn emit_jump(&mut self, make: impl FnOnce(u32) -> Instruction) -> Result<usize, JinxError> {
        let patch_at = self.writer.position() + 1; // tag byte, then the u32
        self.emit(make(0))?;
        Ok(patch_at)
    }

    fn patch_jump(&mut self, patch_at: usize) {
        let here = self.writer.position() as u32;
        self.writer.patch_u32(patch_at, here);
    }

    fn patch_jump_to(&mut self, patch_at: usize, target: u32) {
        self.writer.patch_u32(patch_at, target);
    }

    // --- scope / variable resolution ---------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn depth(&self) -> u32 {
        self.scopes.len() as u32
    }

    fn lookup_variable(&self, folded_name: &str) -> Option<u64> {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(folded_name) {
                return Some(*id);
            }
        }
        None
    }

    /// Bind `folded_name` in the innermost open scope, returning its id.
    /// Single-token identifiers only: this engine does not support
    /// multi-word variable/property names as assignment *targets* (the
    /// registry still supports multi-word `PropertyName`s for function-call
    /// matching; see `DESIGN.md`).
    fn declare_variable(&mut self, folded_name: &str) -> u64 {
        let id = variable_id(folded_name, self.depth());
        self.scopes.last_mut().unwrap().insert(folded_name.to_string(), id);
        id
    }

    fn lookup_property(&self, folded_name: &str) -> Option<PropertyName> {
        let mut candidates = self.registry.properties_in_library(&self.current_library);
        for lib in &self.imports {
            candidates.extend(self.registry.properties_in_library(lib));
        }
        candidates.into_iter().find(|p| p.name == folded_name)
    }

    // --- entry point --------------------------------------------------------

    pub fn parse_program(mut self) -> Result<CompiledScript, JinxError> {
        self.skip_newlines();
        while self.check(TokenKind::KwImport) {
            self.advance();
            let name = self.expect(TokenKind::Identifier)?;
            self.registry.get_or_create_library(&name.text);
            self.imports.push(name.text);
            self.skip_newlines();
        }
        if self.check(TokenKind::KwLibrary) {
            self.advance();
            let name = self.expect(TokenKind::Identifier)?;
            self.current_library = name.text;
            self.registry.get_or_create_library(&self.current_library);
            self.skip_newlines();
        }

        let entry_pc = self.writer.position() as u32;
        self.parse_block(&[TokenKind::Eof])?;
        self.emit(Instruction::Exit)?;

        let buffer = Rc::new(self.writer.into_bytes());
        let mut registered = Vec::new();
        for pending in self.pending_functions {
            let id = self.registry.register_function(FunctionEntry {
                signature: pending.signature,
                body: FunctionBody::Bytecode {
                    buffer: buffer.clone(),
                    entry_pc: pending.entry_pc,
                },
            })?;
            registered.push(id);
        }

        Ok(CompiledScript {
            buffer,
            entry_pc,
            registered_functions: registered,
        })
    }

    /// Parse statements until one of `terminators` is seen (without
    /// consuming it).
    fn parse_block(&mut self, terminators: &[TokenKind]) -> Result<(), JinxError> {
        self.skip_newlines();
        while !terminators.iter().any(|t| self.check(*t)) {
            self.parse_statement()?;
            self.skip_newlines();
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<(), JinxError> {
        match self.cur().kind {
            TokenKind::KwSet => self.parse_set(),
            TokenKind::KwErase => self.parse_erase(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwLoop => self.parse_loop(),
            TokenKind::KwBreak => self.parse_break(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwWait => self.parse_wait(),
            TokenKind::KwIncrement | TokenKind::KwDecrement => {
                self.parse_inc_dec_statement()
            }
            TokenKind::KwExternal => self.parse_external(),
            TokenKind::KwBegin => self.parse_begin(),
            TokenKind::KwPublic | TokenKind::KwPrivate if self.check_at(1, TokenKind::TypeFunction) => {
                self.parse_function_def()
            }
            TokenKind::TypeFunction => self.parse_function_def(),
            _ => self.parse_expression_statement(),
        }
    }

    // --- set / property decl / variable decl / reassignment ---------------

    /// `set [public|private] [readonly] <identifier> to <expression>`. Either
    /// bracketed part may be absent; `readonly` alone still declares a
    /// property (defaulting to public visibility), since plain variables
    /// have no read-only form.
    fn parse_set(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwSet)?;
        let visibility = if self.check(TokenKind::KwPublic) {
            self.advance();
            Some(Visibility::Public)
        } else if self.check(TokenKind::KwPrivate) {
            self.advance();
            Some(Visibility::Private)
        } else {
            None
        };
        let read_only = if self.check(TokenKind::KwReadonly) {
            self.advance();
            true
        } else {
            false
        };
        let name_tok = self.expect(TokenKind::Identifier)?;

        if visibility.is_none() && !read_only && self.check(TokenKind::LBracket) {
            return self.parse_keyed_assignment(&name_tok);
        }

        self.expect(TokenKind::KwTo)?;
        self.parse_expr()?; // leaves the value on the stack

        if visibility.is_some() || read_only {
            let vis = visibility.unwrap_or(Visibility::Public);
            let name = PropertyName::new(&self.current_library, &name_tok.text, vis, read_only);
            let default = Value::Null;
            // Stack currently holds the initializer's value; Property
            // declares the slot and SetProp writes the initializer into it.
            let id = self.registry.register_property(name.clone(), default.clone())?;
            self.emit(Instruction::Property(name, default))?;
            self.emit(Instruction::SetProp(id))?;
        } else if let Some(id) = self.lookup_variable(&name_tok.text) {
            self.emit(Instruction::SetVar(id))?;
        } else if let Some(prop) = self.lookup_property(&name_tok.text) {
            self.emit(Instruction::SetProp(prop.id))?;
        } else {
            let id = self.declare_variable(&name_tok.text);
            self.emit(Instruction::SetVar(id))?;
        }
        Ok(())
    }

    /// `set <name>[<expr>]... to <expr>`: a keyed write into an existing
    /// variable or property. Keys are pushed outermost-first, the value
    /// last, matching `PushKeyVal`'s read-side convention of container
    /// before key.
    fn parse_keyed_assignment(&mut self, name_tok: &Token) -> Result<(), JinxError> {
        let mut subs = 0u32;
        while self.check(TokenKind::LBracket) {
            self.advance();
            self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            subs += 1;
        }
        self.expect(TokenKind::KwTo)?;
        self.parse_expr()?;
        if let Some(id) = self.lookup_variable(&name_tok.text) {
            self.emit(Instruction::SetVarKeyVal { subs, id })
        } else if let Some(prop) = self.lookup_property(&name_tok.text) {
            self.emit(Instruction::SetPropKeyVal { subs, id: prop.id })
        } else {
            Err(self.err_here(format!("unknown identifier '{}'", name_tok.text)))
        }
    }

    fn parse_external(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwExternal)?;
        let name_tok = self.expect(TokenKind::Identifier)?;
        // Host-provided: reserve the binding at root depth so the id matches
        // whatever the host computes via the same `variable_id` formula when
        // it calls `Script::set_variable` before execution starts.
        self.scopes[0].insert(name_tok.text.clone(), variable_id(&name_tok.text, 1));
        Ok(())
    }

    // --- erase --------------------------------------------------------------

    fn parse_erase(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwErase)?;
        let name_tok = self.expect(TokenKind::Identifier)?;
        let mut subs = 0u32;
        while self.check(TokenKind::LBracket) {
            self.advance();
            self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            subs += 1;
        }
        if subs == 0 {
            // Bare `erase <name>`: only meaningful for a loop-bound iterator
            // variable (`EraseItr`, spec §4.2's "advance past current
            // element, removing it").
            if let Some(id) = self.lookup_variable(&name_tok.text) {
                self.emit(Instruction::EraseItr(id))?;
                return Ok(());
            }
            return Err(self.err_here(format!("cannot erase '{}' without a key", name_tok.text)));
        }
        if let Some(id) = self.lookup_variable(&name_tok.text) {
            self.emit(Instruction::EraseVarKeyVal { subs, id })?;
        } else if let Some(prop) = self.lookup_property(&name_tok.text) {
            self.emit(Instruction::ErasePropKeyVal { subs, id: prop.id })?;
        } else {
            return Err(self.err_here(format!("unknown identifier '{}'", name_tok.text)));
        }
        Ok(())
    }

    // --- if / else if / else ------------------------------------------------

    fn parse_if(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwIf)?;
        let mut end_patches = Vec::new();
        let mut pending_exit: Option<usize> = None;

        self.parse_expr()?;
        let mut next_patch = self.emit_jump(Instruction::JumpFalse)?;
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwElse, TokenKind::KwEnd])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;

        while self.check(TokenKind::KwElse) && self.check_at(1, TokenKind::KwIf) {
            end_patches.push(self.emit_jump(Instruction::Jump)?);
            self.patch_jump(next_patch);
            self.advance(); // else
            self.advance(); // if
            self.parse_expr()?;
            next_patch = self.emit_jump(Instruction::JumpFalse)?;
            self.emit(Instruction::ScopeBegin)?;
            self.push_scope();
            self.parse_block(&[TokenKind::KwElse, TokenKind::KwEnd])?;
            self.pop_scope();
            self.emit(Instruction::ScopeEnd)?;
        }

        if self.check(TokenKind::KwElse) {
            end_patches.push(self.emit_jump(Instruction::Jump)?);
            self.patch_jump(next_patch);
            self.advance();
            self.emit(Instruction::ScopeBegin)?;
            self.push_scope();
            self.parse_block(&[TokenKind::KwEnd])?;
            self.pop_scope();
            self.emit(Instruction::ScopeEnd)?;
        } else {
            pending_exit = Some(next_patch);
        }

        if let Some(p) = pending_exit {
            self.patch_jump(p);
        }
        for p in end_patches {
            self.patch_jump(p);
        }
        self.expect(TokenKind::KwEnd)?;
        Ok(())
    }

    // --- loop: counter / iterator / pre-test / post-test / infinite --------

    fn parse_loop(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwLoop)?;

        if self.check(TokenKind::Identifier) && self.check_at(1, TokenKind::KwFrom) {
            let name = self.advance();
            return self.parse_counter_loop(Some(name.text));
        }
        if self.check(TokenKind::Identifier) && self.check_at(1, TokenKind::KwOver) {
            let name = self.advance();
            return self.parse_iterator_loop(Some(name.text));
        }
        if self.check(TokenKind::KwFrom) {
            return self.parse_counter_loop(None);
        }
        if self.check(TokenKind::KwOver) {
            return self.parse_iterator_loop(None);
        }
        if self.check(TokenKind::KwUntil) || self.check(TokenKind::KwWhile) {
            return self.parse_pretest_loop();
        }
        self.parse_infinite_or_posttest_loop()
    }

    fn parse_counter_loop(&mut self, name: Option<String>) -> Result<(), JinxError> {
        self.expect(TokenKind::KwFrom)?;
        self.parse_expr()?; // current
        self.expect(TokenKind::KwTo)?;
        self.parse_expr()?; // limit
        if self.check(TokenKind::KwBy) {
            self.advance();
            self.parse_expr()?; // step
        } else {
            self.emit(Instruction::PushVal(Value::Integer(1)))?;
        }

        // Hidden ids for the current/step slots, so the post-body step
        // below can read and overwrite them through the ordinary
        // `PushVar`/`SetVar`/`Add` opcodes instead of needing a dedicated
        // in-place-arithmetic instruction. `LoopCount` itself only peeks
        // the raw top-three slots to decide whether to continue; it never
        // mutates them, which is what lets a user-named loop variable
        // alias the same slot safely (see `DESIGN.md`).
        let current_id = self.internal_id();
        let step_id = self.internal_id();
        self.push_scope();
        self.emit(Instruction::SetIndex {
            id: current_id,
            stack_index: -3,
            value_type: ValueType::Any,
        })?;
        self.emit(Instruction::SetIndex {
            id: step_id,
            stack_index: -1,
            value_type: ValueType::Any,
        })?;
        if let Some(name) = &name {
            let id = self.declare_variable(name);
            self.emit(Instruction::SetIndex {
                id,
                stack_index: -3,
                value_type: ValueType::Any,
            })?;
        }

        let loop_top = self.writer.position() as u32;
        self.emit(Instruction::LoopCount)?;
        let exit_patch = self.emit_jump(Instruction::JumpFalse)?;

        self.loop_stack.push(LoopCtx { break_patches: Vec::new() });
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwEnd])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;
        self.expect(TokenKind::KwEnd)?;

        // Step current by step now, after the body has run with this
        // iteration's value and before `LoopCount` re-checks the bound.
        self.emit(Instruction::PushVar(current_id))?;
        self.emit(Instruction::PushVar(step_id))?;
        self.emit(Instruction::Add)?;
        self.emit(Instruction::SetVar(current_id))?;

        self.emit_jump_to(loop_top)?;
        self.patch_jump(exit_patch);
        let ctx = self.loop_stack.pop().unwrap();
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        self.emit(Instruction::PopCount(3))?;
        self.pop_scope();
        Ok(())
    }

    fn parse_iterator_loop(&mut self, name: Option<String>) -> Result<(), JinxError> {
        self.expect(TokenKind::KwOver)?;
        self.parse_expr()?; // collection
        self.emit(Instruction::PushItr)?;

        self.push_scope();
        if let Some(name) = &name {
            let id = self.declare_variable(name);
            self.emit(Instruction::SetIndex {
                id,
                stack_index: -1,
                value_type: ValueType::Any,
            })?;
        }

        let loop_top = self.writer.position() as u32;
        self.emit(Instruction::LoopOver)?;
        let exit_patch = self.emit_jump(Instruction::JumpTrue)?;

        self.loop_stack.push(LoopCtx { break_patches: Vec::new() });
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwEnd])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;
        self.expect(TokenKind::KwEnd)?;

        self.emit_jump_to(loop_top)?;
        self.patch_jump(exit_patch);
        let ctx = self.loop_stack.pop().unwrap();
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        self.emit(Instruction::PopCount(2))?;
        self.pop_scope();
        Ok(())
    }

    fn parse_pretest_loop(&mut self) -> Result<(), JinxError> {
        let until = self.check(TokenKind::KwUntil);
        self.advance(); // until|while
        let loop_top = self.writer.position() as u32;
        self.parse_expr()?;
        let exit_patch = if until {
            self.emit_jump(Instruction::JumpTrue)?
        } else {
            self.emit_jump(Instruction::JumpFalse)?
        };

        self.loop_stack.push(LoopCtx { break_patches: Vec::new() });
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwEnd])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;
        self.expect(TokenKind::KwEnd)?;

        self.emit_jump_to(loop_top)?;
        self.patch_jump(exit_patch);
        let ctx = self.loop_stack.pop().unwrap();
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        Ok(())
    }

    /// Bare `loop <block> end` (infinite, needs `break`) or post-test
    /// `loop <block> until|while <expr>` (no trailing `end`).
    fn parse_infinite_or_posttest_loop(&mut self) -> Result<(), JinxError> {
        let loop_top = self.writer.position() as u32;
        self.loop_stack.push(LoopCtx { break_patches: Vec::new() });
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwEnd, TokenKind::KwUntil, TokenKind::KwWhile])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;

        if self.check(TokenKind::KwEnd) {
            self.advance();
            self.emit_jump_to(loop_top)?;
            let ctx = self.loop_stack.pop().unwrap();
            for p in ctx.break_patches {
                self.patch_jump(p);
            }
            return Ok(());
        }

        let until = self.check(TokenKind::KwUntil);
        self.advance(); // until|while
        self.parse_expr()?;
        let back_patch = if until {
            self.emit_jump(Instruction::JumpFalse)?
        } else {
            self.emit_jump(Instruction::JumpTrue)?
        };
        self.patch_jump_to(back_patch, loop_top);
        let ctx = self.loop_stack.pop().unwrap();
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        Ok(())
    }

    fn emit_jump_to(&mut self, target: u32) -> Result<(), JinxError> {
        self.emit(Instruction::Jump(target))
    }

    fn parse_break(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwBreak)?;
        let patch = self.emit_jump(Instruction::Jump)?;
        match self.loop_stack.last_mut() {
            Some(ctx) => ctx.break_patches.push(patch),
            None => return Err(self.err_here("'break' outside of a loop")),
        }
        Ok(())
    }

    // --- return / wait -------------------------------------------------------

    fn parse_return(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwReturn)?;
        if self.check(TokenKind::NewLine) || self.check(TokenKind::Eof) {
            self.emit(Instruction::PushVal(Value::Null))?;
        } else {
            self.parse_expr()?;
        }
        self.emit(Instruction::Return)
    }

    fn parse_wait(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwWait)?;
        if self.check(TokenKind::KwUntil) || self.check(TokenKind::KwWhile) {
            let until = self.check(TokenKind::KwUntil);
            self.advance();
            let loop_top = self.writer.position() as u32;
            self.parse_expr()?;
            let exit_patch = if until {
                self.emit_jump(Instruction::JumpTrue)?
            } else {
                self.emit_jump(Instruction::JumpFalse)?
            };
            self.emit(Instruction::Wait)?;
            self.emit_jump_to(loop_top)?;
            self.patch_jump(exit_patch);
            Ok(())
        } else {
            self.emit(Instruction::Wait)
        }
    }

    // --- increment / decrement, as statement or expression ------------------

    fn parse_inc_dec_statement(&mut self) -> Result<(), JinxError> {
        self.emit_inc_dec_expr()?;
        self.emit(Instruction::Pop)
    }

    /// `increment <name> [by <expr>]` / `decrement <name> [by <expr>]`,
    /// leaving the new value on the stack (so it composes as an expression,
    /// per `false and increment x by 1 > 0`).
    fn emit_inc_dec_expr(&mut self) -> Result<(), JinxError> {
        let is_increment = self.check(TokenKind::KwIncrement);
        self.advance();
        let name_tok = self.expect(TokenKind::Identifier)?;
        let target = self.resolve_assignment_target(&name_tok)?;
        self.push_target_value(&target)?;
        if self.check(TokenKind::KwBy) {
            self.advance();
            self.parse_expr()?;
        } else {
            self.emit(Instruction::PushVal(Value::Integer(1)))?;
        }
        if is_increment {
            self.emit(Instruction::Increment)?;
        } else {
            self.emit(Instruction::Decrement)?;
        }
        self.emit(Instruction::PushTop)?;
        self.write_back(&target)?;
        Ok(())
    }

    fn resolve_assignment_target(&mut self, name_tok: &Token) -> Result<AssignTarget, JinxError> {
        if let Some(id) = self.lookup_variable(&name_tok.text) {
            Ok(AssignTarget::Variable(id))
        } else if let Some(prop) = self.lookup_property(&name_tok.text) {
            Ok(AssignTarget::Property(prop.id))
        } else {
            Err(self.err_here(format!("unknown identifier '{}'", name_tok.text)))
        }
    }

    fn push_target_value(&mut self, target: &AssignTarget) -> Result<(), JinxError> {
        match target {
            AssignTarget::Variable(id) => self.emit(Instruction::PushVar(*id)),
            AssignTarget::Property(id) => self.emit(Instruction::PushProp(*id)),
        }
    }

    fn write_back(&mut self, target: &AssignTarget) -> Result<(), JinxError> {
        match target {
            AssignTarget::Variable(id) => self.emit(Instruction::SetVar(*id)),
            AssignTarget::Property(id) => self.emit(Instruction::SetProp(*id)),
        }
    }

    // --- begin block ----------------------------------------------------------

    fn parse_begin(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::KwBegin)?;
        self.emit(Instruction::ScopeBegin)?;
        self.push_scope();
        self.parse_block(&[TokenKind::KwEnd])?;
        self.pop_scope();
        self.emit(Instruction::ScopeEnd)?;
        self.expect(TokenKind::KwEnd)?;
        Ok(())
    }

    // --- function definition ---------------------------------------------------

    fn parse_function_def(&mut self) -> Result<(), JinxError> {
        let visibility = if self.check(TokenKind::KwPublic) {
            self.advance();
            Visibility::Public
        } else if self.check(TokenKind::KwPrivate) {
            self.advance();
            Visibility::Private
        } else {
            Visibility::Public
        };
        self.expect(TokenKind::TypeFunction)?;
        let (parts, param_names, param_types) = self.parse_signature_line()?;
        let signature = FunctionSignature::new(&self.current_library, visibility, parts)
            .map_err(|e| self.err_here(e.to_string()))?;

        // Emitting the `Function` declaration instruction (rather than only
        // registering the signature in `registry` below) keeps the
        // bytecode self-describing: a `Script` built directly from a
        // previously compiled buffer, with no parser pass, can still walk
        // its own instructions to recover declared signatures.
        self.emit(Instruction::Function(signature.clone()))?;
        let jump_patch = self.emit_jump(Instruction::Jump)?;
        let entry_pc = self.writer.position() as u32;

        self.push_scope();
        for (i, name) in param_names.iter().enumerate() {
            let id = self.declare_variable(name);
            self.emit(Instruction::SetIndex {
                id,
                stack_index: i as i32,
                value_type: param_types[i],
            })?;
        }
        self.skip_newlines();
        self.parse_block(&[TokenKind::KwEnd])?;
        self.expect(TokenKind::KwEnd)?;
        self.pop_scope();
        // Implicit `return null` if control falls off the end of the body.
        self.emit(Instruction::PushVal(Value::Null))?;
        self.emit(Instruction::Return)?;

        self.patch_jump(jump_patch);
        self.pending_functions.push(PendingFunction { signature, entry_pc });
        Ok(())
    }

    /// Script-defined function signatures are a sequence of bare words
    /// (single-alternative, non-optional name parts) and `{ [type] name }`
    /// parameter slots, ending at newline. The alternates/optional-name-part
    /// machinery `FunctionSignature` supports is reachable through host
    /// (native) registration, not through this surface syntax — spec.md's
    /// grammar sketch gives the opcode-level model but not a concrete
    /// textual notation for alternates, so script authors get the common
    /// case and native registrars get the full generality. See `DESIGN.md`.
    fn parse_signature_line(&mut self) -> Result<(Vec<SignaturePart>, Vec<String>, Vec<ValueType>), JinxError> {
        let mut parts = Vec::new();
        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        loop {
            if self.check(TokenKind::NewLine) || self.check(TokenKind::Eof) {
                break;
            }
            if self.check(TokenKind::LBrace) {
                self.advance();
                let ty = self.try_parse_type_keyword();
                let name_tok = self.expect(TokenKind::Identifier)?;
                self.expect(TokenKind::RBrace)?;
                parts.push(SignaturePart::Param(ParamSlot {
                    param_type: ty,
                    name: Some(name_tok.text.clone()),
                }));
                param_names.push(name_tok.text);
                param_types.push(ty.unwrap_or(ValueType::Any));
            } else {
                let tok = self.advance();
                parts.push(SignaturePart::Name(NamePart::new(vec![tok.text], false)));
            }
        }
        Ok((parts, param_names, param_types))
    }

    fn try_parse_type_keyword(&mut self) -> Option<ValueType> {
        let ty = match self.cur().kind {
            TokenKind::TypeNumber => ValueType::Number,
            TokenKind::TypeInteger => ValueType::Integer,
            TokenKind::TypeBoolean => ValueType::Boolean,
            TokenKind::TypeString => ValueType::String,
            TokenKind::TypeCollection => ValueType::Collection,
            TokenKind::TypeCoroutine => ValueType::Coroutine,
            TokenKind::TypeFunction => ValueType::Function,
            TokenKind::TypeGuid => ValueType::Guid,
            TokenKind::TypeObject => ValueType::UserObject,
            _ => return None,
        };
        self.advance();
        Some(ty)
    }

    // --- expression statement -------------------------------------------------

    fn parse_expression_statement(&mut self) -> Result<(), JinxError> {
        self.parse_expr()?;
        self.emit(Instruction::Pop)
    }

    // --- expression precedence chain -------------------------------------------

    fn parse_expr(&mut self) -> Result<(), JinxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<(), JinxError> {
        self.parse_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            self.parse_and()?;
            self.emit(Instruction::Or)?;
        }
        Ok(())
    }

    fn parse_and(&mut self) -> Result<(), JinxError> {
        self.parse_not()?;
        while self.check(TokenKind::And) {
            self.advance();
            self.parse_not()?;
            self.emit(Instruction::And)?;
        }
        Ok(())
    }

    fn parse_not(&mut self) -> Result<(), JinxError> {
        if self.check(TokenKind::Not) {
            self.advance();
            if self.check(TokenKind::Not) {
                return Err(self.err_here("'not not' is not a valid expression"));
            }
            self.parse_rel()?;
            self.emit(Instruction::Not)?;
            Ok(())
        } else {
            self.parse_rel()
        }
    }

    fn parse_rel(&mut self) -> Result<(), JinxError> {
        self.parse_add()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Equals => Instruction::Equals,
                TokenKind::NotEquals => Instruction::NotEquals,
                TokenKind::Less => Instruction::Less,
                TokenKind::LessEq => Instruction::LessEq,
                TokenKind::Greater => Instruction::Greater,
                TokenKind::GreaterEq => Instruction::GreaterEq,
                _ => break,
            };
            self.advance();
            self.parse_add()?;
            self.emit(op)?;
        }
        Ok(())
    }

    fn parse_add(&mut self) -> Result<(), JinxError> {
        self.parse_mul()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Plus => Instruction::Add,
                TokenKind::Minus => Instruction::Subtract,
                _ => break,
            };
            self.advance();
            self.parse_mul()?;
            self.emit(op)?;
        }
        Ok(())
    }

    fn parse_mul(&mut self) -> Result<(), JinxError> {
        self.parse_unary()?;
        loop {
            let op = match self.cur().kind {
                TokenKind::Star => Instruction::Multiply,
                TokenKind::Slash => Instruction::Divide,
                TokenKind::Percent => Instruction::Mod,
                _ => break,
            };
            self.advance();
            self.parse_unary()?;
            self.emit(op)?;
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<(), JinxError> {
        if self.check(TokenKind::Minus) {
            self.advance();
            self.parse_unary()?;
            self.emit(Instruction::Negate)?;
            Ok(())
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<(), JinxError> {
        self.parse_primary()?;
        loop {
            if self.check(TokenKind::LBracket) {
                self.advance();
                self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                self.emit(Instruction::PushKeyVal)?;
                continue;
            }
            if self.check(TokenKind::KwAs) {
                self.advance();
                // `as type` is `Instruction::Type` (replace top with its own
                // ValueType tag), distinct from `as number`/`as string`/...
                // which convert the value via `Instruction::Cast`.
                if self.check(TokenKind::KwType) {
                    self.advance();
                    self.emit(Instruction::Type)?;
                    continue;
                }
                let ty = self
                    .try_parse_type_keyword()
                    .ok_or_else(|| self.err_here("expected a type name after 'as'"))?;
                self.emit(Instruction::Cast(ty))?;
                continue;
            }
            if self.try_parse_accessor_call()? {
                continue;
            }
            break;
        }
        Ok(())
    }

    /// `it value`, `co is finished`, `co value` (the possessive `'s` is
    /// already gone by the time the lexer hands us tokens — spec.md's
    /// lexer discards it, so `it's value` and `it value` are the same
    /// token stream). These read as a one-parameter function call whose
    /// parameter is the expression already sitting on the stack from
    /// `parse_primary`, not as a fresh sub-expression — so unlike
    /// `try_parse_call`, this never recurses into `parse_expr` for the
    /// leading parameter; it only matches the trailing `Name` parts of a
    /// single-leading-`Param` signature against what follows.
    fn try_parse_accessor_call(&mut self) -> Result<bool, JinxError> {
        let start_pos = self.pos;
        for tier in self.candidate_tiers() {
            let mut matches: Vec<(FunctionSignature, usize)> = Vec::new();
            for sig in &tier {
                let is_leading_param_only = matches!(sig.parts.first(), Some(SignaturePart::Param(_)))
                    && sig.parts[1..].iter().all(|p| matches!(p, SignaturePart::Name(_)));
                if !is_leading_param_only || sig.parts.len() < 2 {
                    continue;
                }
                self.pos = start_pos;
                if self.attempt_name_parts(&sig.parts[1..])? {
                    matches.push((sig.clone(), self.pos));
                }
            }
            if matches.is_empty() {
                continue;
            }
            let max_end = matches.iter().map(|(_, e)| *e).max().unwrap();
            let winners: Vec<_> = matches.into_iter().filter(|(_, e)| *e == max_end).collect();
            if winners.len() > 1 {
                self.pos = start_pos;
                return Err(self.err_here("ambiguous function call: more than one signature matches"));
            }
            let (winner, _) = winners.into_iter().next().unwrap();
            self.pos = start_pos;
            self.attempt_name_parts(&winner.parts[1..])?;
            self.emit(Instruction::CallFunc(winner.id))?;
            return Ok(true);
        }
        self.pos = start_pos;
        Ok(false)
    }

    /// Match a sequence of `Name`-only signature parts (no `Param`) against
    /// tokens at `self.pos`, consuming as they match. Used by
    /// `try_parse_accessor_call`, which has already filtered its candidates
    /// down to signatures with no `Param` among `parts`.
    fn attempt_name_parts(&mut self, parts: &[SignaturePart]) -> Result<bool, JinxError> {
        for part in parts {
            let SignaturePart::Name(n) = part else {
                continue;
            };
            let tok = self.cur();
            let is_word = !matches!(
                tok.kind,
                TokenKind::NewLine | TokenKind::Eof | TokenKind::Comma | TokenKind::RParen | TokenKind::RBracket
            );
            if is_word && n.matches(&tok.text) {
                self.advance();
            } else if n.optional {
                // skip
            } else {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn parse_primary(&mut self) -> Result<(), JinxError> {
        match self.cur().kind {
            TokenKind::IntegerLiteral => {
                let tok = self.advance();
                let Some(Literal::Int(v)) = tok.literal else { unreachable!() };
                self.emit(Instruction::PushVal(Value::Integer(v)))
            }
            TokenKind::NumberLiteral => {
                let tok = self.advance();
                let Some(Literal::Num(v)) = tok.literal else { unreachable!() };
                self.emit(Instruction::PushVal(Value::Number(v)))
            }
            TokenKind::BooleanLiteral => {
                let tok = self.advance();
                let Some(Literal::Bool(v)) = tok.literal else { unreachable!() };
                self.emit(Instruction::PushVal(Value::Boolean(v)))
            }
            TokenKind::NullLiteral => {
                self.advance();
                self.emit(Instruction::PushVal(Value::Null))
            }
            TokenKind::StringLiteral => {
                let tok = self.advance();
                let Some(Literal::Str(s)) = tok.literal else { unreachable!() };
                self.emit(Instruction::PushVal(Value::String(s)))
            }
            TokenKind::LParen => {
                self.advance();
                self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(())
            }
            TokenKind::LBracket => self.parse_collection_literal(),
            TokenKind::KwIncrement | TokenKind::KwDecrement => self.emit_inc_dec_expr(),
            TokenKind::KwAsync => {
                self.advance();
                // `async call <name>` reads naturally in source but `call`
                // carries no grammar of its own (spec.md's core library
                // lists it only as a built-in name, not a keyword) — treat
                // it as an optional filler word so the real match happens
                // against the function name that follows, with CallAsync.
                if self.check(TokenKind::Identifier) && self.cur().text == "call" {
                    self.advance();
                }
                if !self.try_parse_call(true)? {
                    return Err(self.err_here("'async' must be followed by a function call"));
                }
                Ok(())
            }
            TokenKind::Identifier => {
                let tok = self.cur().clone();
                if let Some(id) = self.lookup_variable(&tok.text) {
                    self.advance();
                    return self.emit(Instruction::PushVar(id));
                }
                if let Some(prop) = self.lookup_property(&tok.text) {
                    self.advance();
                    return self.emit(Instruction::PushProp(prop.id));
                }
                if self.try_parse_call(false)? {
                    return Ok(());
                }
                Err(self.err_here(format!("unknown identifier or unmatched call '{}'", tok.text)))
            }
            _ => {
                if self.try_parse_call(false)? {
                    return Ok(());
                }
                Err(self.err_here(format!("unexpected token '{}'", self.cur().text)))
            }
        }
    }

    /// `[...]` literal. Per spec §3 "Empty `[]` is an empty collection"; a
    /// non-empty body's element count parity decides whether it's read as
    /// `key, value, key, value, ...` pairs (even count, `PushColl`) or a
    /// positional list auto-indexed 1..n (odd count, `PushList`) — spec.md's
    /// wording ("a comma-separated subexpression list builds an
    /// auto-indexed list") doesn't give a concrete token that distinguishes
    /// the two forms, so parity is this engine's disambiguator; see
    /// `DESIGN.md`.
    fn parse_collection_literal(&mut self) -> Result<(), JinxError> {
        self.expect(TokenKind::LBracket)?;
        let mut count = 0u32;
        if !self.check(TokenKind::RBracket) {
            loop {
                self.parse_expr()?;
                count += 1;
                if self.check(TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        if count == 0 {
            self.emit(Instruction::PushList(0))
        } else if count % 2 == 0 {
            self.emit(Instruction::PushColl(count / 2))
        } else {
            self.emit(Instruction::PushList(count))
        }
    }

    // --- function-call matching --------------------------------------------------

    /// Gather function-call candidates in spec §4.2's tiering order: local
    /// (in-script) functions first, then the current library, then each
    /// imported library in import order. Private signatures from a library
    /// other than the current one are never candidates.
    ///
    /// A library's candidates are the union of what's already registered in
    /// `registry` (from an earlier compile) and what this same compile has
    /// declared so far but not yet registered (`pending_functions` only
    /// becomes real registry entries once the whole buffer is finalized, at
    /// the end of `parse_program`) — otherwise a script couldn't call its
    /// own public function declared a few statements earlier.
    fn candidate_tiers(&self) -> Vec<Vec<FunctionSignature>> {
        let mut tiers = Vec::new();
        let local: Vec<_> = self
            .pending_functions
            .iter()
            .map(|p| p.signature.clone())
            .filter(|s| s.visibility == Visibility::Local)
            .collect();
        if !local.is_empty() {
            tiers.push(local);
        }
        let visible = |s: &FunctionSignature, lib: &str| {
            s.visibility != Visibility::Private || s.library == lib
        };
        let pending_for = |lib: &str| {
            self.pending_functions
                .iter()
                .map(|p| p.signature.clone())
                .filter(|s| s.visibility != Visibility::Local && s.library == lib)
        };
        let current: Vec<_> = self
            .registry
            .functions_in_library(&self.current_library)
            .into_iter()
            .chain(pending_for(&self.current_library))
            .filter(|s| visible(s, &self.current_library))
            .collect();
        if !current.is_empty() {
            tiers.push(current);
        }
        for lib in self.imports.clone() {
            let imported: Vec<_> = self
                .registry
                .functions_in_library(&lib)
                .into_iter()
                .chain(pending_for(&lib))
                .filter(|s| visible(s, &self.current_library))
                .collect();
            if !imported.is_empty() {
                tiers.push(imported);
            }
        }
        tiers
    }

    /// Try to match and emit a function call starting at the current token.
    /// Returns `Ok(false)` if no candidate signature matches at all (the
    /// caller falls back to treating the leading token as an unresolved
    /// identifier). A genuine parse error inside a matched parameter slot's
    /// expression is propagated rather than silently discarded — once a
    /// candidate's name parts have matched, a syntax error in its argument
    /// is a real error, not grounds to try another candidate.
    fn try_parse_call(&mut self, as_async: bool) -> Result<bool, JinxError> {
        let start_pos = self.pos;
        let start_len = self.writer.position();
        for tier in self.candidate_tiers() {
            let mut matches: Vec<(FunctionSignature, usize)> = Vec::new();
            for sig in &tier {
                self.pos = start_pos;
                let before = self.writer.position();
                match self.attempt_signature(sig) {
                    Ok(true) => matches.push((sig.clone(), self.pos)),
                    Ok(false) => {}
                    Err(e) => {
                        self.writer.truncate(before);
                        self.pos = start_pos;
                        return Err(e);
                    }
                }
                self.writer.truncate(before);
            }
            if matches.is_empty() {
                continue;
            }
            let max_end = matches.iter().map(|(_, e)| *e).max().unwrap();
            let winners: Vec<_> = matches.into_iter().filter(|(_, e)| *e == max_end).collect();
            if winners.len() > 1 {
                self.pos = start_pos;
                self.writer.truncate(start_len);
                return Err(self.err_here("ambiguous function call: more than one signature matches"));
            }
            let (winner, _) = winners.into_iter().next().unwrap();
            self.pos = start_pos;
            self.attempt_signature(&winner)?;
            if as_async {
                self.emit(Instruction::CallAsync(winner.id))?;
            } else {
                self.emit(Instruction::CallFunc(winner.id))?;
            }
            return Ok(true);
        }
        self.pos = start_pos;
        self.writer.truncate(start_len);
        Ok(false)
    }

    /// Walk `sig`'s parts against tokens starting at `self.pos`, consuming
    /// tokens and emitting parameter-slot expressions as it goes. Leaves
    /// `self.pos` at the first token past the match on success.
    fn attempt_signature(&mut self, sig: &FunctionSignature) -> Result<bool, JinxError> {
        for part in &sig.parts {
            match part {
                SignaturePart::Name(n) => {
                    let tok = self.cur();
                    let is_word = !matches!(
                        tok.kind,
                        TokenKind::NewLine
                            | TokenKind::Eof
                            | TokenKind::Comma
                            | TokenKind::RParen
                            | TokenKind::RBracket
                    );
                    if is_word && n.matches(&tok.text) {
                        self.advance();
                    } else if n.optional {
                        // skip
                    } else {
                        return Ok(false);
                    }
                }
                SignaturePart::Param(_) => {
                    if matches!(
                        self.cur().kind,
                        TokenKind::NewLine | TokenKind::Eof | TokenKind::Comma | TokenKind::RParen | TokenKind::RBracket
                    ) {
                        return Ok(false);
                    }
                    self.parse_expr()?;
                    if self.check(TokenKind::Comma) {
                        self.advance();
                    }
                }
            }
        }
        Ok(true)
    }
}

/// Resolved target of an assignment-style write (`set`, `increment`,
/// `decrement`): either a scoped variable or a registered property.
enum AssignTarget {
    Variable(u64),
    Property(u64),
}

/// Parse a complete script's tokens into bytecode, registering any function
/// and property declarations it contains in `registry`.
pub fn parse(tokens: Vec<Token>, registry: &SymbolTable, script_name: &str) -> Result<CompiledScript, JinxError> {
    Parser::new(tokens, registry, script_name).parse_program()
}

/// `parse`, seeding the import list with `extra_imports` before the token
/// stream's own leading `import` lines are read, per `compile_with_imports`.
pub fn parse_with_imports(
    tokens: Vec<Token>,
    registry: &SymbolTable,
    script_name: &str,
    extra_imports: &[String],
) -> Result<CompiledScript, JinxError> {
    let mut parser = Parser::new(tokens, registry, script_name);
    parser.imports.extend(extra_imports.iter().cloned());
    parser.parse_program()
}

fn type_keyword(kind: TokenKind) -> Option<ValueType> {
    Some(match kind {
        TokenKind::TypeNumber => ValueType::Number,
        TokenKind::TypeInteger => ValueType::Integer,
        TokenKind::TypeBoolean => ValueType::Boolean,
        TokenKind::TypeString => ValueType::String,
        TokenKind::TypeCollection => ValueType::Collection,
        TokenKind::TypeCoroutine => ValueType::Coroutine,
        TokenKind::TypeFunction => ValueType::Function,
        TokenKind::TypeGuid => ValueType::Guid,
        TokenKind::TypeObject => ValueType::UserObject,
        _ => return None,
    })
}

/// Parse a host-supplied signature string (e.g. `"write {value}"`) into
/// signature parts, sharing `parse_signature_line`'s bare-word / `{ [type]
/// name }` grammar so native and script-defined functions read the same way
/// (spec §4.4: the Runtime registers native and bytecode functions into the
/// same signature table). Used by `jinx-runtime`'s `Library::register_*`.
pub fn parse_native_signature(text: &str) -> Result<Vec<SignaturePart>, JinxError> {
    let keywords = crate::lexer::keyword_table();
    let tokens = crate::lexer::tokenize(text, "<native-signature>", &keywords)?;
    let mut parts = Vec::new();
    let mut i = 0;
    while i < tokens.len() && !matches!(tokens[i].kind, TokenKind::Eof | TokenKind::NewLine) {
        if tokens[i].kind == TokenKind::LBrace {
            i += 1;
            let param_type = tokens.get(i).and_then(|t| type_keyword(t.kind));
            if param_type.is_some() {
                i += 1;
            }
            let name_tok = tokens.get(i).cloned().ok_or_else(|| {
                JinxError::syntax("unterminated parameter slot in native signature", SourcePos::new(1, 1))
            })?;
            i += 1;
            if tokens.get(i).map(|t| t.kind) != Some(TokenKind::RBrace) {
                return Err(JinxError::syntax(
                    "expected '}' in native signature",
                    SourcePos::new(1, 1),
                ));
            }
            i += 1;
            parts.push(SignaturePart::Param(ParamSlot {
                param_type,
                name: Some(name_tok.text),
            }));
        } else {
            parts.push(SignaturePart::Name(NamePart::new(vec![tokens[i].text.clone()], false)));
            i += 1;
        }
    }
    Ok(parts)
}
