//! Jinx Core: shared value model, bytecode I/O, and symbol tables.
//!
//! This crate provides the language-agnostic primitives shared by the
//! lexer/parser (`jinx-compiler`) and the virtual machine (`jinx-runtime`):
//!
//! - `value`: the dynamic `Value`/`Variant` and its arithmetic/comparison/
//!   coercion rules.
//! - `bytecode`: positioned read/write over a growable buffer, plus the
//!   fixed bytecode container layout (header, debug section).
//! - `opcode`: the instruction set both the emitter and the VM agree on.
//! - `signature`: function signatures and property names, with their
//!   stable-ID computation.
//! - `hash` / `casefold`: the small deterministic primitives IDs and
//!   identifier comparison are built on.
//! - `registry`: the shared, lock-protected symbol tables (libraries,
//!   functions, properties) consulted at both compile time and run time.
//! - `error`: the engine-wide error taxonomy (spec §7).
//! - `alloc`: the host memory-accounting hook (spec §6).

pub mod alloc;
pub mod bytecode;
pub mod casefold;
pub mod error;
pub mod hash;
pub mod opcode;
pub mod registry;
pub mod signature;
pub mod value;

pub use alloc::{AllocHooks, SystemAllocHooks};
pub use error::{JinxError, JinxResult, SourcePos};
pub use hash::variable_id;
pub use opcode::Instruction;
pub use signature::{FunctionSignature, NamePart, ParamSlot, PropertyName, SignaturePart, Visibility};
pub use value::{CollectionRef, CoroutineObject, CoroutineRef, Guid, Iterator_, Key, Value, ValueMap, ValueType};
