//! Jinx Runtime: the host-facing `Runtime`/`Library` API, the `Script`
//! stack machine, and the coroutine model (spec §4.3, §4.4, §6).
//!
//! This crate is the thing an embedding host actually links against. It
//! wraps `jinx-core`'s `SymbolTable` with performance counters and the
//! `compile`/`create_script`/`strip_debug_info` entry points, and it owns
//! the only opcode interpreter in the workspace — `jinx-compiler` only
//! ever *writes* bytecode, never runs it.

pub mod config;
pub mod coroutine;
pub mod corelib;
pub mod logging;
pub mod registry;
pub mod vm;

pub use config::EngineConfig;
pub use coroutine::Coroutine;
pub use registry::{Library, Runtime};
pub use vm::Script;
