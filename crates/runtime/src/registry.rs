//! The host-facing `Runtime`/`Library` API (spec §4.4, §6 "Host API").
//!
//! `Runtime` wraps `jinx-core`'s `SymbolTable` with the performance counters
//! spec §4.4 describes ("compilation time, execution time, instruction
//! count, counts of compiles / executions / completions") and the
//! `compile`/`create_script`/`strip_debug_info` entry points a host actually
//! calls. `Library` is the scoped handle `Runtime::get_library` hands back
//! for registering native functions and properties against one library.

use std::any::Any;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jinx_core::bytecode::{ByteCodeReader, ByteCodeWriter, Header, HEADER_LEN};
use jinx_core::error::JinxError;
use jinx_core::registry::{FunctionBody, FunctionEntry, NativeFn, SymbolTable};
use jinx_core::signature::{FunctionSignature, PropertyName, Visibility};
use jinx_core::value::Value;
use jinx_compiler::parse_native_signature;

use crate::config::{EngineConfig, LogLevel};
use crate::logging;
use crate::vm::Script;

/// Snapshot of the Runtime's performance counters (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    pub compile_count: u64,
    pub execution_count: u64,
    pub completion_count: u64,
    pub instructions_executed: u64,
    pub total_compile_time: Duration,
    pub total_execution_time: Duration,
}

pub(crate) type SharedStats = Arc<Mutex<PerformanceStats>>;

/// The top-level engine object: owns the shared symbol table and the
/// counters every `Script` it creates reports back into.
pub struct Runtime {
    registry: Arc<SymbolTable>,
    config: EngineConfig,
    stats: SharedStats,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Self {
        let runtime = Runtime {
            registry: Arc::new(SymbolTable::new()),
            config,
            stats: Arc::new(Mutex::new(PerformanceStats::default())),
        };
        crate::corelib::install(&runtime);
        runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `Runtime.compile(text, name, imports) -> Bytecode`: lex, optionally
    /// log the token/symbol count, parse into the shared registry, optionally
    /// log the instruction count, then wrap the raw instruction stream in
    /// the `'JINX'` header (and an optional debug section) for serialization.
    pub fn compile(&self, source: &str, name: &str, imports: &[String]) -> Result<Vec<u8>, JinxError> {
        let start = Instant::now();
        if self.config.log_symbols {
            logging::emit(
                self.config.enable_logging,
                &self.config.log_fn,
                LogLevel::Info,
                &format!("compiling '{name}' ({} source bytes)", source.len()),
            );
        }
        // `core` (write/size/empty/value/key/is finished) is always in
        // scope: spec §8's own scenarios call these without an `import`
        // line, so a script sees them the way it sees its own keywords,
        // not as an opt-in library. Listed first so an explicit host
        // import of `core` itself is simply a harmless duplicate.
        let mut all_imports = Vec::with_capacity(imports.len() + 1);
        all_imports.push("core".to_string());
        all_imports.extend(imports.iter().cloned());
        let compiled = jinx_compiler::compile_with_imports(source, name, &self.registry, &all_imports)?;
        if self.config.log_bytecode {
            logging::emit(
                self.config.enable_logging,
                &self.config.log_fn,
                LogLevel::Info,
                &format!("'{name}' compiled to {} instruction bytes", compiled.buffer.len()),
            );
        }

        let mut writer = ByteCodeWriter::new();
        let data_size = (ByteCodeWriter::encoded_string_len(name) + compiled.buffer.len()) as u32;
        Header::write(&mut writer, data_size, name);
        let mut out = writer.into_bytes();
        out.extend_from_slice(&compiled.buffer);
        if self.config.enable_debug_info {
            // No per-instruction line table is threaded through emission
            // (see DESIGN.md); an empty, present debug section is still
            // enough for `strip_debug_info` to have something to strip.
            let mut dbg = ByteCodeWriter::new();
            dbg.write_u32(jinx_core::bytecode::DEBUG_SIGNATURE);
            dbg.write_u32(1); // debug section version
            dbg.write_u32(0); // zero line-table entries
            out.extend_from_slice(&dbg.into_bytes());
        }

        let mut stats = self.stats.lock().unwrap();
        stats.compile_count += 1;
        stats.total_compile_time += start.elapsed();
        Ok(out)
    }

    /// `Runtime.create_script(bytecode, userContext) -> Script`: validate the
    /// header, skip the script-name field, slice off the instruction
    /// section, hand it to a fresh `Script` at its entry point (always
    /// offset 0 in the raw instruction stream).
    pub fn create_script(&self, bytecode: &[u8], user_context: Rc<dyn Any>) -> Result<Script, JinxError> {
        let mut reader = ByteCodeReader::new(bytecode);
        let header = Header::read(&mut reader)?;
        let instructions_start = reader.position();
        let data_end = HEADER_LEN + header.data_size as usize;
        if data_end > bytecode.len() || instructions_start > data_end {
            return Err(JinxError::format("bytecode data_size exceeds buffer length"));
        }
        let code = Rc::new(bytecode[instructions_start..data_end].to_vec());
        Ok(Script::new(
            code,
            0,
            self.registry.clone(),
            user_context,
            self.config.clone(),
            self.stats.clone(),
        ))
    }

    /// `Runtime.execute_script(text, userContext, name, imports) -> Script`:
    /// compile, create, and drive exactly one slice.
    pub fn execute_script(
        &self,
        source: &str,
        user_context: Rc<dyn Any>,
        name: &str,
        imports: &[String],
    ) -> Result<Script, JinxError> {
        let bytecode = self.compile(source, name, imports)?;
        let mut script = self.create_script(&bytecode, user_context)?;
        script.execute();
        Ok(script)
    }

    pub fn strip_debug_info(&self, bytecode: &[u8]) -> Result<Vec<u8>, JinxError> {
        jinx_core::bytecode::strip_debug_info(bytecode)
    }

    /// `Runtime.get_library(name) -> Library` (create-if-absent).
    pub fn get_library(&self, name: &str) -> Library {
        self.registry.get_or_create_library(name);
        Library {
            registry: self.registry.clone(),
            name: name.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn registry_for_test(&self) -> Arc<SymbolTable> {
        self.registry.clone()
    }

    pub fn get_performance_stats(&self, reset: bool) -> PerformanceStats {
        let mut stats = self.stats.lock().unwrap();
        let snapshot = stats.clone();
        if reset {
            *stats = PerformanceStats::default();
        }
        snapshot
    }
}

/// A scoped handle for registering native functions and properties against
/// one library (spec §6: `Library.register_function`, `.register_property`,
/// `.get_property`/`.set_property`).
pub struct Library {
    registry: Arc<SymbolTable>,
    name: String,
}

impl Library {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Library.register_function(visibility, signatureText, callback)`.
    /// `signatureText` uses the same bare-word / `{ [type] name }` grammar a
    /// script's own `function` declaration does (see
    /// `jinx_compiler::parse_native_signature`).
    pub fn register_function(
        &self,
        visibility: Visibility,
        signature_text: &str,
        callback: NativeFn,
    ) -> Result<u64, JinxError> {
        let parts = parse_native_signature(signature_text)?;
        let signature = FunctionSignature::new(&self.name, visibility, parts)
            .map_err(|e| JinxError::resolution(e.to_string()))?;
        self.registry.register_function(FunctionEntry {
            signature,
            body: FunctionBody::Native(callback),
        })
    }

    /// `Library.register_property(visibility, access, name, default)`.
    /// `read_only` is spec's "access" (read-write vs. read-only).
    pub fn register_property(
        &self,
        visibility: Visibility,
        read_only: bool,
        name: &str,
        default: Value,
    ) -> Result<u64, JinxError> {
        let prop = PropertyName::new(&self.name, name, visibility, read_only);
        self.registry.register_property(prop, default)
    }

    fn property_id(&self, name: &str) -> u64 {
        jinx_core::hash::hash64(&format!("{} {}", self.name, name))
    }

    pub fn get_property(&self, name: &str) -> Option<Value> {
        self.registry.property_value(self.property_id(name))
    }

    pub fn set_property(&self, name: &str, value: Value) -> Result<(), JinxError> {
        self.registry.set_property_value(self.property_id(name), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct NoContext;

    #[test]
    fn compile_then_create_script_round_trips_through_header() {
        let rt = Runtime::new(EngineConfig::new());
        let bytecode = rt.compile("set a to 1\nset b to a + 1\n", "t", &[]).unwrap();
        let script = rt.create_script(&bytecode, Rc::new(NoContext));
        assert!(script.is_ok());
    }

    #[test]
    fn strip_debug_info_shrinks_buffer_with_debug_section_enabled() {
        let rt = Runtime::new(EngineConfig::new().with_debug_info(true));
        let bytecode = rt.compile("set a to 1\n", "t", &[]).unwrap();
        let stripped = rt.strip_debug_info(&bytecode).unwrap();
        assert!(stripped.len() < bytecode.len());
    }

    #[test]
    fn get_performance_stats_tracks_compiles_and_resets() {
        let rt = Runtime::new(EngineConfig::new());
        rt.compile("set a to 1\n", "t", &[]).unwrap();
        rt.compile("set b to 2\n", "t2", &[]).unwrap();
        let stats = rt.get_performance_stats(true);
        assert_eq!(stats.compile_count, 2);
        let after_reset = rt.get_performance_stats(false);
        assert_eq!(after_reset.compile_count, 0);
    }

    #[test]
    fn library_registers_and_reads_a_property() {
        let rt = Runtime::new(EngineConfig::new());
        let lib = rt.get_library("demo");
        lib.register_property(Visibility::Public, false, "count", Value::Integer(0))
            .unwrap();
        assert!(matches!(lib.get_property("count"), Some(Value::Integer(0))));
        lib.set_property("count", Value::Integer(5)).unwrap();
        assert!(matches!(lib.get_property("count"), Some(Value::Integer(5))));
    }
}
