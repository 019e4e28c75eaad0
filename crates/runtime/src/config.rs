//! Engine-wide configuration (spec §6 "Configuration").
//!
//! Mirrors the teacher's `CompilerConfig` builder (`compiler/src/config.rs`):
//! a small `with_*` fluent API over a plain struct, validated as it's built
//! rather than at the point of use.

use jinx_core::alloc::{AllocHooks, SystemAllocHooks};
use std::rc::Rc;
use std::sync::Arc;

/// Severity of a message passed to a host-installed [`LogFn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Host callback for engine log messages. `Arc` (not `Rc`) because a
/// `Runtime` is the one piece of this engine spec §5 allows to be shared
/// across threads ("multiple scripts may be compiled ... in parallel").
pub type LogFn = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Tunables a host may set before creating a `Runtime` (spec §6
/// "Configuration recognized options").
#[derive(Clone)]
pub struct EngineConfig {
    /// Instruction budget per `execute_slice` call before the VM either
    /// errors (`error_on_max_instructions`) or cooperatively suspends.
    pub max_instructions: u32,
    pub error_on_max_instructions: bool,
    pub enable_logging: bool,
    pub log_fn: Option<LogFn>,
    pub log_symbols: bool,
    pub log_bytecode: bool,
    pub enable_debug_info: bool,
    pub alloc_hooks: Rc<dyn AllocHooks>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("max_instructions", &self.max_instructions)
            .field("error_on_max_instructions", &self.error_on_max_instructions)
            .field("enable_logging", &self.enable_logging)
            .field("log_symbols", &self.log_symbols)
            .field("log_bytecode", &self.log_bytecode)
            .field("enable_debug_info", &self.enable_debug_info)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_instructions: 2000,
            error_on_max_instructions: false,
            enable_logging: true,
            log_fn: None,
            log_symbols: false,
            log_bytecode: false,
            enable_debug_info: true,
            alloc_hooks: Rc::new(SystemAllocHooks),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig::default()
    }

    /// Per-slice instruction budget. Must be nonzero; `0` is silently
    /// raised to `1` rather than producing a VM that can never take a step.
    pub fn with_max_instructions(mut self, max: u32) -> Self {
        self.max_instructions = max.max(1);
        self
    }

    /// Whether exceeding `max_instructions` in one slice is a `Quota` error
    /// (`true`) or just a cooperative suspension point (`false`, default).
    pub fn with_error_on_max_instructions(mut self, error: bool) -> Self {
        self.error_on_max_instructions = error;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_log_fn(mut self, f: LogFn) -> Self {
        self.log_fn = Some(f);
        self
    }

    pub fn with_log_symbols(mut self, enabled: bool) -> Self {
        self.log_symbols = enabled;
        self
    }

    pub fn with_log_bytecode(mut self, enabled: bool) -> Self {
        self.log_bytecode = enabled;
        self
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.enable_debug_info = enabled;
        self
    }

    pub fn with_alloc_hooks(mut self, hooks: Rc<dyn AllocHooks>) -> Self {
        self.alloc_hooks = hooks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_budget() {
        let cfg = EngineConfig::new();
        assert_eq!(cfg.max_instructions, 2000);
        assert!(!cfg.error_on_max_instructions);
    }

    #[test]
    fn zero_instruction_budget_is_raised_to_one() {
        let cfg = EngineConfig::new().with_max_instructions(0);
        assert_eq!(cfg.max_instructions, 1);
    }

    #[test]
    fn builder_methods_chain() {
        let cfg = EngineConfig::new()
            .with_max_instructions(500)
            .with_error_on_max_instructions(true)
            .with_logging(false)
            .with_debug_info(false);
        assert_eq!(cfg.max_instructions, 500);
        assert!(cfg.error_on_max_instructions);
        assert!(!cfg.enable_logging);
        assert!(!cfg.enable_debug_info);
    }
}
