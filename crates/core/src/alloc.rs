//! Host memory-accounting hook (spec §6 "Memory hooks").
//!
//! The reference interface is three raw function pointers (`alloc`,
//! `realloc`, `free`) the host can install to route every engine allocation
//! through its own allocator. Rust has no supported way to swap the global
//! allocator per-`Runtime` instance without `unsafe`, platform-specific
//! machinery, so this models the same *contract* — the host gets to observe
//! and account for the engine's bulk allocations — as a safe trait invoked
//! at the handful of places that grow something host-visible (the bytecode
//! buffer, the VM value stack), rather than as a true allocator override.

/// Accounting hook for bulk allocations the host might want to track.
///
/// `grow`/`shrink` report a byte delta for a single logical buffer (the
/// bytecode output, a script's value stack); the default implementation
/// does nothing, matching "no hooks installed" in the reference.
pub trait AllocHooks {
    fn grow(&self, _additional_bytes: usize) {}
    fn shrink(&self, _removed_bytes: usize) {}
}

/// The hook used when the host installs none: delegates to the platform
/// allocator by doing nothing extra, the same fallback spec §6 describes
/// for an `initialize()` call that omits `allocFn`/`reallocFn`/`freeFn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocHooks;

impl AllocHooks for SystemAllocHooks {}
