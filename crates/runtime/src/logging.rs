//! Engine logging (spec §6 "Logging levels"): structured `tracing` events
//! for anyone running the host process under a subscriber, plus an optional
//! direct callback for hosts that want the messages themselves.
//!
//! Grounded in the teacher's own subscriber setup (`lsp/src/main.rs`):
//! `tracing_subscriber::fmt()` with an `EnvFilter` driven by the process
//! environment. `jinx-runtime` doesn't install a global subscriber itself
//! (a library embedded in someone else's process must never do that for
//! them), but `init_default_subscriber` below is the same shape, offered
//! for `jinx-cli` and tests to opt into.

use crate::config::{LogFn, LogLevel};

/// Install a stderr `tracing` subscriber filtered by `JINX_LOG` (falling
/// back to `info`), the same pattern the teacher's LSP binary uses for
/// `RUST_LOG`/its own default directive.
pub fn init_default_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("JINX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Routes one engine log message both to `tracing` and, if the host
/// installed one, its own [`LogFn`].
pub(crate) fn emit(enabled: bool, log_fn: &Option<LogFn>, level: LogLevel, message: &str) {
    if !enabled {
        return;
    }
    match level {
        LogLevel::Info => tracing::info!(target: "jinx", "{message}"),
        LogLevel::Warning => tracing::warn!(target: "jinx", "{message}"),
        LogLevel::Error => tracing::error!(target: "jinx", "{message}"),
    }
    if let Some(f) = log_fn {
        f(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn disabled_logging_skips_log_fn() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls2 = calls.clone();
        let log_fn: LogFn = Arc::new(move |_level, msg| calls2.lock().unwrap().push(msg.to_string()));
        emit(false, &Some(log_fn), LogLevel::Info, "should not appear");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn enabled_logging_invokes_log_fn() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls2 = calls.clone();
        let log_fn: LogFn = Arc::new(move |_level, msg| calls2.lock().unwrap().push(msg.to_string()));
        emit(true, &Some(log_fn), LogLevel::Warning, "heads up");
        assert_eq!(calls.lock().unwrap().as_slice(), ["heads up"]);
    }
}
