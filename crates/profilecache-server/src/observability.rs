//! Log output for the server.
//!
//! Tracing starts before the config file is read, so the filter sits behind a
//! reload handle and [`apply_logging_level`] swaps it once `logging.level` is
//! known. `RUST_LOG` always wins over both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Dependencies that log every request or pooled connection at debug.
const QUIET_DEPENDENCIES: &[&str] = &["hyper_util=info", "reqwest=info", "deadpool=info"];

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs the global subscriber. A second call is ignored.
pub fn init_tracing_with_level(level: &str) {
    let filter = env_override().unwrap_or_else(|| filter_for(level));

    let (filter_layer, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Switches to the configured level unless `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if env_override().is_some() {
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(err) = handle.modify(|f| *f = filter_for(level)) {
        tracing::warn!(error = %err, level, "Failed to apply logging level");
    }
}

fn env_override() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

/// Builds the filter for `level`, capping chatty dependencies at info.
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::new(directives(level))
}

fn directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    if matches!(level.as_str(), "trace" | "debug") {
        std::iter::once(level.as_str())
            .chain(QUIET_DEPENDENCIES.iter().copied())
            .collect::<Vec<_>>()
            .join(",")
    } else {
        level
    }
}
