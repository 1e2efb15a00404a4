//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. The ledger crates log every
//! state change at `info` (basket created, module initialized, shares
//! issued, trade executed) and venue pricing at `debug`; this module decides
//! how those records are rendered.
//!
//! Output goes to stderr so `trove-node check-genesis` can print its
//! summary on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "trove_node=info,trove_protocol=info,trove_modules=info,tower_http=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, with source locations.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects [`LogFormat::Json`]; anything else is
    /// [`LogFormat::Pretty`].
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the subscriber. `RUST_LOG` overrides `default_filter`, e.g.
///
/// ```text
/// RUST_LOG=trove_modules=debug,trove_protocol=info
/// ```
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
