//! Tracing subscriber initialization for the `pq` binary.
//!
//! Logs go to stderr so JSON on stdout stays machine-readable.
//!
//! # Filter priority (highest to lowest)
//!
//! 1. `PQ_LOG` env var (per-target directives, e.g. `promotion_quota_core=debug,warn`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`--verbose` → debug, `--quiet` → error)
//! 4. Default level: `warn`

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PQ_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// Verbose wins when both flags are given.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Installs the global stderr subscriber.
///
/// # Errors
/// Returns an error when a global subscriber is already installed.
pub fn init_tracing(verbosity: Verbosity) -> Result<()> {
    let filter = build_env_filter(verbosity, std::env::var(LOG_ENV_VAR).ok().as_deref());
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(use_ansi)
                .with_target(true)
                .without_time()
                .compact(),
        )
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn build_env_filter(verbosity: Verbosity, project_directives: Option<&str>) -> EnvFilter {
    // Unparseable directives fall through to the next source.
    if let Some(filter) = project_directives.and_then(|directives| EnvFilter::try_new(directives).ok()) {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(verbosity.default_level().as_str())
}
