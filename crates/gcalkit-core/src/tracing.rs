//! Subscriber setup for applications embedding gcalkit.
//!
//! The client logs at its network boundary under these targets:
//!
//! | target | events |
//! |--------|--------|
//! | `gcalkit_client::http` | `trace`: method and URL of every request, response status |
//! | `gcalkit_client::auth` | `info`: token exchanges, token file loads and saves |
//! | `gcalkit_client::transport` | `debug`: redirect hops, feed session capture, token refreshes |
//! | `gcalkit_client::gateway` | `warn`: unexpected response statuses |
//!
//! Tokens, secrets and authorization codes never appear in any field.
//!
//! ```ignore
//! use gcalkit_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::wire_trace()).expect("failed to initialize tracing");
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of the per-request wire events.
pub const WIRE_TARGET: &str = "gcalkit_client::http";

/// HTTP stack crates whose own logs are capped by
/// [`TracingConfig::dependency_level`].
const DEPENDENCY_TARGETS: [&str; 4] = ["reqwest", "hyper", "hyper_util", "rustls"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line with the event fields at the top level.
    Json,
}

/// How the subscriber filters and renders gcalkit events.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for every `gcalkit_*` target when RUST_LOG is not set.
    pub level: Level,
    /// Level for [`WIRE_TARGET`] when it should differ from `level`.
    ///
    /// Request lines are only emitted at `trace`, so `Some(Level::TRACE)`
    /// is what turns the wire log on.
    pub wire_level: Option<Level>,
    /// Cap for the HTTP stack underneath the client.
    pub dependency_level: Level,
    pub output_format: TracingOutputFormat,
    pub include_location: bool,
    pub include_timestamp: bool,
    /// Explicit filter directive; wins over RUST_LOG and the levels above.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            wire_level: None,
            dependency_level: Level::WARN,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_timestamp: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Redirect hops, session capture and token refreshes on a compact
    /// single line, without timestamps.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            output_format: TracingOutputFormat::Compact,
            include_location: true,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// [`cli_debug`](Self::cli_debug) plus every request line.
    #[must_use]
    pub fn wire_trace() -> Self {
        Self {
            wire_level: Some(Level::TRACE),
            ..Self::cli_debug()
        }
    }

    /// JSON lines for services embedding the client: token exchanges and
    /// warnings, no request lines.
    #[must_use]
    pub fn service() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            wire_level: Some(Level::INFO),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_wire_level(mut self, level: Level) -> Self {
        self.wire_level = Some(level);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// The directive used when neither `env_filter` nor RUST_LOG is set.
    pub fn default_directive(&self) -> String {
        let mut directives = vec![
            format!("gcalkit_core={}", self.level),
            format!("gcalkit_client={}", self.level),
        ];
        if let Some(wire) = self.wire_level {
            directives.push(format!("{}={}", WIRE_TARGET, wire));
        }
        directives.extend(
            DEPENDENCY_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.dependency_level)),
        );
        directives.join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive())))
    }
}

/// Installs a global subscriber built from `config`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set or the explicit
/// filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.output_format {
        TracingOutputFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            let layer = if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            };
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        TracingOutputFormat::Json => {
            let layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}
