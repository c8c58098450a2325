//! Standardized telemetry for hub daemons.
//!
//! Start with [`TelemetryConfig::new()`].

use std::io::{IsTerminal as _, Write as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

/// The toplevel config for the hub-telemetry crate. Start here.
#[derive(Debug)]
pub struct TelemetryConfig {
    syslog_identifier: Option<String>,
    default_level: LevelFilter,
}

impl TelemetryConfig {
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        Self {
            syslog_identifier: None,
            default_level: LevelFilter::INFO,
        }
    }

    /// Enables journald, and uses the provided syslog identifier.
    ///
    /// If you run the application in a tty, stderr will be used instead.
    #[must_use]
    pub fn with_journald(self, syslog_identifier: &str) -> Self {
        Self {
            syslog_identifier: Some(syslog_identifier.to_owned()),
            ..self
        }
    }

    /// Sets the level used when `RUST_LOG` is not set. `RUST_LOG` always takes
    /// precedence.
    #[must_use]
    pub fn with_default_level(self, level: LevelFilter) -> Self {
        Self {
            default_level: level,
            ..self
        }
    }

    pub fn try_init(
        self,
    ) -> Result<TelemetryFlusher, tracing_subscriber::util::TryInitError> {
        let global_filter = EnvFilter::builder()
            .with_default_directive(self.default_level.into())
            .from_env_lossy();
        // Checking for a terminal helps detect if we are running under systemd.
        let journald_layer = if !std::io::stderr().is_terminal() {
            self.syslog_identifier.and_then(|syslog_identifier| {
                tracing_journald::layer()
                    .inspect_err(|err| {
                        eprintln!(
                            "failed connecting to journald socket. \
                        will write to stderr: {err}"
                        );
                    })
                    .map(|layer| layer.with_syslog_identifier(syslog_identifier))
                    .ok()
            })
        } else {
            None
        };
        let stderr_layer = journald_layer
            .is_none()
            .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(journald_layer)
            .with(global_filter)
            .try_init()?;

        Ok(TelemetryFlusher { _priv: () })
    }

    /// Initializes the telemetry config. Call this only once, at the beginning of the
    /// program.
    ///
    /// Calling this more than once or when another tracing subscriber is registered
    /// will cause a panic.
    pub fn init(self) -> TelemetryFlusher {
        self.try_init().expect("failed to initialize hub-telemetry")
    }
}

/// Allows flushing all telemetry logs.
#[must_use = "call .flush at the end of the program to flush logs, otherwise they may get lost"]
pub struct TelemetryFlusher {
    _priv: (),
}

impl TelemetryFlusher {
    /// Call this at the end of the program.
    pub async fn flush(self) {
        // technically blocks, but no one really cares for stderr/out.
        self.flush_blocking();
    }

    /// Call this at the end of the program.
    pub fn flush_blocking(self) {
        std::io::stderr().flush().ok();
        std::io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_is_info() {
        let cfg = TelemetryConfig::new();
        assert_eq!(cfg.default_level, LevelFilter::INFO);
        assert!(cfg.syslog_identifier.is_none());
    }

    #[test]
    fn builder_keeps_journald_identifier() {
        let cfg = TelemetryConfig::new()
            .with_journald("hub-otamgr")
            .with_default_level(LevelFilter::DEBUG);
        assert_eq!(cfg.syslog_identifier.as_deref(), Some("hub-otamgr"));
        assert_eq!(cfg.default_level, LevelFilter::DEBUG);
    }
}
