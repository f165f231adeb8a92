//! Tracing initialisation.

use mccontrol_core::{ControlError, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: [&str; 6] = [
    "mccontrol",
    "mccontrol_core",
    "mccontrol_discovery",
    "mccontrol_executor",
    "mccontrol_logs",
    "mccontrol_session",
];

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Level directive for a verbosity count (0=error .. 4+=trace).
#[must_use]
pub fn filter_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a global subscriber writing to stderr. `RUST_LOG` overrides
/// `verbosity` when set.
///
/// # Errors
/// Returns a configuration error if a global subscriber is already set.
pub fn init_tracing(verbosity: u8, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity)));

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| ControlError::Configuration(format!("tracing init failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_covers_every_crate() {
        let directive = filter_directive(2);
        assert!(directive.starts_with("mccontrol=info,"));
        assert!(directive.contains("mccontrol_logs=info"));
        assert_eq!(directive.matches('=').count(), CRATES.len());
    }

    #[test]
    fn test_high_verbosity_is_trace() {
        assert!(filter_directive(9).contains("mccontrol_session=trace"));
        assert!(filter_directive(0).contains("=error"));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(1, LogFormat::Pretty);
        assert!(matches!(
            init_tracing(1, LogFormat::Json),
            Err(ControlError::Configuration(_))
        ));
    }
}
