//! Structured logging bootstrap: a reusable `init()` any embedding
//! service calls once at startup, before spawning any background work.

use std::sync::Once;

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, ANSI-colored unless `NO_COLOR` is set or output
    /// isn't a terminal.
    Pretty,
    /// Newline-delimited JSON, for log aggregators.
    Json,
}

/// Installs a global `tracing` subscriber reading filter directives from
/// `RUST_LOG` (falling back to `info` if unset). Safe to call more than
/// once; only the first call takes effect.
pub fn init(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let ansi = !matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1");

        let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(ansi);

        match format {
            LogFormat::Pretty => subscriber.finish().try_init_or_log(),
            LogFormat::Json => subscriber.json().finish().try_init_or_log(),
        }
    });
}

trait TryInitOrLog {
    fn try_init_or_log(self);
}

impl<S> TryInitOrLog for S
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    fn try_init_or_log(self) {
        if tracing::subscriber::set_global_default(self).is_err() {
            eprintln!("tracing subscriber was already set by an earlier, non-`ward_telemetry` call");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_across_repeated_calls() {
        init(LogFormat::Pretty);
        init(LogFormat::Pretty);
        init(LogFormat::Json);
    }
}
