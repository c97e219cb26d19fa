use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    LOG_ENV_VAR, LogConfig, LogError, LogFormat, LogResult, clock::Rfc3339Timer,
};

/// Install the global subscriber described by `cfg`.
///
/// `RELHOST_LOG`, when set to a valid directive string, replaces `cfg.filter`.
/// For `timezone = "local"` call [`crate::capture_local_offset`] before starting the runtime.
pub fn init_logger(cfg: &LogConfig) -> LogResult<()> {
    let override_expr = std::env::var(LOG_ENV_VAR).ok();
    let filter = cfg.effective_filter(override_expr.as_deref()).build()?;
    let timer = Rfc3339Timer::new(cfg.timezone);

    match cfg.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.ansi())
                .with_target(cfg.targets)
                .with_timer(timer);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.targets)
                .with_current_span(true)
                .with_timer(timer);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Journald => journald(filter),
    }
}

#[cfg(target_os = "linux")]
fn journald(filter: tracing_subscriber::EnvFilter) -> LogResult<()> {
    let layer = tracing_journald::layer().map_err(|e| LogError::Journald(e.to_string()))?;
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(not(target_os = "linux"))]
fn journald(_filter: tracing_subscriber::EnvFilter) -> LogResult<()> {
    Err(LogError::JournaldNotSupported)
}

fn install<S>(subscriber: S) -> LogResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}
