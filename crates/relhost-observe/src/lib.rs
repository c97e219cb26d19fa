//! Global `tracing` subscriber setup for the host.
mod clock;
pub use clock::{LogTimeZone, capture_local_offset};

mod config;
pub use config::{LOG_ENV_VAR, LogConfig};

mod error;
pub use error::{LogError, LogResult};

mod filter;
pub use filter::LogFilter;

mod format;
pub use format::LogFormat;

mod install;
pub use install::init_logger;
