//! OS process launcher for release workers.
mod config;
pub use config::ProcessLauncherConfig;

mod error;
pub use error::ExecError;

mod launcher;
pub use launcher::ProcessLauncher;

mod limits;
pub use limits::{RlimitConfig, attach_rlimits};

mod output;
pub use output::OutputConfig;

mod raw;
