use std::time::Duration;

use relhost_model::DEFAULT_READY_MARKER;

use crate::{ExecError, OutputConfig, RlimitConfig};

/// Default time between `SIGTERM` and `SIGKILL`.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// How worker processes are started.
#[derive(Debug, Clone)]
pub struct ProcessLauncherConfig {
    /// Program to run, e.g. `node`.
    pub program: String,
    /// Arguments; the process runs inside the release directory.
    pub args: Vec<String>,
    /// Stdout line announcing readiness.
    pub ready_marker: String,
    /// Time a process gets to exit after `SIGTERM`.
    pub terminate_grace: Duration,
    /// Pass the host environment through. When `false` only `PATH` is kept.
    pub inherit_env: bool,
    pub output: OutputConfig,
    pub rlimits: Option<RlimitConfig>,
}

impl ProcessLauncherConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            inherit_env: false,
            output: OutputConfig::default(),
            rlimits: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.program.trim().is_empty() {
            return Err(ExecError::InvalidConfig("program is empty".into()));
        }
        if self.ready_marker.trim().is_empty() {
            return Err(ExecError::InvalidConfig("ready marker is empty".into()));
        }
        if self.terminate_grace.is_zero() {
            return Err(ExecError::InvalidConfig(
                "terminate grace must be positive".into(),
            ));
        }
        if self.output.max_line_length == 0 {
            return Err(ExecError::InvalidConfig(
                "output.max_line_length cannot be zero".into(),
            ));
        }
        if let Some(rlimits) = &self.rlimits {
            rlimits.validate()?;
        }
        Ok(())
    }
}
