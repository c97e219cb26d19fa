//! POSIX rlimits applied to worker processes.
//!
//! On Unix the limits are set in a `pre_exec` hook, after `fork()` and before `execve()`, so
//! the worker never runs unrestricted. The soft limit is set to the requested value and the
//! hard limit is kept when it is already higher. Elsewhere the request is ignored with a
//! warning.
use serde::Deserialize;
use tokio::process::Command;

use crate::ExecError;

/// Optional limits for a worker process. `None` leaves the inherited limit in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`; writes past it end the process with `SIGXFSZ`.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && !self.disable_core_dumps
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.max_open_files == Some(0) {
            return Err(ExecError::InvalidConfig(
                "rlimits.max_open_files cannot be zero".into(),
            ));
        }
        if self.max_file_size_bytes == Some(0) {
            return Err(ExecError::InvalidConfig(
                "rlimits.max_file_size_bytes cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Install the limits on `cmd`.
pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    unix::attach(cmd, config);

    #[cfg(not(unix))]
    {
        let _ = cmd;
        tracing::warn!(?config, "rlimits are not supported on this platform; ignoring");
    }
}

#[cfg(unix)]
mod unix {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;
    use crate::raw::write_errno;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    type Resource = libc::c_int;

    pub(super) fn attach(cmd: &mut Command, config: &RlimitConfig) {
        let mut plan: Vec<(Resource, u64, &'static [u8])> = Vec::with_capacity(3);
        if let Some(n) = config.max_open_files {
            plan.push((libc::RLIMIT_NOFILE as Resource, n, b"relhost: failed to set RLIMIT_NOFILE"));
        }
        if let Some(n) = config.max_file_size_bytes {
            plan.push((libc::RLIMIT_FSIZE as Resource, n, b"relhost: failed to set RLIMIT_FSIZE"));
        }
        if config.disable_core_dumps {
            plan.push((libc::RLIMIT_CORE as Resource, 0, b"relhost: failed to set RLIMIT_CORE"));
        }

        // SAFETY: the hook only calls getrlimit/setrlimit/write, all async-signal-safe, and
        // reads the plan captured before fork without allocating.
        unsafe {
            cmd.pre_exec(move || {
                for (resource, value, label) in &plan {
                    if let Err(e) = apply(*resource, *value) {
                        write_errno(label, e.raw_os_error());
                        return Err(e);
                    }
                }
                Ok(())
            });
        }
    }

    fn apply(resource: Resource, value: u64) -> io::Result<()> {
        let soft = libc::rlim_t::try_from(value)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "rlimit out of range"))?;

        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `current` is a valid, writable rlimit.
        if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let hard = if current.rlim_max == libc::RLIM_INFINITY || current.rlim_max > soft {
            current.rlim_max
        } else {
            soft
        };
        let wanted = libc::rlimit {
            rlim_cur: soft,
            rlim_max: hard,
        };
        // SAFETY: `wanted` is a valid rlimit.
        if unsafe { libc::setrlimit(resource, &wanted) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
