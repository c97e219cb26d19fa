use std::{fmt, str::FromStr, sync::OnceLock};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::LogError;

/// Local offset captured while the process was still single-threaded.
static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Record the local UTC offset for `timezone = "local"`.
///
/// Must run in `main` before the tokio runtime starts; detection is refused by `time` once
/// other threads exist. Falls back to UTC when detection fails.
pub fn capture_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// Timezone used for log timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTimeZone {
    #[default]
    Utc,
    Local,
}

impl LogTimeZone {
    fn offset(self) -> UtcOffset {
        match self {
            LogTimeZone::Utc => UtcOffset::UTC,
            LogTimeZone::Local => LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl FromStr for LogTimeZone {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(LogError::InvalidTimeZone(s.to_string())),
        }
    }
}

impl fmt::Display for LogTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogTimeZone::Utc => "utc",
            LogTimeZone::Local => "local",
        })
    }
}

/// RFC 3339 timer for the fmt layers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Rfc3339Timer {
    tz: LogTimeZone,
}

impl Rfc3339Timer {
    pub(crate) fn new(tz: LogTimeZone) -> Self {
        Self { tz }
    }

    fn now(&self) -> String {
        OffsetDateTime::now_utc()
            .to_offset(self.tz.offset())
            .format(&Rfc3339)
            .unwrap_or_else(|_| "<invalid-time>".to_string())
    }
}

impl FormatTime for Rfc3339Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{} ", self.now())
    }
}
