use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::{LogFilter, LogFormat, LogTimeZone};

/// Environment variable that replaces the configured filter when set.
pub const LOG_ENV_VAR: &str = "RELHOST_LOG";

/// `[log]` section of the host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `"relhost_core=debug,info"`.
    pub filter: LogFilter,
    pub timezone: LogTimeZone,
    /// Print event targets (module paths).
    pub targets: bool,
    /// ANSI colors for `text`, only honoured when stdout is a terminal.
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: LogFilter::default(),
            timezone: LogTimeZone::default(),
            targets: true,
            color: true,
        }
    }
}

impl LogConfig {
    pub(crate) fn ansi(&self) -> bool {
        self.color && self.format == LogFormat::Text && std::io::stdout().is_terminal()
    }

    /// Filter after applying `override_expr` (normally the value of [`LOG_ENV_VAR`]).
    ///
    /// An unparsable override is ignored and the configured filter is kept.
    pub fn effective_filter(&self, override_expr: Option<&str>) -> LogFilter {
        override_expr
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| LogFilter::new(s).ok())
            .unwrap_or_else(|| self.filter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LogConfig::default();
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.filter.as_str(), "info");
        assert_eq!(cfg.timezone, LogTimeZone::Utc);
        assert!(cfg.targets);
        assert!(cfg.color);
    }

    #[test]
    fn partial_toml_section_fills_defaults() {
        let cfg: LogConfig = toml::from_str(
            r#"
            format = "json"
            filter = "relhost_core=debug,info"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.filter.as_str(), "relhost_core=debug,info");
        assert_eq!(cfg.timezone, LogTimeZone::Utc);
        assert!(cfg.targets);
    }

    #[test]
    fn invalid_filter_fails_parsing() {
        let parsed = toml::from_str::<LogConfig>(r#"filter = "relhost=chatty""#);
        assert!(parsed.is_err());
    }

    #[test]
    fn json_never_uses_ansi() {
        let cfg = LogConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        assert!(!cfg.ansi());
    }

    #[test]
    fn override_replaces_filter_only_when_valid() {
        let cfg = LogConfig::default();
        assert_eq!(cfg.effective_filter(Some("debug")).as_str(), "debug");
        assert_eq!(cfg.effective_filter(Some("x=bogus")).as_str(), "info");
        assert_eq!(cfg.effective_filter(Some("  ")).as_str(), "info");
        assert_eq!(cfg.effective_filter(None).as_str(), "info");
    }
}
