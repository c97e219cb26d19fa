use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::LogError;

/// Validated `EnvFilter` directive string, e.g. `"relhost_core=debug,info"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogFilter(String);

impl LogFilter {
    pub fn new(expr: impl Into<String>) -> Result<Self, LogError> {
        let expr = expr.into();
        match EnvFilter::try_new(&expr) {
            Ok(_) => Ok(Self(expr)),
            Err(e) => Err(LogError::InvalidFilter {
                expr,
                reason: e.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the runtime filter.
    pub fn build(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.0).map_err(|e| LogError::InvalidFilter {
            expr: self.0.clone(),
            reason: e.to_string(),
        })
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LogFilter {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LogFilter {
    type Error = LogError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LogFilter> for String {
    fn from(f: LogFilter) -> Self {
        f.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directives() {
        for expr in ["info", "warn", "relhost_core=trace,relhost_api=debug,info"] {
            let filter: LogFilter = expr.parse().unwrap();
            assert_eq!(filter.as_str(), expr);
            assert!(filter.build().is_ok());
        }
    }

    #[test]
    fn rejects_bad_levels() {
        for expr in ["relhost_core=loud", "a=trace,b=wat"] {
            assert!(matches!(
                expr.parse::<LogFilter>(),
                Err(LogError::InvalidFilter { .. })
            ));
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: LogFilter = serde_json::from_str(r#""debug""#).unwrap();
        assert_eq!(ok.as_str(), "debug");
        assert!(serde_json::from_str::<LogFilter>(r#""x=nope""#).is_err());
    }
}
