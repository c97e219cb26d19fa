//! Host configuration: a TOML file plus environment overrides.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use relhost_api::{DEFAULT_RELEASE_PREFIX, TenantFallback, TenantUpstream};
use relhost_exec::{OutputConfig, RlimitConfig};
use relhost_model::{DEFAULT_READY_MARKER, DEFAULT_READY_TIMEOUT_MS, DEFAULT_SOCKET_ENV, validate_id};
use relhost_observe::LogConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid configuration file: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub server: ServerSection,
    pub host: HostSection,
    pub artifacts: ArtifactsSection,
    pub environment: EnvironmentSection,
    pub worker: WorkerSection,
    pub tenant: TenantSection,
    pub metrics: MetricsSection,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub listen: String,
    /// Mount point of the release routes.
    pub release_prefix: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".into(),
            release_prefix: DEFAULT_RELEASE_PREFIX.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
    /// Tenant whose releases this host serves.
    pub organization_id: String,
    pub data_dir: PathBuf,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            organization_id: String::new(),
            data_dir: PathBuf::from("/var/lib/relhost"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Http,
    Fs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsSection {
    pub kind: StoreKind,
    /// `http`: objects are fetched from `{base_url}/{object key}`.
    pub base_url: Option<String>,
    /// `fs`: objects are read from `{root}/{object key}`.
    pub root: Option<PathBuf>,
    pub token: Option<String>,
    pub fetch_timeout_ms: u64,
    pub strip_components: usize,
    /// File every release must contain.
    pub entrypoint: Option<String>,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            kind: StoreKind::Http,
            base_url: None,
            root: None,
            token: None,
            fetch_timeout_ms: 120_000,
            strip_components: 0,
            entrypoint: Some("index.js".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    Http,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentSection {
    pub kind: ResolverKind,
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: u64,
    /// `static`: variables handed to every worker.
    pub vars: BTreeMap<String, String>,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            kind: ResolverKind::Http,
            url: None,
            token: None,
            timeout_ms: 10_000,
            vars: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSection {
    pub program: String,
    pub args: Vec<String>,
    pub ready_marker: String,
    pub ready_timeout_ms: u64,
    pub terminate_grace_ms: u64,
    pub socket_env: String,
    pub inherit_env: bool,
    /// Host-level variables applied over the resolved environment.
    pub extra_env: BTreeMap<String, String>,
    pub rlimits: Option<RlimitConfig>,
    pub output: OutputConfig,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            program: "node".into(),
            args: vec!["index.js".into()],
            ready_marker: DEFAULT_READY_MARKER.into(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            terminate_grace_ms: 5_000,
            socket_env: DEFAULT_SOCKET_ENV.into(),
            inherit_env: false,
            extra_env: BTreeMap::new(),
            rlimits: None,
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenantSection {
    pub upstreams: Vec<TenantUpstream>,
    pub fallback: Option<TenantFallback>,
}

impl TenantSection {
    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty() && self.fallback.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    /// Collect Prometheus metrics and serve them on `/metrics`.
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl HostConfig {
    /// Read `path` (defaults when `None`), apply process environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Self::parse(&raw)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|name| std::env::var(name).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Override selected settings from `RELHOST_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELHOST_LISTEN") {
            self.server.listen = v;
        }
        if let Some(v) = lookup("RELHOST_DATA_DIR") {
            self.host.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELHOST_ORGANIZATION_ID") {
            self.host.organization_id = v;
        }
        if let Some(v) = lookup("RELHOST_CONTROL_PLANE_TOKEN") {
            self.environment.token = Some(v);
        }
        if let Some(v) = lookup("RELHOST_ARTIFACT_TOKEN") {
            self.artifacts.token = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return invalid(format!("server.listen {:?} is not a socket address", self.server.listen));
        }
        let prefix = &self.server.release_prefix;
        if !prefix.is_empty() && !prefix.starts_with('/') {
            return invalid(format!("server.release_prefix {prefix:?} must start with '/'"));
        }
        validate_id("host.organization_id", &self.host.organization_id)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.host.data_dir.as_os_str().is_empty() {
            return invalid("host.data_dir is empty".into());
        }

        match self.artifacts.kind {
            StoreKind::Http => {
                check_url("artifacts.base_url", self.artifacts.base_url.as_deref())?
            }
            StoreKind::Fs if self.artifacts.root.is_none() => {
                return invalid("artifacts.root is required for kind = \"fs\"".into());
            }
            StoreKind::Fs => {}
        }
        if self.artifacts.fetch_timeout_ms == 0 {
            return invalid("artifacts.fetch_timeout_ms must be positive".into());
        }

        if self.environment.kind == ResolverKind::Http {
            check_url("environment.url", self.environment.url.as_deref())?;
        }
        if self.environment.timeout_ms == 0 {
            return invalid("environment.timeout_ms must be positive".into());
        }

        if self.worker.ready_timeout_ms == 0 {
            return invalid("worker.ready_timeout_ms must be positive".into());
        }
        if self.worker.socket_env.trim().is_empty() {
            return invalid("worker.socket_env is empty".into());
        }

        for up in &self.tenant.upstreams {
            if !up.prefix.starts_with('/') {
                return invalid(format!("tenant upstream prefix {:?} must start with '/'", up.prefix));
            }
            check_url("tenant.upstreams.url", Some(&up.url))?;
        }
        if let Some(fb) = &self.tenant.fallback {
            check_url("tenant.fallback.url", Some(&fb.url))?;
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.worker.ready_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.worker.terminate_grace_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.artifacts.fetch_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.environment.timeout_ms)
    }
}

fn check_url(field: &str, url: Option<&str>) -> Result<(), ConfigError> {
    let Some(url) = url else {
        return Err(ConfigError::Invalid(format!("{field} is required")));
    };
    match reqwest::Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        Ok(_) => Err(ConfigError::Invalid(format!("{field} {url:?} must be http or https"))),
        Err(e) => Err(ConfigError::Invalid(format!("{field} {url:?}: {e}"))),
    }
}
