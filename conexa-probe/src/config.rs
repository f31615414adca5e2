//! Configuration for the probe.

use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, ConfigError, Environment, File, Map};
use conexa_common::{ProbeTarget, VerifyMode};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gateway::ProbeOptions;
use crate::reachability::DEFAULT_PING_TIMEOUT;

/// Environment prefix, shared by real variables and `.env` entries.
const ENV_PREFIX: &str = "CONEXA";

/// Probe configuration.
///
/// Field names match the `CONEXA_*` environment variables with the prefix
/// stripped, e.g. `CONEXA_IP_ADDRESS` sets `ip_address`.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Hostname or literal address of the gateway.
    pub ip_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Use `https://` (true) or `http://` (false).
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Certificate verification for TLS probes.
    #[serde(default)]
    pub verify: VerifyMode,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Skip DNS and ping entirely.
    #[serde(default)]
    pub skip_reachability: bool,
    /// Abort when the device does not answer ping. Many gateways drop ICMP.
    #[serde(default = "default_true")]
    pub require_ping: bool,
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ip_address", &self.ip_address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("verify", &self.verify)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("ping_timeout_secs", &self.ping_timeout_secs)
            .field("skip_reachability", &self.skip_reachability)
            .field("require_ping", &self.require_ping)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn with_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    overrides: &[(&str, String)],
) -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (key, value) in overrides {
        builder = builder.set_override(*key, value.as_str())?;
    }
    Ok(builder)
}

/// `CONEXA_*` entries of a dotenv file as a config source.
///
/// A missing file yields `None`. Entries are read from the file only and
/// never exported into the process environment.
fn dotenv_source(path: &Path) -> Result<Option<Environment>> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.collect::<std::result::Result<Map<String, String>, _>>()?,
        Err(e) if e.not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    tracing::debug!("Loaded {} entries from {}", entries.len(), path.display());

    Ok(Some(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(entries)),
    ))
}

// Default values
fn default_port() -> u16 {
    443
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    20
}
fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. `overrides` (command line)
    /// 2. Environment variables (`CONEXA_KEY` format)
    /// 3. `.env` file in the working directory (if present)
    /// 4. conexa.toml file (if present)
    /// 5. Built-in defaults
    pub fn load(overrides: &[(&str, String)]) -> Result<Self> {
        let mut builder = Self::defaults()?.add_source(File::with_name("conexa").required(false));
        if let Some(dotenv) = dotenv_source(Path::new(".env"))? {
            builder = builder.add_source(dotenv);
        }
        let builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        Self::finish(with_overrides(builder, overrides)?.build()?)
    }

    /// Load configuration from a dotenv file, without the real environment.
    pub fn load_dotenv(path: &Path, overrides: &[(&str, String)]) -> Result<Self> {
        let dotenv = dotenv_source(path)?.ok_or_else(|| {
            Error::InvalidConfig(format!("{} does not exist", path.display()))
        })?;
        let builder = Self::defaults()?.add_source(dotenv);
        Self::finish(with_overrides(builder, overrides)?.build()?)
    }

    /// Load configuration from a single file, without environment variables.
    pub fn load_from(path: &Path, overrides: &[(&str, String)]) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from(path));
        Self::finish(with_overrides(builder, overrides)?.build()?)
    }

    fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLoader::builder()
            .set_default("port", default_port() as i64)?
            .set_default("use_tls", default_true())?
            .set_default("verify", VerifyMode::default().to_string())?
            .set_default("request_timeout_secs", default_request_timeout() as i64)?
            .set_default("ping_timeout_secs", default_ping_timeout() as i64)?
            .set_default("skip_reachability", false)?
            .set_default("require_ping", default_true())?
            .set_default("log_level", default_log_level())
    }

    fn finish(config: ConfigLoader) -> Result<Self> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot produce a meaningful probe.
    pub fn validate(&self) -> Result<()> {
        if self.ip_address.trim().is_empty() {
            return Err(Error::InvalidConfig("ip_address must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must not be 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.ping_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "ping_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn target(&self) -> ProbeTarget {
        ProbeTarget::new(
            self.ip_address.trim(),
            self.port,
            &self.username,
            &self.password,
        )
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            use_tls: self.use_tls,
            verify: self.verify,
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..ProbeOptions::default()
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}
