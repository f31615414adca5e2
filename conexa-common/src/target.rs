//! Probe target and TLS verification policy.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::SMGW_PATH;

/// A gateway device to probe.
///
/// Immutable for the duration of one probe. The password is never
/// serialized and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl ProbeTarget {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// URL of the SMGW machine-to-machine endpoint on this target.
    ///
    /// IPv6 literals are bracketed.
    pub fn endpoint_url(&self, use_tls: bool) -> String {
        let scheme = if use_tls { "https" } else { "http" };
        let host = if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}{}", scheme, host, self.port, SMGW_PATH)
    }
}

impl fmt::Debug for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Certificate verification policy for TLS probes.
///
/// Gateways usually present a self-signed certificate whose SAN does not
/// match the address they are reached under, so the device probe defaults
/// to `InsecureNoVerify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Validate the certificate chain and hostname.
    Strict,
    /// Accept any certificate for any hostname.
    #[default]
    #[serde(alias = "insecure")]
    InsecureNoVerify,
}

impl VerifyMode {
    pub fn is_strict(&self) -> bool {
        matches!(self, VerifyMode::Strict)
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMode::Strict => write!(f, "strict"),
            VerifyMode::InsecureNoVerify => write!(f, "insecure"),
        }
    }
}

impl FromStr for VerifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(VerifyMode::Strict),
            "insecure" | "insecure_no_verify" | "none" => Ok(VerifyMode::InsecureNoVerify),
            other => Err(format!(
                "unknown verify mode '{}', expected 'strict' or 'insecure'",
                other
            )),
        }
    }
}
