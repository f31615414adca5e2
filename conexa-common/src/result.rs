//! Results produced by a reachability check and a gateway probe.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol;

/// Outcome of the reachability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityResult {
    /// Numeric address that was pinged.
    #[serde(default)]
    pub resolved_address: Option<String>,
    pub dns_ok: bool,
    pub ping_ok: bool,
    /// `DnsResolution` or `PingFailure`, at stage `reachability`.
    #[serde(default)]
    pub error: Option<ProbeError>,
}

impl ReachabilityResult {
    /// Resolution failed; nothing was pinged.
    pub fn dns_failed(message: impl Into<String>) -> Self {
        Self {
            resolved_address: None,
            dns_ok: false,
            ping_ok: false,
            error: Some(ProbeError::new(
                ProbeErrorKind::DnsResolution,
                ProbeStage::Reachability,
                message,
            )),
        }
    }

    /// Resolved to `address`, which did not answer the echo request.
    pub fn ping_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resolved_address: Some(address.into()),
            dns_ok: true,
            ping_ok: false,
            error: Some(ProbeError::new(
                ProbeErrorKind::PingFailure,
                ProbeStage::Reachability,
                message,
            )),
        }
    }

    pub fn reachable(address: impl Into<String>) -> Self {
        Self {
            resolved_address: Some(address.into()),
            dns_ok: true,
            ping_ok: true,
            error: None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.dns_ok && self.ping_ok
    }
}

/// Stages of a gateway probe.
///
/// `Authenticating` is entered at most twice: once for the unauthenticated
/// request that draws the digest challenge, once for the retried request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    /// DNS and ping, before the gateway probe starts.
    Reachability,
    Idle,
    Connecting,
    /// The HTTP client connects and negotiates TLS in one step, so this
    /// stage is entered once a failure is classified as a TLS error.
    TlsHandshake,
    Authenticating,
    AwaitingResponse,
    Succeeded,
    Failed,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStage::Reachability => "reachability",
            ProbeStage::Idle => "idle",
            ProbeStage::Connecting => "connecting",
            ProbeStage::TlsHandshake => "tls_handshake",
            ProbeStage::Authenticating => "authenticating",
            ProbeStage::AwaitingResponse => "awaiting_response",
            ProbeStage::Succeeded => "succeeded",
            ProbeStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Classification of probe failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProbeErrorKind {
    DnsResolution,
    /// Reported, aborts the session only when ping is required.
    PingFailure,
    TlsHandshake {
        /// The peer answered the ClientHello with something that is not TLS.
        plaintext_suspected: bool,
    },
    Connection,
    Timeout,
    /// Digest credentials rejected, or no digest challenge offered.
    AuthenticationFailure,
    /// Body was not JSON. Never fatal: recorded in
    /// [`ProbeResult::parse_error`] next to the raw text.
    ResponseParse,
    /// Any other failure building or sending the request.
    Request,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::DnsResolution => write!(f, "DNS resolution error"),
            ProbeErrorKind::PingFailure => write!(f, "ping failure"),
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: true,
            } => write!(f, "TLS handshake error (plaintext suspected)"),
            ProbeErrorKind::TlsHandshake { .. } => write!(f, "TLS handshake error"),
            ProbeErrorKind::Connection => write!(f, "connection error"),
            ProbeErrorKind::Timeout => write!(f, "timeout"),
            ProbeErrorKind::AuthenticationFailure => write!(f, "authentication failure"),
            ProbeErrorKind::ResponseParse => write!(f, "response parse error"),
            ProbeErrorKind::Request => write!(f, "request error"),
        }
    }
}

/// A failure captured into a [`ProbeResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    #[serde(flatten)]
    pub kind: ProbeErrorKind,
    /// Stage the probe was in when it failed.
    pub stage: ProbeStage,
    pub message: String,
    /// Actionable advice for the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, stage: ProbeStage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_plaintext_suspected(&self) -> bool {
        matches!(
            self.kind,
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: true
            }
        )
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.stage, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProbeError {}

/// Outcome of one gateway probe.
///
/// Any HTTP status received counts as a response: `status_code` is set and
/// the body lands in `body` when it is JSON, in `raw_text` otherwise.
/// `error` is set for transport failures and rejected credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub error: Option<ProbeError>,
    /// Why the body landed in `raw_text`. Does not affect success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<ProbeError>,
    /// Wall time of the whole exchange, digest retry included.
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
}

impl ProbeResult {
    pub fn failed(error: ProbeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// True for a 200 answer with no recorded error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code == Some(200)
    }

    /// Firmware version reported by an `smgw-info` answer.
    pub fn firmware_version(&self) -> Option<&str> {
        self.body.as_ref().and_then(protocol::firmware_version)
    }
}

/// Everything one invocation found out about a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// `host:port` of the probed device.
    pub target: String,
    pub checked_at: DateTime<Utc>,
    /// `None` when the reachability check was skipped.
    #[serde(default)]
    pub reachability: Option<ReachabilityResult>,
    /// `None` when the probe was aborted before the request.
    #[serde(default)]
    pub result: Option<ProbeResult>,
}

impl ProbeReport {
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(ProbeResult::is_success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dns_failed_result() {
        let result = ReachabilityResult::dns_failed("no such host");
        assert!(!result.dns_ok);
        assert!(!result.ping_ok);
        assert!(result.resolved_address.is_none());
        let error = result.error.as_ref().unwrap();
        assert_eq!(error.kind, ProbeErrorKind::DnsResolution);
        assert_eq!(error.stage, ProbeStage::Reachability);
        assert_eq!(error.message, "no such host");
        assert!(!result.is_reachable());
    }

    #[test]
    fn test_ping_failed_result() {
        let result = ReachabilityResult::ping_failed("10.0.0.1", "exit code 1");
        assert!(result.dns_ok);
        assert!(!result.ping_ok);
        assert_eq!(result.resolved_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(result.error.unwrap().kind, ProbeErrorKind::PingFailure);

        let result = ReachabilityResult::reachable("10.0.0.1");
        assert!(result.is_reachable());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_parse_error_does_not_fail_result() {
        let result = ProbeResult {
            status_code: Some(200),
            raw_text: Some("OK".to_string()),
            parse_error: Some(ProbeError::new(
                ProbeErrorKind::ResponseParse,
                ProbeStage::AwaitingResponse,
                "expected value at line 1 column 1",
            )),
            ..Default::default()
        };
        assert!(result.is_success());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["parse_error"]["kind"], "response_parse");
        assert!(serde_json::to_value(ProbeResult::default())
            .unwrap()
            .get("parse_error")
            .is_none());
    }

    #[test]
    fn test_probe_result_firmware_version() {
        let result = ProbeResult {
            status_code: Some(200),
            body: Some(json!({"smgw-info": {"firmware-info": {"version": "1.2.3"}}})),
            ..Default::default()
        };
        assert!(result.is_success());
        assert_eq!(result.firmware_version(), Some("1.2.3"));
    }

    #[test]
    fn test_probe_result_not_success_with_error() {
        let error = ProbeError::new(
            ProbeErrorKind::AuthenticationFailure,
            ProbeStage::Authenticating,
            "digest rejected",
        );
        let result = ProbeResult {
            status_code: Some(200),
            error: Some(error),
            ..Default::default()
        };
        assert!(!result.is_success());
    }

    #[test]
    fn test_probe_error_display_includes_hint() {
        let error = ProbeError::new(
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: true,
            },
            ProbeStage::TlsHandshake,
            "wrong version number",
        )
        .with_hint("target may be using plaintext, not TLS");
        let text = error.to_string();
        assert!(text.contains("plaintext suspected"));
        assert!(text.contains("tls_handshake"));
        assert!(text.contains("target may be using plaintext"));
        assert!(error.is_plaintext_suspected());
    }

    #[test]
    fn test_probe_error_serialization_flattens_kind() {
        let error = ProbeError::new(
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: false,
            },
            ProbeStage::TlsHandshake,
            "bad certificate",
        );
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["kind"], "tls_handshake");
        assert_eq!(value["plaintext_suspected"], false);
        assert_eq!(value["stage"], "tls_handshake");
        assert!(value.get("hint").is_none());

        let parsed: ProbeError = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, error);
    }

    #[test]
    fn test_report_success_requires_result() {
        let report = ProbeReport {
            target: "10.0.0.1:443".to_string(),
            checked_at: Utc::now(),
            reachability: Some(ReachabilityResult::dns_failed("nope")),
            result: None,
        };
        assert!(!report.is_success());
    }
}
