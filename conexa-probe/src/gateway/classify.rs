//! Mapping of transport errors onto [`ProbeErrorKind`].
//!
//! reqwest reports DNS, TCP and TLS failures alike as connect errors, so the
//! kind is recovered from the error's source chain.

use std::error::Error as StdError;

use conexa_common::{ProbeError, ProbeErrorKind, ProbeStage};

pub const PLAINTEXT_HINT: &str =
    "target may be using plaintext, not TLS; retry with use_tls=false (http://)";
const CERTIFICATE_HINT: &str = "the gateway certificate failed verification; use verify=insecure \
     or address the device by the name in its certificate SAN";
const REFUSED_HINT: &str = "nothing is listening on this port; check the configured port";

/// Messages a TLS client produces when the peer answers the ClientHello
/// with something that is not TLS (typically an HTTP response).
const PLAINTEXT_MARKERS: &[&str] = &[
    "wrong version number",
    "packet length too long",
    "unknown protocol",
    "http request",
    "record layer failure",
    "invalidcontenttype",
    "invalid content type",
    "corrupt message",
    "bad protocol version",
];

const TLS_MARKERS: &[&str] = &["ssl", "tls", "handshake", "certificate", "x509"];

const CERTIFICATE_MARKERS: &[&str] = &[
    "certificate verify failed",
    "unknownissuer",
    "unknown issuer",
    "self signed",
    "self-signed",
    "not valid for name",
    "notvalidforname",
    "hostname mismatch",
];

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
];

/// Flags extracted from a transport error.
#[derive(Debug, Clone, Default)]
pub struct TransportFailure {
    /// Every message in the source chain, outermost first.
    pub chain: String,
    pub is_timeout: bool,
    pub is_connect: bool,
    pub connection_refused: bool,
}

impl TransportFailure {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let mut failure = TransportFailure {
            chain: error_chain(error),
            is_timeout: error.is_timeout(),
            is_connect: error.is_connect(),
            connection_refused: false,
        };

        let mut source = error.source();
        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::TimedOut => failure.is_timeout = true,
                    std::io::ErrorKind::ConnectionRefused => failure.connection_refused = true,
                    _ => {}
                }
            }
            source = err.source();
        }

        failure
    }

    /// Classify this failure. `stage` is where the probe was when it failed.
    pub fn classify(&self, stage: ProbeStage, use_tls: bool) -> ProbeError {
        let chain = self.chain.to_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| chain.contains(m));

        if self.is_timeout {
            return ProbeError::new(ProbeErrorKind::Timeout, stage, self.chain.clone());
        }

        if self.connection_refused || chain.contains("connection refused") {
            return ProbeError::new(ProbeErrorKind::Connection, ProbeStage::Connecting, self.chain.clone())
                .with_hint(REFUSED_HINT);
        }

        if contains_any(DNS_MARKERS) {
            return ProbeError::new(
                ProbeErrorKind::DnsResolution,
                ProbeStage::Connecting,
                self.chain.clone(),
            );
        }

        if use_tls && self.is_connect && contains_any(PLAINTEXT_MARKERS) {
            return ProbeError::new(
                ProbeErrorKind::TlsHandshake {
                    plaintext_suspected: true,
                },
                ProbeStage::TlsHandshake,
                self.chain.clone(),
            )
            .with_hint(PLAINTEXT_HINT);
        }

        if use_tls && self.is_connect && contains_any(TLS_MARKERS) {
            let error = ProbeError::new(
                ProbeErrorKind::TlsHandshake {
                    plaintext_suspected: false,
                },
                ProbeStage::TlsHandshake,
                self.chain.clone(),
            );
            return if contains_any(CERTIFICATE_MARKERS) {
                error.with_hint(CERTIFICATE_HINT)
            } else {
                error
            };
        }

        if self.is_connect {
            return ProbeError::new(ProbeErrorKind::Connection, ProbeStage::Connecting, self.chain.clone());
        }

        ProbeError::new(ProbeErrorKind::Request, stage, self.chain.clone())
    }
}

/// Classify a reqwest error raised while the probe was in `stage`.
pub fn classify_transport_error(
    error: &reqwest::Error,
    stage: ProbeStage,
    use_tls: bool,
) -> ProbeError {
    TransportFailure::from_reqwest(error).classify(stage, use_tls)
}

/// Join an error and all of its sources into one line.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(err) = source {
        let text = err.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = err.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_failure(chain: &str) -> TransportFailure {
        TransportFailure {
            chain: chain.to_string(),
            is_connect: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_openssl_wrong_version_is_plaintext() {
        let failure = connect_failure(
            "error sending request: client error (Connect): error:0A00010B:SSL routines:ssl3_get_record:wrong version number",
        );
        let error = failure.classify(ProbeStage::Connecting, true);
        assert_eq!(
            error.kind,
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: true
            }
        );
        assert_eq!(error.stage, ProbeStage::TlsHandshake);
        assert!(error.hint.as_deref().unwrap().contains("plaintext"));
    }

    #[test]
    fn test_rustls_invalid_content_type_is_plaintext() {
        let failure = connect_failure(
            "error sending request: client error (Connect): received corrupt message of type InvalidContentType",
        );
        assert!(failure.classify(ProbeStage::Connecting, true).is_plaintext_suspected());
    }

    #[test]
    fn test_plaintext_markers_ignored_without_tls() {
        let failure = connect_failure("wrong version number");
        let error = failure.classify(ProbeStage::Connecting, false);
        assert_eq!(error.kind, ProbeErrorKind::Connection);
    }

    #[test]
    fn test_certificate_failure_gets_hint() {
        let failure = connect_failure(
            "error sending request: client error (Connect): error:0A000086:SSL routines:tls_post_process_server_certificate:certificate verify failed",
        );
        let error = failure.classify(ProbeStage::Connecting, true);
        assert_eq!(
            error.kind,
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: false
            }
        );
        assert!(error.hint.as_deref().unwrap().contains("verify=insecure"));
    }

    #[test]
    fn test_connection_refused() {
        let failure = TransportFailure {
            chain: "error sending request: tcp connect error: Connection refused (os error 111)".to_string(),
            is_connect: true,
            connection_refused: true,
            ..Default::default()
        };
        let error = failure.classify(ProbeStage::Connecting, true);
        assert_eq!(error.kind, ProbeErrorKind::Connection);
        assert!(error.hint.is_some());
    }

    #[test]
    fn test_dns_failure() {
        let failure = connect_failure("error sending request: dns error: failed to lookup address information");
        let error = failure.classify(ProbeStage::Connecting, true);
        assert_eq!(error.kind, ProbeErrorKind::DnsResolution);
    }

    #[test]
    fn test_timeout_keeps_stage() {
        let failure = TransportFailure {
            chain: "operation timed out".to_string(),
            is_timeout: true,
            ..Default::default()
        };
        let error = failure.classify(ProbeStage::AwaitingResponse, true);
        assert_eq!(error.kind, ProbeErrorKind::Timeout);
        assert_eq!(error.stage, ProbeStage::AwaitingResponse);
    }

    #[test]
    fn test_other_failure_is_request_error() {
        let failure = TransportFailure {
            chain: "error decoding response body".to_string(),
            ..Default::default()
        };
        let error = failure.classify(ProbeStage::AwaitingResponse, true);
        assert_eq!(error.kind, ProbeErrorKind::Request);
    }

    #[test]
    fn test_error_chain_joins_sources() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "client error (Connect)")
            }
        }
        impl StdError for Outer {
            fn source(&self) -> Option<&(dyn StdError + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "wrong version number"));
        assert_eq!(error_chain(&err), "client error (Connect): wrong version number");
    }
}
