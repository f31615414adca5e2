//! HTTP client for the SMGW machine-to-machine endpoint.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use conexa_common::protocol::X_CONTENT_LENGTH;
use conexa_common::{
    encode_json, EncodedBody, ProbeError, ProbeErrorKind, ProbeResult, ProbeStage, ProbeTarget,
    SmgwRequest, VerifyMode,
};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::Instrument;

use super::classify::classify_transport_error;
use super::digest::{authorization_header, digest_challenge};
use crate::error::{Error, Result};

const CREDENTIALS_HINT: &str = "check the configured username and password";

/// Transport settings for a gateway probe.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// `https://` when true, `http://` otherwise.
    pub use_tls: bool,
    /// Certificate policy; ignored for plain HTTP.
    pub verify: VerifyMode,
    /// Bound on the whole exchange, digest retry included.
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            use_tls: true,
            verify: VerifyMode::default(),
            timeout: Duration::from_secs(20),
            max_redirects: 10,
        }
    }
}

/// Build the HTTP client for one probe.
pub fn build_http_client(options: &ProbeOptions) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(options.timeout)
        .redirect(Policy::limited(options.max_redirects));

    if !options.verify.is_strict() {
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    builder.build().map_err(|e| Error::HttpClient(e.to_string()))
}

/// Turn a received body into a result: JSON goes to `body`, anything else
/// to `raw_text`.
pub fn parse_response_body(status: u16, bytes: &[u8]) -> ProbeResult {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(body) => ProbeResult {
            status_code: Some(status),
            body: Some(body),
            ..Default::default()
        },
        Err(e) => {
            tracing::debug!("Response body is not JSON ({}), keeping raw text", e);
            ProbeResult {
                status_code: Some(status),
                raw_text: Some(String::from_utf8_lossy(bytes).into_owned()),
                parse_error: Some(ProbeError::new(
                    ProbeErrorKind::ResponseParse,
                    ProbeStage::AwaitingResponse,
                    e.to_string(),
                )),
                ..Default::default()
            }
        }
    }
}

/// Stages a probe went through, readable after the exchange was cancelled.
struct StageTracker(Mutex<Vec<ProbeStage>>);

impl StageTracker {
    fn new() -> Self {
        Self(Mutex::new(vec![ProbeStage::Idle]))
    }

    fn set(&self, stage: ProbeStage) {
        if let Ok(mut path) = self.0.lock() {
            if path.last() != Some(&stage) {
                path.push(stage);
            }
        }
        tracing::trace!(stage = %stage, "Probe stage");
    }

    fn get(&self) -> ProbeStage {
        self.0
            .lock()
            .ok()
            .and_then(|path| path.last().copied())
            .unwrap_or(ProbeStage::Failed)
    }

    /// Record the stage `error` was classified into, then `Failed`.
    fn fail(&self, error: ProbeError) -> ProbeError {
        self.set(error.stage);
        self.set(ProbeStage::Failed);
        error
    }

    fn path(&self) -> Vec<ProbeStage> {
        self.0.lock().map(|path| path.to_vec()).unwrap_or_default()
    }
}

/// Sends one `smgw-info` request to a gateway.
///
/// Each call builds its own client and drops it before returning, so no
/// connection outlives a probe.
pub struct GatewayProbe {
    options: ProbeOptions,
}

impl GatewayProbe {
    pub fn new(options: ProbeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Probe `target`. Failures are captured in the returned result.
    pub async fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        let span = tracing::info_span!(
            "gateway_probe",
            host = %target.host,
            port = target.port,
            tls = self.options.use_tls
        );
        self.probe_inner(target).instrument(span).await
    }

    async fn probe_inner(&self, target: &ProbeTarget) -> ProbeResult {
        let stage = StageTracker::new();
        let result = self.run(target, &stage).await;
        log_result(&result, &stage);
        result
    }

    async fn run(&self, target: &ProbeTarget, stage: &StageTracker) -> ProbeResult {
        let started = Instant::now();

        let mut result = match self.prepare(target) {
            Ok((client, url, body)) => {
                tracing::info!(
                    username = %target.username,
                    verify = %self.options.verify,
                    "POST {} ({} bytes)",
                    url,
                    body.len()
                );
                let exchange = self.exchange(&client, target, url, &body, stage);
                match tokio::time::timeout(self.options.timeout, exchange).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(error)) => ProbeResult::failed(stage.fail(error)),
                    Err(_) => ProbeResult::failed(stage.fail(ProbeError::new(
                        ProbeErrorKind::Timeout,
                        stage.get(),
                        format!("no answer within {}s", self.options.timeout.as_secs()),
                    ))),
                }
            }
            Err(e) => ProbeResult::failed(stage.fail(ProbeError::new(
                ProbeErrorKind::Request,
                ProbeStage::Idle,
                e.to_string(),
            ))),
        };

        result.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        result
    }

    fn prepare(&self, target: &ProbeTarget) -> Result<(Client, Url, EncodedBody)> {
        let body = encode_json(&SmgwRequest::smgw_info())?;
        let endpoint = target.endpoint_url(self.options.use_tls);
        let url = Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        let client = build_http_client(&self.options)?;
        Ok((client, url, body))
    }

    async fn exchange(
        &self,
        client: &Client,
        target: &ProbeTarget,
        url: Url,
        body: &EncodedBody,
        stage: &StageTracker,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        let use_tls = self.options.use_tls;
        let classify = |e: reqwest::Error| classify_transport_error(&e, stage.get(), use_tls);

        stage.set(ProbeStage::Connecting);
        let response = send(client, url, body, None).await.map_err(classify)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.finish(response, stage).await;
        }

        stage.set(ProbeStage::Authenticating);
        let challenge = digest_challenge(response.headers()).map(str::to_string);
        let Some(challenge) = challenge else {
            let result = self.read(response, stage).await?;
            stage.set(ProbeStage::Failed);
            return Ok(with_auth_failure(
                result,
                "server answered 401 without a digest challenge",
            ));
        };

        // Redirects may have moved the endpoint; answer where the challenge came from.
        let retry_url = response.url().clone();
        let authorization = authorization_header(
            &challenge,
            &target.username,
            &target.password,
            retry_url.path(),
            body.as_bytes(),
        )
        .map_err(|e| {
            ProbeError::new(
                ProbeErrorKind::AuthenticationFailure,
                ProbeStage::Authenticating,
                format!("unusable digest challenge: {}", e),
            )
        })?;
        drop(response);

        tracing::debug!("Answering digest challenge");
        let response = send(client, retry_url, body, Some(&authorization))
            .await
            .map_err(classify)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let result = self.read(response, stage).await?;
            stage.set(ProbeStage::Failed);
            return Ok(with_auth_failure(result, "digest credentials rejected"));
        }

        self.finish(response, stage).await
    }

    async fn finish(
        &self,
        response: Response,
        stage: &StageTracker,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        stage.set(ProbeStage::AwaitingResponse);
        let result = self.read(response, stage).await?;
        stage.set(ProbeStage::Succeeded);
        Ok(result)
    }

    async fn read(
        &self,
        response: Response,
        stage: &StageTracker,
    ) -> std::result::Result<ProbeResult, ProbeError> {
        let status = response.status().as_u16();
        tracing::info!("Status Code: {}", status);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(&e, stage.get(), self.options.use_tls))?;
        Ok(parse_response_body(status, &bytes))
    }
}

async fn send(
    client: &Client,
    url: Url,
    body: &EncodedBody,
    authorization: Option<&str>,
) -> reqwest::Result<Response> {
    let length = body.length_header();
    let mut request = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_LENGTH, &length)
        .header(X_CONTENT_LENGTH, &length)
        .body(body.as_bytes().to_vec());

    if let Some(authorization) = authorization {
        request = request.header(AUTHORIZATION, authorization);
    }

    request.send().await
}

fn with_auth_failure(mut result: ProbeResult, message: &str) -> ProbeResult {
    result.error = Some(
        ProbeError::new(
            ProbeErrorKind::AuthenticationFailure,
            ProbeStage::Authenticating,
            message,
        )
        .with_hint(CREDENTIALS_HINT),
    );
    result
}

fn log_result(result: &ProbeResult, stage: &StageTracker) {
    let path = stage
        .path()
        .iter()
        .map(ProbeStage::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    tracing::debug!(stages = %path, "Probe finished");

    match &result.error {
        Some(error) => {
            tracing::error!(
                stage = %error.stage,
                kind = %error.kind,
                elapsed_ms = ?result.elapsed_ms,
                "Probe failed: {}",
                error.message
            );
            if let Some(hint) = &error.hint {
                tracing::warn!("{}", hint);
            }
        }
        None => tracing::info!(
            status = ?result.status_code,
            elapsed_ms = ?result.elapsed_ms,
            json = result.body.is_some(),
            "Probe answered"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_options() {
        let options = ProbeOptions::default();
        assert!(options.use_tls);
        assert_eq!(options.verify, VerifyMode::InsecureNoVerify);
        assert_eq!(options.timeout, Duration::from_secs(20));
        assert_eq!(options.max_redirects, 10);
    }

    #[test]
    fn test_build_client_both_modes() {
        assert!(build_http_client(&ProbeOptions::default()).is_ok());
        let strict = ProbeOptions {
            verify: VerifyMode::Strict,
            ..ProbeOptions::default()
        };
        assert!(build_http_client(&strict).is_ok());
    }

    #[test]
    fn test_parse_json_body() {
        let result = parse_response_body(
            200,
            br#"{"smgw-info":{"firmware-info":{"version":"1.2.3"}}}"#,
        );
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.firmware_version(), Some("1.2.3"));
        assert!(result.raw_text.is_none());
        assert!(result.error.is_none());
        assert!(result.parse_error.is_none());
    }

    #[test]
    fn test_parse_non_json_body() {
        let result = parse_response_body(500, b"<html>Internal Error</html>");
        assert_eq!(result.status_code, Some(500));
        assert!(result.body.is_none());
        assert_eq!(result.raw_text.as_deref(), Some("<html>Internal Error</html>"));
        assert!(result.error.is_none());
        let parse_error = result.parse_error.unwrap();
        assert_eq!(parse_error.kind, ProbeErrorKind::ResponseParse);
        assert_eq!(parse_error.stage, ProbeStage::AwaitingResponse);
    }

    #[test]
    fn test_parse_empty_body() {
        let result = parse_response_body(204, b"");
        assert!(result.body.is_none());
        assert_eq!(result.raw_text.as_deref(), Some(""));
    }

    #[test]
    fn test_with_auth_failure_keeps_response() {
        let result = with_auth_failure(
            parse_response_body(401, br#"{"error":"unauthorized"}"#),
            "digest credentials rejected",
        );
        assert_eq!(result.status_code, Some(401));
        assert_eq!(result.body, Some(json!({"error": "unauthorized"})));
        let error = result.error.unwrap();
        assert_eq!(error.kind, ProbeErrorKind::AuthenticationFailure);
        assert_eq!(error.stage, ProbeStage::Authenticating);
    }

    #[test]
    fn test_stage_tracker() {
        let stage = StageTracker::new();
        assert_eq!(stage.get(), ProbeStage::Idle);
        stage.set(ProbeStage::Authenticating);
        stage.set(ProbeStage::Authenticating);
        assert_eq!(stage.get(), ProbeStage::Authenticating);
        assert_eq!(
            stage.path(),
            vec![ProbeStage::Idle, ProbeStage::Authenticating]
        );
    }

    #[test]
    fn test_stage_tracker_fail_records_classified_stage() {
        let stage = StageTracker::new();
        stage.set(ProbeStage::Connecting);
        let error = stage.fail(ProbeError::new(
            ProbeErrorKind::TlsHandshake {
                plaintext_suspected: false,
            },
            ProbeStage::TlsHandshake,
            "certificate verify failed",
        ));

        assert_eq!(error.stage, ProbeStage::TlsHandshake);
        assert_eq!(stage.get(), ProbeStage::Failed);
        assert_eq!(
            stage.path(),
            vec![
                ProbeStage::Idle,
                ProbeStage::Connecting,
                ProbeStage::TlsHandshake,
                ProbeStage::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_tls_failure_ends_in_failed_stage() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                    .await;
            }
        });

        let probe = GatewayProbe::new(ProbeOptions {
            timeout: Duration::from_secs(5),
            ..ProbeOptions::default()
        });
        let target = ProbeTarget::new("127.0.0.1", port, "admin", "secret");
        let stage = StageTracker::new();
        let result = probe.run(&target, &stage).await;

        assert!(result.error.unwrap().is_plaintext_suspected());
        assert_eq!(
            stage.path(),
            vec![
                ProbeStage::Idle,
                ProbeStage::Connecting,
                ProbeStage::TlsHandshake,
                ProbeStage::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_connection_ends_in_failed_stage() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = GatewayProbe::new(ProbeOptions {
            use_tls: false,
            timeout: Duration::from_secs(5),
            ..ProbeOptions::default()
        });
        let target = ProbeTarget::new("127.0.0.1", port, "admin", "secret");
        let stage = StageTracker::new();
        let result = probe.run(&target, &stage).await;

        assert_eq!(result.error.unwrap().stage, ProbeStage::Connecting);
        assert_eq!(stage.get(), ProbeStage::Failed);
        assert!(!stage.path().contains(&ProbeStage::TlsHandshake));
    }
}
