//! Reachability checks run before the gateway probe.
//!
//! A check resolves the target (literal addresses skip resolution) and sends
//! exactly one ICMP echo through a [`Pinger`]. Failures are reported in the
//! [`ReachabilityResult`], never returned as errors.

mod ping;
mod resolve;

pub use ping::{PingInvocation, PingOutput, SystemPinger};
pub use resolve::resolve;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conexa_common::ReachabilityResult;

/// Default timeout for the single echo request.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Sends one ICMP echo request to an address.
///
/// The production implementation shells out to the system `ping` utility,
/// whose flags differ by operating system.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Send one echo request and wait at most `timeout` for the reply.
    ///
    /// `Err` means the ping could not be run at all.
    async fn ping(&self, address: IpAddr, timeout: Duration) -> std::io::Result<PingOutput>;
}

/// Resolves a host and pings it once.
pub struct ReachabilityChecker {
    pinger: Arc<dyn Pinger>,
    timeout: Duration,
}

impl ReachabilityChecker {
    pub fn new(pinger: Arc<dyn Pinger>, timeout: Duration) -> Self {
        Self { pinger, timeout }
    }

    /// Checker backed by the system `ping` utility.
    pub fn system(timeout: Duration) -> Self {
        Self::new(Arc::new(SystemPinger::new()), timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check whether `host` (hostname or literal address) is reachable.
    pub async fn check(&self, host: &str) -> ReachabilityResult {
        let address = match resolve(host).await {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(host = %host, stage = "dns", "DNS resolution failed: {}", e);
                return ReachabilityResult::dns_failed(format!(
                    "DNS resolution failed for {}: {}",
                    host, e
                ));
            }
        };
        tracing::debug!(host = %host, address = %address, "Resolved target");

        match self.pinger.ping(address, self.timeout).await {
            Ok(output) if output.success() => {
                tracing::info!(host = %host, address = %address, "Ping successful");
                ReachabilityResult::reachable(address.to_string())
            }
            Ok(output) => {
                let message = format!(
                    "ping to {} was not successful, exit code {}",
                    address, output.exit_code
                );
                tracing::warn!(host = %host, stage = "ping", "{}", message);
                ReachabilityResult::ping_failed(address.to_string(), message)
            }
            Err(e) => {
                let message = format!("failed to run ping for {}: {}", address, e);
                tracing::warn!(host = %host, stage = "ping", "{}", message);
                ReachabilityResult::ping_failed(address.to_string(), message)
            }
        }
    }
}
