//! Reachability check followed by the gateway probe.

use chrono::Utc;
use conexa_common::{ProbeReport, ProbeTarget, ReachabilityResult};

use crate::config::Config;
use crate::gateway::GatewayProbe;
use crate::reachability::ReachabilityChecker;

/// Runs the two probe components in order for one target.
pub struct ProbeSession {
    checker: Option<ReachabilityChecker>,
    probe: GatewayProbe,
    require_ping: bool,
}

impl ProbeSession {
    /// `checker` of `None` skips the reachability check.
    pub fn new(checker: Option<ReachabilityChecker>, probe: GatewayProbe, require_ping: bool) -> Self {
        Self {
            checker,
            probe,
            require_ping,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let checker = if config.skip_reachability {
            None
        } else {
            Some(ReachabilityChecker::system(config.ping_timeout()))
        };
        Self::new(
            checker,
            GatewayProbe::new(config.probe_options()),
            config.require_ping,
        )
    }

    /// Check reachability, then probe unless the check says to abort.
    pub async fn run(&self, target: &ProbeTarget) -> ProbeReport {
        let checked_at = Utc::now();

        let reachability = match &self.checker {
            Some(checker) => Some(checker.check(&target.host).await),
            None => {
                tracing::debug!(host = %target.host, "Reachability check skipped");
                None
            }
        };

        if let Some(reason) = reachability.as_ref().and_then(|r| self.abort_reason(r)) {
            tracing::error!(
                host = %target.host,
                stage = "reachability",
                "Not probing gateway: {}",
                reason
            );
            return ProbeReport {
                target: target.to_string(),
                checked_at,
                reachability,
                result: None,
            };
        }

        let result = self.probe.probe(target).await;
        ProbeReport {
            target: target.to_string(),
            checked_at,
            reachability,
            result: Some(result),
        }
    }

    fn abort_reason(&self, reachability: &ReachabilityResult) -> Option<String> {
        let detail = reachability
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        if !reachability.dns_ok {
            return Some(format!("host could not be resolved ({})", detail));
        }
        if !reachability.ping_ok {
            if self.require_ping {
                return Some(format!("host did not answer ping ({})", detail));
            }
            tracing::warn!("Host did not answer ping, probing anyway ({})", detail);
        }
        None
    }
}
