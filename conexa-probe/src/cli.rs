//! Command line interface.

use clap::Parser;
use conexa_common::VerifyMode;

/// Connection test for Theben Conexa smart-meter gateways.
///
/// Connection settings come from `CONEXA_*` environment variables or
/// `conexa.toml`; the flags below override them.
#[derive(Debug, Parser)]
#[command(name = "conexa-probe", version)]
pub struct Cli {
    /// Gateway hostname or address (CONEXA_IP_ADDRESS)
    #[arg(long)]
    pub host: Option<String>,

    /// Gateway port (CONEXA_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Digest username (CONEXA_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Use http:// instead of https://
    #[arg(long)]
    pub plain: bool,

    /// Certificate verification: strict or insecure
    #[arg(long)]
    pub verify: Option<VerifyMode>,

    /// Overall request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip the DNS and ping check
    #[arg(long)]
    pub skip_reachability: bool,

    /// Continue with the request when the device does not answer ping
    #[arg(long)]
    pub no_require_ping: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Configuration keys set on the command line.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(host) = &self.host {
            overrides.push(("ip_address", host.clone()));
        }
        if let Some(port) = self.port {
            overrides.push(("port", port.to_string()));
        }
        if let Some(username) = &self.username {
            overrides.push(("username", username.clone()));
        }
        if self.plain {
            overrides.push(("use_tls", "false".to_string()));
        }
        if let Some(verify) = self.verify {
            overrides.push(("verify", verify.to_string()));
        }
        if let Some(timeout) = self.timeout {
            overrides.push(("request_timeout_secs", timeout.to_string()));
        }
        if self.skip_reachability {
            overrides.push(("skip_reachability", "true".to_string()));
        }
        if self.no_require_ping {
            overrides.push(("require_ping", "false".to_string()));
        }
        overrides
    }
}
