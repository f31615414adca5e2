//! ICMP echo through the system `ping` utility.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::Pinger;

/// Extra time granted to the subprocess beyond its own timeout before it is
/// killed.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Output from a `ping` run.
#[derive(Debug, Clone)]
pub struct PingOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl PingOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Program and arguments for one echo request on a given OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingInvocation {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl PingInvocation {
    /// Build the invocation for `os` (a value of [`std::env::consts::OS`]).
    ///
    /// - Windows: `ping -n 1 -w <ms> <addr>`
    /// - macOS: `ping -c 1 -t <secs> <addr>` (`ping6` for IPv6, which has no
    ///   overall timeout flag)
    /// - everything else: `ping -c 1 -W <secs> <addr>`
    pub fn for_os(os: &str, address: IpAddr, timeout: Duration) -> Self {
        let secs = timeout.as_secs().max(1).to_string();
        let address = address.to_string();

        match os {
            "windows" => Self {
                program: "ping",
                args: vec![
                    "-n".to_string(),
                    "1".to_string(),
                    "-w".to_string(),
                    timeout.as_millis().max(1).to_string(),
                    address,
                ],
            },
            "macos" if address.contains(':') => Self {
                program: "ping6",
                args: vec!["-c".to_string(), "1".to_string(), address],
            },
            "macos" => Self {
                program: "ping",
                args: vec!["-c".to_string(), "1".to_string(), "-t".to_string(), secs, address],
            },
            _ => Self {
                program: "ping",
                args: vec!["-c".to_string(), "1".to_string(), "-W".to_string(), secs, address],
            },
        }
    }

    pub fn command_line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// [`Pinger`] backed by the host's `ping` utility.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    os: &'static str,
}

impl SystemPinger {
    pub fn new() -> Self {
        Self {
            os: std::env::consts::OS,
        }
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, address: IpAddr, timeout: Duration) -> std::io::Result<PingOutput> {
        let invocation = PingInvocation::for_os(self.os, address, timeout);
        tracing::debug!("Executing: {}", invocation.command_line());

        let child = Command::new(invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(timeout + KILL_GRACE, child.wait_with_output()).await
        {
            Ok(output) => output?,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("`{}` did not exit in time", invocation.command_line()),
                ))
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::debug!(
            "Command exited with code {}: {}",
            exit_code,
            invocation.command_line()
        );

        Ok(PingOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> IpAddr {
        "192.168.1.10".parse().unwrap()
    }

    #[test]
    fn test_linux_invocation() {
        let inv = PingInvocation::for_os("linux", v4(), Duration::from_secs(2));
        assert_eq!(inv.program, "ping");
        assert_eq!(inv.args, vec!["-c", "1", "-W", "2", "192.168.1.10"]);
    }

    #[test]
    fn test_windows_invocation_uses_milliseconds() {
        let inv = PingInvocation::for_os("windows", v4(), Duration::from_secs(2));
        assert_eq!(inv.args, vec!["-n", "1", "-w", "2000", "192.168.1.10"]);
    }

    #[test]
    fn test_macos_invocation() {
        let inv = PingInvocation::for_os("macos", v4(), Duration::from_secs(2));
        assert_eq!(inv.args, vec!["-c", "1", "-t", "2", "192.168.1.10"]);

        let inv = PingInvocation::for_os("macos", "fe80::1".parse().unwrap(), Duration::from_secs(2));
        assert_eq!(inv.program, "ping6");
        assert_eq!(inv.args, vec!["-c", "1", "fe80::1"]);
    }

    #[test]
    fn test_subsecond_timeout_rounds_up() {
        let inv = PingInvocation::for_os("linux", v4(), Duration::from_millis(300));
        assert_eq!(inv.args[3], "1");
    }

    #[test]
    fn test_command_line() {
        let inv = PingInvocation::for_os("freebsd", v4(), Duration::from_secs(5));
        assert_eq!(inv.command_line(), "ping -c 1 -W 5 192.168.1.10");
    }

    #[test]
    fn test_ping_output_success() {
        let output = PingOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(output.success());
        assert!(!PingOutput { exit_code: 2, ..output }.success());
    }
}
