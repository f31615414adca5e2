//! Conexa Probe - connection test for Theben Conexa smart-meter gateways.
//!
//! Checks that a gateway is reachable (DNS, one ping) and then issues one
//! digest-authenticated `smgw-info` request to its machine-to-machine
//! endpoint. The library emits `tracing` events and never installs a
//! subscriber; that is left to the binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod reachability;
pub mod session;

pub use cli::Cli;
pub use crate::config::Config;
pub use error::{Error, Result};
pub use gateway::{GatewayProbe, ProbeOptions};
pub use reachability::{Pinger, PingOutput, ReachabilityChecker, SystemPinger};
pub use session::ProbeSession;
