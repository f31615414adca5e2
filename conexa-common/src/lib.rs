//! Conexa Probe Common Types
//!
//! Shared types for probing Theben Conexa smart-meter gateways: targets,
//! results and the SMGW wire protocol.

pub mod protocol;
pub mod result;
pub mod target;

pub use protocol::{encode_json, firmware_version, EncodedBody, SmgwRequest};
pub use result::{
    ProbeError, ProbeErrorKind, ProbeReport, ProbeResult, ProbeStage, ReachabilityResult,
};
pub use target::{ProbeTarget, VerifyMode};
