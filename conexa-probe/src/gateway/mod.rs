//! Gateway probe: one digest-authenticated `smgw-info` call.

mod classify;
mod client;
mod digest;

pub use client::{build_http_client, parse_response_body, GatewayProbe, ProbeOptions};
