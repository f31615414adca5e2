//! SMGW machine-to-machine protocol helpers.
//!
//! The Conexa gateway exposes a single JSON-RPC-like endpoint. Every call is
//! a POST of a JSON object naming the method to invoke.
//!
//! # Request Format
//!
//! ```text
//! POST /smgw/m2m/ HTTP/1.1
//! Content-Type: application/json
//! Content-Length: 22
//! X-Content-Length: 22
//!
//! {"method":"smgw-info"}
//! ```
//!
//! The gateway rejects requests whose `X-Content-Length` does not match the
//! number of body bytes, so both length headers are derived from the same
//! encoded buffer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the machine-to-machine endpoint.
pub const SMGW_PATH: &str = "/smgw/m2m/";

/// Method name of the gateway info call.
pub const SMGW_INFO_METHOD: &str = "smgw-info";

/// Vendor header carrying the body length.
pub const X_CONTENT_LENGTH: &str = "x-content-length";

/// JSON pointer to the firmware version inside an `smgw-info` response.
pub const FIRMWARE_VERSION_POINTER: &str = "/smgw-info/firmware-info/version";

/// Request body for an SMGW call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmgwRequest {
    pub method: String,
}

impl SmgwRequest {
    /// The `smgw-info` call.
    pub fn smgw_info() -> Self {
        Self {
            method: SMGW_INFO_METHOD.to_string(),
        }
    }
}

/// A request body serialized to compact JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    bytes: Vec<u8>,
}

impl EncodedBody {
    /// Exact UTF-8 byte length, used for both length headers.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Header value for `Content-Length` and `X-Content-Length`.
    pub fn length_header(&self) -> String {
        self.bytes.len().to_string()
    }
}

/// Serialize any body to canonical (compact) JSON.
pub fn encode_json<T: Serialize>(body: &T) -> serde_json::Result<EncodedBody> {
    Ok(EncodedBody {
        bytes: serde_json::to_vec(body)?,
    })
}

/// Read `smgw-info.firmware-info.version` from a response body.
///
/// Returns `None` when the field is missing or not a string; the rest of the
/// schema is not assumed.
pub fn firmware_version(body: &Value) -> Option<&str> {
    body.pointer(FIRMWARE_VERSION_POINTER)?.as_str()
}
