//! HTTP digest authentication (RFC 7616 / RFC 2617).
//!
//! Challenge parsing and response hashing are done by the `digest_auth`
//! crate; this module only picks the challenge out of the response headers.

use digest_auth::AuthContext;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};

/// Return the first `WWW-Authenticate` challenge using the Digest scheme.
///
/// A header value may list several challenges (`Basic realm="x", Digest
/// ...`); the returned slice starts at the Digest one.
pub fn digest_challenge(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| digest_offset(value).and_then(|start| value.get(start..)))
}

/// Byte offset of a `Digest` scheme token: at the start of the value or
/// right after a comma, and followed by whitespace.
fn digest_offset(value: &str) -> Option<usize> {
    let lower = value.to_ascii_lowercase();
    lower.match_indices("digest").map(|(start, _)| start).find(|&start| {
        let before = lower[..start].trim_end();
        let after = &lower[start + "digest".len()..];
        (before.is_empty() || before.ends_with(','))
            && after.starts_with(|c: char| c.is_ascii_whitespace())
    })
}

/// Compute the `Authorization` header answering `challenge` for a POST of
/// `body` to `uri`.
///
/// The body is only hashed when the server asks for `qop=auth-int`.
pub fn authorization_header(
    challenge: &str,
    username: &str,
    password: &str,
    uri: &str,
    body: &[u8],
) -> Result<String, digest_auth::Error> {
    let mut prompt = digest_auth::parse(challenge)?;
    let context = AuthContext::new_post(username, password, uri, Some(body));
    let answer = prompt.respond(&context)?;
    Ok(answer.to_header_string())
}
