use std::io;
use std::net::IpAddr;

use tokio::net::lookup_host;

/// Resolve a hostname or literal address to one numeric address.
///
/// Literal addresses (IPv6 optionally bracketed) are returned as-is without
/// a lookup. For names, the first IPv4 address wins, then the first IPv6.
pub async fn resolve(host: &str) -> io::Result<IpAddr> {
    let host = host.trim();
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(address) = literal.parse::<IpAddr>() {
        return Ok(address);
    }

    if host.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty hostname"));
    }

    let addresses: Vec<IpAddr> = lookup_host((host, 0)).await?.map(|a| a.ip()).collect();

    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", host),
            )
        })
}
