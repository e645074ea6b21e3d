//! Client identification helpers

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// Best-effort client IP: first X-Forwarded-For hop, then X-Real-IP,
/// then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

/// SHA-256 of `"{user_agent}:{ip}"`, used when the app sends no device id
pub fn device_fingerprint(user_agent: &str, ip: Option<&str>) -> String {
    let raw = format!("{}:{}", user_agent, ip.unwrap_or("None"));
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("41.66.1.2, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("41.66.1.2"));
    }

    #[test]
    fn test_falls_back_to_peer() {
        let peer: SocketAddr = "192.168.1.4:5000".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)).as_deref(), Some("192.168.1.4"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_fingerprint_is_stable_sha256() {
        let a = device_fingerprint("okhttp/4.9", Some("41.66.1.2"));
        let b = device_fingerprint("okhttp/4.9", Some("41.66.1.2"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, device_fingerprint("okhttp/4.9", Some("41.66.1.3")));
    }
}
