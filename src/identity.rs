//! Request identity helpers shared by the limiter and the cache.
//!
//! The authentication middleware (outside this crate) inserts an
//! [`AuthSubject`] into request extensions after validating credentials; both
//! pipeline stages read it from there and fall back to the client address.

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;

/// Authenticated principal id, injected into request extensions upstream.
#[derive(Debug, Clone)]
pub struct AuthSubject(pub String);

/// The authenticated subject id, if any.
pub fn subject(req: &Request<Body>) -> Option<&str> {
    req.extensions()
        .get::<AuthSubject>()
        .map(|s| s.0.as_str())
}

/// Best-effort client address: the socket peer when the server registered
/// `ConnectInfo`, else the first proxy-forwarded hop.
pub fn client_ip(req: &Request<Body>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }
    for header in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = req.headers().get(header).and_then(|v| v.to_str().ok())
            && let Some(first) = value.split(',').next()
            && let Ok(ip) = first.trim().parse()
        {
            return Some(ip);
        }
    }
    None
}

/// Default rate-limit subject: principal id when authenticated, else client
/// address, else a shared anonymous bucket.
pub fn rate_limit_subject(req: &Request<Body>) -> String {
    if let Some(subject) = subject(req) {
        return format!("user:{subject}");
    }
    match client_ip(req) {
        Some(ip) => format!("ip:{ip}"),
        None => "anon".to_string(),
    }
}
