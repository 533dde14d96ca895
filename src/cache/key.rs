//! Deterministic cache key derivation.
//!
//! `cache:<method>:<path>:<normalized query>:<subject>:<vary values>` — the
//! query string is parsed, sorted, and re-encoded so parameter order never
//! splits the cache, and the subject plus configured vary-header values keep
//! distinct clients from colliding. Empty sections collapse to `-`.

use axum::body::Body;
use axum::http::Request;

use super::policy::CachePolicy;
use crate::identity;

pub fn default_cache_key(policy: &CachePolicy, req: &Request<Body>) -> String {
    let method = req.method().as_str();
    let path = req.uri().path();
    let query = normalized_query(req.uri().query());
    let subject = identity::subject(req).unwrap_or("anon");
    let vary = vary_section(policy, req);
    format!("cache:{method}:{path}:{query}:{subject}:{vary}")
}

fn normalized_query(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(q) if !q.is_empty() => q,
        _ => return "-".to_string(),
    };
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

fn vary_section(policy: &CachePolicy, req: &Request<Body>) -> String {
    if policy.vary_headers.is_empty() {
        return "-".to_string();
    }
    policy
        .vary_headers
        .iter()
        .map(|name| {
            req.headers()
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
        })
        .collect::<Vec<_>>()
        .join(",")
}
