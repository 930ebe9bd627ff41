//! Rendezvous-hashed selection policies.
//!
//! Every hash policy maps a request key onto a host with
//! highest-random-weight (rendezvous) hashing: each available host is
//! scored by `hash64(dial + key)` and the highest score wins. Adding
//! or removing a host only remaps the keys that scored highest on the
//! changed host; every other key keeps its assignment.

use std::sync::Arc;

use http::HeaderMap;

use crate::http::request::{first_header_value, RequestContext};
use crate::upstream::Host;

use super::Policy;

/// 64-bit digest of a key: the first eight bytes of its BLAKE3 hash,
/// little-endian.
pub fn hash64(key: &str) -> u64 {
    let digest = blake3::hash(key.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(buf)
}

/// Rendezvous selection: the available host whose dial address scores
/// highest against the key.
pub fn host_by_hashing(pool: &[Arc<Host>], key: &str) -> Option<Arc<Host>> {
    let mut highest = 0u64;
    let mut picked = None;
    for host in pool {
        if !host.available() {
            continue;
        }
        let score = hash64(&format!("{}{}", host.dial(), key));
        if score > highest {
            highest = score;
            picked = Some(Arc::clone(host));
        }
    }
    picked
}

/// Hashes the peer address of the accepted connection.
#[derive(Debug, Default)]
pub struct IpHash;

impl Policy for IpHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        host_by_hashing(pool, &req.remote_ip.to_string())
    }
}

/// Hashes the resolved client address, which honors forwarding headers
/// from trusted proxies.
#[derive(Debug, Default)]
pub struct ClientIpHash;

impl Policy for ClientIpHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        host_by_hashing(pool, &req.client_ip.to_string())
    }
}

/// Hashes the full request URI (path and query).
#[derive(Debug, Default)]
pub struct UriHash;

impl Policy for UriHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        host_by_hashing(pool, &req.uri)
    }
}

/// Hashes the values of one query key, joined with commas. Requests
/// without the key are delegated to the fallback policy.
pub struct QueryHash {
    key: String,
    fallback: Box<dyn Policy>,
}

impl QueryHash {
    pub fn new(key: String, fallback: Box<dyn Policy>) -> Self {
        Self { key, fallback }
    }
}

impl Policy for QueryHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let query = req.uri.split_once('?').map(|(_, q)| q).unwrap_or("");
        let vals: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == self.key.as_str())
            .map(|(_, v)| v.into_owned())
            .collect();
        if vals.is_empty() {
            return self.fallback.select(pool, req, resp);
        }
        host_by_hashing(pool, &vals.join(","))
    }
}

/// Hashes the first value of one request header. Requests without the
/// header are delegated to the fallback policy.
pub struct HeaderHash {
    field: String,
    fallback: Box<dyn Policy>,
}

impl HeaderHash {
    pub fn new(field: String, fallback: Box<dyn Policy>) -> Self {
        Self { field, fallback }
    }
}

impl Policy for HeaderHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        // The Host header lives in the request authority, not the
        // header map.
        let value = if self.field.eq_ignore_ascii_case("host") {
            req.authority.clone()
        } else {
            first_header_value(req.headers, &self.field)
        };
        match value {
            Some(v) if !v.is_empty() => host_by_hashing(pool, &v),
            _ => self.fallback.select(pool, req, resp),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::super::testutil::{hosts, request};
    use super::super::Random;
    use super::*;
    use crate::http::request::RequestContext;
    use http::HeaderValue;

    #[test]
    fn same_key_same_host() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let a = host_by_hashing(&pool, "alpha").unwrap();
        for _ in 0..10 {
            assert_eq!(host_by_hashing(&pool, "alpha").unwrap().dial(), a.dial());
        }
    }

    #[test]
    fn removing_an_unchosen_host_keeps_assignment() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let picked = host_by_hashing(&pool, "alpha").unwrap();
        let reduced: Vec<_> = pool
            .iter()
            .filter(|h| h.dial() != picked.dial())
            .cloned()
            .chain(std::iter::once(Arc::clone(&picked)))
            .collect();
        // Drop one of the hosts that lost the rendezvous.
        let without_loser: Vec<_> = reduced[1..].to_vec();
        let repicked = host_by_hashing(&without_loser, "alpha").unwrap();
        assert_eq!(repicked.dial(), picked.dial());
    }

    #[test]
    fn unavailable_hosts_are_excluded() {
        let pool = hosts(&["h0", "h1"]);
        let picked = host_by_hashing(&pool, "alpha").unwrap();
        picked.set_healthy(false);
        let repicked = host_by_hashing(&pool, "alpha").unwrap();
        assert_ne!(repicked.dial(), picked.dial());
    }

    #[test]
    fn ip_hash_is_sticky_per_peer() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let headers = HeaderMap::new();
        let a = RequestContext::new(
            "10.0.0.1".parse::<IpAddr>().unwrap(),
            "/".to_string(),
            None,
            &headers,
            false,
            &[],
        );
        let first = IpHash.select(&pool, &a, None).unwrap();
        for _ in 0..5 {
            assert_eq!(IpHash.select(&pool, &a, None).unwrap().dial(), first.dial());
        }
    }

    #[test]
    fn uri_hash_distinguishes_uris() {
        let pool = hosts(&["h0", "h1", "h2", "h3", "h4", "h5", "h6", "h7"]);
        let headers = HeaderMap::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..50 {
            let req = request(&headers, &format!("/path/{i}"));
            seen.insert(UriHash.select(&pool, &req, None).unwrap().dial().to_string());
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn query_hash_joins_values_and_falls_back() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let headers = HeaderMap::new();
        let policy = QueryHash::new("user".to_string(), Box::new(Random));

        let req = request(&headers, "/search?user=alice");
        let first = policy.select(&pool, &req, None).unwrap();
        for _ in 0..5 {
            let again = policy.select(&pool, &req, None).unwrap();
            assert_eq!(again.dial(), first.dial());
        }

        // Repeated keys hash their joined values, not just the first.
        let multi = request(&headers, "/search?user=alice&user=bob");
        let joined = policy.select(&pool, &multi, None).unwrap();
        assert_eq!(joined.dial(), host_by_hashing(&pool, "alice,bob").unwrap().dial());

        // Missing key delegates without panicking.
        let miss = request(&headers, "/search?other=1");
        assert!(policy.select(&pool, &miss, None).is_some());
    }

    #[test]
    fn header_hash_reads_host_from_authority() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let headers = HeaderMap::new();
        let policy = HeaderHash::new("Host".to_string(), Box::new(Random));
        let req = request(&headers, "/");
        let picked = policy.select(&pool, &req, None).unwrap();
        assert_eq!(
            picked.dial(),
            host_by_hashing(&pool, "example.com").unwrap().dial()
        );
    }

    #[test]
    fn header_hash_uses_first_occurrence_unsplit() {
        let pool = hosts(&["h0", "h1", "h2"]);
        let mut headers = HeaderMap::new();
        headers.append("x-shard", HeaderValue::from_static("a, b"));
        headers.append("x-shard", HeaderValue::from_static("c"));
        let policy = HeaderHash::new("x-shard".to_string(), Box::new(Random));
        let req = request(&headers, "/");
        let picked = policy.select(&pool, &req, None).unwrap();
        assert_eq!(picked.dial(), host_by_hashing(&pool, "a, b").unwrap().dial());
    }
}
