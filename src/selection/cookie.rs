//! Sticky-cookie selection.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use sha2::Sha256;

use crate::http::request::RequestContext;
use crate::upstream::Host;

use super::Policy;

type HmacSha256 = Hmac<Sha256>;

/// Sticky selection keyed by an HMAC cookie.
///
/// The cookie value is `HMAC-SHA256(secret, dial)` in hex, so it never
/// reveals pool order or addresses, and it stays valid across reloads
/// as long as the secret and the host's dial address are unchanged.
/// Requests without a valid cookie are routed by the fallback policy
/// and receive a fresh cookie for the chosen host.
pub struct CookieHash {
    name: String,
    secret: String,
    max_age_secs: Option<u64>,
    fallback: Box<dyn Policy>,
}

impl CookieHash {
    pub fn new(
        name: String,
        secret: String,
        max_age_secs: Option<u64>,
        fallback: Box<dyn Policy>,
    ) -> Self {
        Self {
            name,
            secret,
            max_age_secs,
            fallback,
        }
    }

    fn select_new(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        mut resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let host = self.fallback.select(pool, req, resp.as_deref_mut())?;
        if let (Some(headers), Some(digest)) = (resp, hash_cookie(&self.secret, host.dial())) {
            let mut cookie = format!("{}={digest}; Path=/", self.name);
            if let Some(max_age) = self.max_age_secs {
                cookie.push_str(&format!("; Max-Age={max_age}"));
            }
            if req.scheme_is_https() {
                cookie.push_str("; Secure; SameSite=None");
            }
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
        Some(host)
    }
}

impl Policy for CookieHash {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let Some(value) = req.cookie_value(&self.name) else {
            return self.select_new(pool, req, resp);
        };
        for host in pool {
            if host.available() && hash_cookie(&self.secret, host.dial()).as_deref() == Some(&*value)
            {
                return Some(Arc::clone(host));
            }
        }
        // Stale cookie, likely a host that left the pool.
        self.select_new(pool, req, resp)
    }
}

/// Hex HMAC-SHA256 digest of a dial address.
fn hash_cookie(secret: &str, dial: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(dial.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}
