//! Per-request context handed to the selection policies.

use std::net::IpAddr;

use http::HeaderMap;

/// The request-derived inputs a selection policy may consult.
///
/// Borrowed from the inbound request; building one allocates only for
/// the URI string.
#[derive(Debug)]
pub struct RequestContext<'a> {
    /// Peer address of the accepted connection.
    pub remote_ip: IpAddr,

    /// Resolved client address. Equals `remote_ip` unless the peer is
    /// a trusted proxy that forwarded a client address.
    pub client_ip: IpAddr,

    /// Request URI (path and query).
    pub uri: String,

    /// Request authority (the Host), when present.
    pub authority: Option<String>,

    /// Inbound request headers.
    pub headers: &'a HeaderMap,

    /// Whether the inbound connection itself is TLS.
    pub tls: bool,

    /// Whether the peer is listed in `trusted_proxies`.
    pub trusted_proxy: bool,
}

impl<'a> RequestContext<'a> {
    /// Build a context from the peer address and request parts.
    ///
    /// When the peer is a trusted proxy, the client address is taken
    /// from the last `X-Forwarded-For` hop; otherwise forwarding
    /// headers are ignored.
    pub fn new(
        remote_ip: IpAddr,
        uri: String,
        authority: Option<String>,
        headers: &'a HeaderMap,
        tls: bool,
        trusted_proxies: &[IpAddr],
    ) -> Self {
        let trusted_proxy = trusted_proxies.contains(&remote_ip);
        let client_ip = if trusted_proxy {
            forwarded_client_ip(headers).unwrap_or(remote_ip)
        } else {
            remote_ip
        };

        Self {
            remote_ip,
            client_ip,
            uri,
            authority,
            headers,
            tls,
            trusted_proxy,
        }
    }

    /// Whether the request reached us over HTTPS, either directly or
    /// as declared by a trusted proxy via `X-Forwarded-Proto`.
    pub fn scheme_is_https(&self) -> bool {
        if self.tls {
            return true;
        }
        if !self.trusted_proxy {
            return false;
        }
        last_header_value(self.headers, "x-forwarded-proto")
            .map(|v| v.eq_ignore_ascii_case("https"))
            .unwrap_or(false)
    }

    /// The value of the named cookie, if the request carries one.
    pub fn cookie_value(&self, name: &str) -> Option<String> {
        for value in self.headers.get_all(http::header::COOKIE) {
            // A malformed Cookie header must not mask later ones.
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for pair in raw.split(';') {
                let mut parts = pair.trim().splitn(2, '=');
                if parts.next() == Some(name) {
                    return parts.next().map(str::to_string);
                }
            }
        }
        None
    }
}

/// The last hop of `X-Forwarded-For`, which is the one appended by the
/// directly-connected proxy.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let value = last_header_value(headers, "x-forwarded-for")?;
    value.rsplit(',').next()?.trim().parse().ok()
}

/// The full value of the first occurrence of a header field.
pub fn first_header_value(headers: &HeaderMap, field: &str) -> Option<String> {
    let value = headers.get(field)?;
    value.to_str().ok().map(str::to_string)
}

/// The last comma-separated element of the last occurrence of a
/// header field.
pub fn last_header_value(headers: &HeaderMap, field: &str) -> Option<String> {
    let value = headers.get_all(field).iter().next_back()?;
    let raw = value.to_str().ok()?;
    raw.rsplit(',').next().map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn ctx<'a>(remote: &str, headers: &'a HeaderMap, trusted: &[IpAddr]) -> RequestContext<'a> {
        RequestContext::new(ip(remote), "/".to_string(), None, headers, false, trusted)
    }

    #[test]
    fn untrusted_peer_ignores_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9"));
        let c = ctx("192.168.1.5", &headers, &[]);
        assert_eq!(c.client_ip, ip("192.168.1.5"));
        assert!(!c.trusted_proxy);
    }

    #[test]
    fn trusted_peer_uses_last_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.9, 10.0.0.7"),
        );
        let trusted = [ip("192.168.1.5")];
        let c = ctx("192.168.1.5", &headers, &trusted);
        assert_eq!(c.client_ip, ip("10.0.0.7"));
    }

    #[test]
    fn https_declared_by_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        let trusted = [ip("192.168.1.5")];
        assert!(ctx("192.168.1.5", &headers, &trusted).scheme_is_https());
        assert!(!ctx("192.168.1.5", &headers, &[]).scheme_is_https());
    }

    #[test]
    fn https_uses_last_forwarded_proto_value() {
        let mut headers = HeaderMap::new();
        headers.append(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static("https, http"),
        );
        let trusted = [ip("192.168.1.5")];
        assert!(!ctx("192.168.1.5", &headers, &trusted).scheme_is_https());
    }

    #[test]
    fn cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("a=1; lb=deadbeef; b=2"));
        let c = ctx("127.0.0.1", &headers, &[]);
        assert_eq!(c.cookie_value("lb").as_deref(), Some("deadbeef"));
        assert_eq!(c.cookie_value("missing"), None);
    }

    #[test]
    fn cookie_lookup_skips_undecodable_header() {
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        headers.append("cookie", HeaderValue::from_static("lb=deadbeef"));
        let c = ctx("127.0.0.1", &headers, &[]);
        assert_eq!(c.cookie_value("lb").as_deref(), Some("deadbeef"));
    }
}
