//! Response-route sub-pipeline handlers.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::config::RouteConfig;
use crate::error::ProxyError;

use super::replacer::Replacer;

/// A backend response captured in full before any byte reached the
/// client.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Per-request context for a diverted response pipeline. Holds the
/// buffered backend response and the finalization flag that keeps the
/// status line from being written twice.
#[derive(Debug)]
pub struct HandleResponseContext {
    pub response: BufferedResponse,
    finalized: bool,
}

impl HandleResponseContext {
    pub fn new(response: BufferedResponse) -> Self {
        Self {
            response,
            finalized: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }
}

/// The response being assembled for the client.
///
/// `write_header` is idempotent: after the first call, later status
/// changes are dropped while body writes still pass through.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    header_written: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            header_written: false,
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn write_header(&mut self, status: StatusCode) {
        if self.header_written {
            return;
        }
        self.status = status;
        self.header_written = true;
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// One provisioned handler of a response-route pipeline.
#[derive(Debug)]
pub enum RouteHandler {
    /// Replays the buffered backend response, optionally overriding
    /// its status. Terminal: marks the pipeline finalized.
    CopyResponse { status_code: Option<String> },

    /// Copies a filtered subset of the buffered response's headers
    /// onto the outbound response. Non-terminal.
    CopyResponseHeaders {
        include: Vec<String>,
        exclude: Vec<String>,
    },

    /// Writes a fixed response. Works outside a diverted pipeline too.
    StaticResponse {
        status_code: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
}

impl RouteHandler {
    pub fn provision(cfg: &RouteConfig) -> Self {
        match cfg {
            RouteConfig::CopyResponse { status_code } => Self::CopyResponse {
                status_code: status_code.clone(),
            },
            RouteConfig::CopyResponseHeaders { include, exclude } => Self::CopyResponseHeaders {
                include: include.iter().map(|f| f.to_ascii_lowercase()).collect(),
                exclude: exclude.iter().map(|f| f.to_ascii_lowercase()).collect(),
            },
            RouteConfig::StaticResponse {
                status_code,
                headers,
                body,
            } => Self::StaticResponse {
                status_code: *status_code,
                headers: headers.clone(),
                body: body.clone(),
            },
        }
    }

    /// Run this handler. `hrc` is present only inside a diverted
    /// response pipeline; the copy handlers fail without it.
    pub fn serve(
        &self,
        out: &mut ResponseWriter,
        hrc: Option<&mut HandleResponseContext>,
        repl: &Replacer,
    ) -> Result<(), ProxyError> {
        match self {
            Self::CopyResponse { status_code } => {
                let Some(hrc) = hrc else {
                    return Err(ProxyError::MisplacedHandler("copy_response"));
                };
                let mut status = hrc.response.status;
                if let Some(raw) = status_code {
                    let expanded = repl.replace_all(raw);
                    if !expanded.is_empty() {
                        status = parse_status(&expanded)?;
                    }
                }
                copy_headers(&hrc.response.headers, out.headers_mut(), &[], &[]);
                out.write_header(status);
                out.write(&hrc.response.body);
                hrc.finalize();
                Ok(())
            }
            Self::CopyResponseHeaders { include, exclude } => {
                let Some(hrc) = hrc else {
                    return Err(ProxyError::MisplacedHandler("copy_response_headers"));
                };
                copy_headers(&hrc.response.headers, out.headers_mut(), include, exclude);
                Ok(())
            }
            Self::StaticResponse {
                status_code,
                headers,
                body,
            } => {
                for (field, value) in headers {
                    let expanded = repl.replace_all(value);
                    if let (Ok(name), Ok(value)) = (
                        field.parse::<HeaderName>(),
                        HeaderValue::from_str(&expanded),
                    ) {
                        out.headers_mut().append(name, value);
                    }
                }
                let status = StatusCode::from_u16(*status_code)
                    .map_err(|_| ProxyError::StatusOverride(status_code.to_string()))?;
                out.write_header(status);
                out.write(repl.replace_all(body).as_bytes());
                Ok(())
            }
        }
    }
}

fn parse_status(s: &str) -> Result<StatusCode, ProxyError> {
    s.parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ProxyError::StatusOverride(s.to_string()))
}

/// Copy headers from `src` to `dst` honoring an inclusion or exclusion
/// list. Field names in the lists are lowercase. Both lists empty
/// copies everything; both non-empty is rejected at validation time.
fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap, include: &[String], exclude: &[String]) {
    for (name, value) in src {
        let field = name.as_str();
        if !include.is_empty() && !include.iter().any(|f| f == field) {
            continue;
        }
        if exclude.iter().any(|f| f == field) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}
