//! Response interception.
//!
//! Once the backend's status and headers arrive, and before any byte
//! reaches the client, the interceptor evaluates its handler list in
//! order and decides how the response proceeds:
//!
//! ```text
//! Forwarding -> Buffering -> { StreamThrough | ReplaceStatus | Diverted } -> Finalized
//! ```
//!
//! - no handler matches (or the matched handler has nothing to do):
//!   stream through untouched;
//! - the matched handler carries a status override: replace the status
//!   and stream the body;
//! - the matched handler carries routes: buffer the body and run the
//!   route sub-pipeline over it.

pub mod matcher;
pub mod replacer;
pub mod routes;

use http::{HeaderMap, StatusCode};

use crate::config::{ResponseHandlerConfig, ValidationError};
use crate::error::ProxyError;

pub use matcher::{ResponseMatcher, StatusMatcher};
pub use replacer::Replacer;
pub use routes::{BufferedResponse, HandleResponseContext, ResponseWriter, RouteHandler};

/// One provisioned response handler.
struct Handler {
    matcher: Option<ResponseMatcher>,
    status_code: Option<String>,
    routes: Vec<RouteHandler>,
}

impl Handler {
    fn matches(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        match &self.matcher {
            Some(m) => m.matches(status, headers),
            None => true,
        }
    }
}

/// What the interceptor decided for one backend response.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// No handler claimed the response; bytes flow to the client as
    /// received.
    StreamThrough,

    /// The matched handler overrides the status; the body still
    /// streams.
    ReplaceStatus(StatusCode),

    /// The matched handler has routes; the body must be buffered and
    /// handed to `run_routes` with this handler index.
    Divert(usize),
}

/// Provisioned response interceptor.
#[derive(Default)]
pub struct Interceptor {
    handlers: Vec<Handler>,
}

impl Interceptor {
    /// Provision from configuration. Handlers without a matcher are
    /// catch-alls and are moved to the end of the list, preserving
    /// relative order on both sides, so specific matchers always get
    /// first refusal.
    pub fn provision(configs: &[ResponseHandlerConfig]) -> Result<Self, ValidationError> {
        let mut matched = Vec::new();
        let mut catch_all = Vec::new();
        for cfg in configs {
            let handler = Handler {
                matcher: cfg.matcher.as_ref().map(ResponseMatcher::provision).transpose()?,
                status_code: cfg.status_code.clone(),
                routes: cfg.routes.iter().map(RouteHandler::provision).collect(),
            };
            if handler.matcher.is_some() {
                matched.push(handler);
            } else {
                catch_all.push(handler);
            }
        }
        matched.extend(catch_all);
        Ok(Self { handlers: matched })
    }

    /// Decide how a backend response proceeds, given its status and
    /// headers.
    ///
    /// A status override that fails to parse after placeholder
    /// expansion does not abort the request: the effective status
    /// becomes 500 and the failure is logged.
    pub fn evaluate(&self, status: StatusCode, headers: &HeaderMap, repl: &Replacer) -> Decision {
        let Some((index, handler)) = self
            .handlers
            .iter()
            .enumerate()
            .find(|(_, h)| h.matches(status, headers))
        else {
            return Decision::StreamThrough;
        };

        if let Some(raw) = &handler.status_code {
            let expanded = repl.replace_all(raw);
            return match expanded.parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok()) {
                Some(code) => Decision::ReplaceStatus(code),
                None => {
                    tracing::warn!(
                        configured = %raw,
                        expanded = %expanded,
                        "status override did not parse, serving 500"
                    );
                    Decision::ReplaceStatus(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
        }

        if handler.routes.is_empty() {
            return Decision::StreamThrough;
        }
        Decision::Divert(index)
    }

    /// Run the diverted route sub-pipeline of handler `index` over a
    /// fully buffered backend response.
    ///
    /// The buffered status and headers are exposed to the routes as
    /// `intercept.status_code` and `intercept.header.*` placeholders.
    /// The pipeline stops once a terminal handler writes the response;
    /// if none does, the buffered response is discarded.
    pub fn run_routes(
        &self,
        index: usize,
        buffered: BufferedResponse,
        out: &mut ResponseWriter,
        repl: &mut Replacer,
    ) -> Result<(), ProxyError> {
        repl.set("intercept.status_code", buffered.status.as_u16().to_string());
        for name in buffered.headers.keys() {
            // Multi-valued headers surface as one comma-joined value.
            let joined = buffered
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            repl.set(format!("intercept.header.{}", name.as_str()), joined);
        }

        let handler = &self.handlers[index];
        let mut hrc = HandleResponseContext::new(buffered);
        for route in &handler.routes {
            route.serve(out, Some(&mut hrc), repl)?;
            if out.header_written() {
                break;
            }
        }
        Ok(())
    }
}
