//! First-available selection.

use std::sync::Arc;

use http::HeaderMap;

use crate::http::request::RequestContext;
use crate::upstream::Host;

use super::Policy;

/// Picks the first available host in configured order. Useful for
/// primary/backup pools where later hosts only see traffic when the
/// primaries are down.
#[derive(Debug, Default)]
pub struct First;

impl Policy for First {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        pool.iter().find(|h| h.available()).map(Arc::clone)
    }
}
