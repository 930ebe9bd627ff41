//! Response matchers for handler selection.

use http::{HeaderMap, StatusCode};

use crate::config::{MatchConfig, ValidationError};

/// One status condition: an exact code ("404") or a whole class
/// ("2xx").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMatcher {
    Exact(u16),
    Class(u16),
}

impl StatusMatcher {
    /// Parse a matcher string. Accepts "NNN" or "Nxx" (any case).
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidStatusMatcher(s.to_string());
        let lower = s.to_ascii_lowercase();
        if let Some(class) = lower.strip_suffix("xx") {
            let n: u16 = class.parse().map_err(|_| invalid())?;
            if (1..=5).contains(&n) {
                return Ok(Self::Class(n));
            }
            return Err(invalid());
        }
        let code: u16 = lower.parse().map_err(|_| invalid())?;
        if !(100..=999).contains(&code) {
            return Err(invalid());
        }
        Ok(Self::Exact(code))
    }

    pub fn matches(&self, status: StatusCode) -> bool {
        match self {
            Self::Exact(code) => status.as_u16() == *code,
            Self::Class(class) => status.as_u16() / 100 == *class,
        }
    }
}

/// Provisioned response matcher: all header conditions must hold, and
/// the status must satisfy at least one status condition (or the
/// status list must be empty).
#[derive(Debug, Default)]
pub struct ResponseMatcher {
    status: Vec<StatusMatcher>,
    headers: Vec<(String, Option<String>)>,
}

impl ResponseMatcher {
    pub fn provision(cfg: &MatchConfig) -> Result<Self, ValidationError> {
        let status = cfg
            .status
            .iter()
            .map(|s| StatusMatcher::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        let headers = cfg
            .headers
            .iter()
            .map(|h| (h.field.to_ascii_lowercase(), h.value.clone()))
            .collect();
        Ok(Self { status, headers })
    }

    pub fn matches(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        if !self.status.is_empty() && !self.status.iter().any(|m| m.matches(status)) {
            return false;
        }
        self.headers.iter().all(|(field, expected)| {
            match (headers.get(field), expected) {
                (Some(actual), Some(want)) => actual.to_str().map(|v| v == want).unwrap_or(false),
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }
}
