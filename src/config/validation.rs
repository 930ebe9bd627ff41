//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate selection-policy parameters (weights, choose, keys)
//! - Detect conflicting response-route options
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the parsed config
//! - Runs before a config is accepted into the system; an invalid
//!   selector refuses startup/reload rather than running degraded

use crate::config::schema::{
    FallbackConfig, MatchConfig, PolicyConfig, ProxyConfig, ResponseHandlerConfig, RouteConfig,
};

/// One semantic problem found in a parsed configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one upstream must be configured")]
    NoUpstreams,

    #[error("duplicate upstream dial address '{0}'")]
    DuplicateUpstream(String),

    #[error("weighted_round_robin requires a non-empty weight list")]
    EmptyWeights,

    #[error("invalid weight value '{0}': weight should be non-zero and positive")]
    InvalidWeight(u32),

    #[error("choose must be at least 2")]
    ChooseTooSmall,

    #[error("query policy requires a non-empty key")]
    MissingQueryKey,

    #[error("header policy requires a non-empty field")]
    MissingHeaderField,

    #[error("cookie max_age should be non-zero and positive")]
    InvalidCookieMaxAge,

    #[error("invalid status matcher '{0}': expected a code like \"404\" or a class like \"2xx\"")]
    InvalidStatusMatcher(String),

    #[error("invalid static response status code {0}")]
    InvalidStaticStatus(u16),

    #[error("cannot define both 'include' and 'exclude' lists at the same time")]
    IncludeExcludeConflict,
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstreams.is_empty() {
        errors.push(ValidationError::NoUpstreams);
    }
    let mut seen = std::collections::HashSet::new();
    for upstream in &config.upstreams {
        if !seen.insert(upstream.dial.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(upstream.dial.clone()));
        }
    }

    validate_policy(&config.load_balancing, &mut errors);

    for handler in &config.handle_response {
        validate_response_handler(handler, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_policy(policy: &PolicyConfig, errors: &mut Vec<ValidationError>) {
    match policy {
        PolicyConfig::RandomChoose { choose } => {
            validate_choose(*choose, errors);
        }
        PolicyConfig::WeightedRoundRobin { weights } => {
            validate_weights(weights, errors);
        }
        PolicyConfig::Query { key, fallback } => {
            if key.is_empty() {
                errors.push(ValidationError::MissingQueryKey);
            }
            validate_fallback(fallback.as_ref(), errors);
        }
        PolicyConfig::Header { field, fallback } => {
            if field.is_empty() {
                errors.push(ValidationError::MissingHeaderField);
            }
            validate_fallback(fallback.as_ref(), errors);
        }
        PolicyConfig::Cookie {
            max_age_secs,
            fallback,
            ..
        } => {
            if *max_age_secs == Some(0) {
                errors.push(ValidationError::InvalidCookieMaxAge);
            }
            validate_fallback(fallback.as_ref(), errors);
        }
        _ => {}
    }
}

fn validate_fallback(fallback: Option<&FallbackConfig>, errors: &mut Vec<ValidationError>) {
    match fallback {
        Some(FallbackConfig::RandomChoose { choose }) => validate_choose(*choose, errors),
        Some(FallbackConfig::WeightedRoundRobin { weights }) => validate_weights(weights, errors),
        _ => {}
    }
}

fn validate_choose(choose: Option<usize>, errors: &mut Vec<ValidationError>) {
    if let Some(choose) = choose {
        if choose < 2 {
            errors.push(ValidationError::ChooseTooSmall);
        }
    }
}

fn validate_weights(weights: &[u32], errors: &mut Vec<ValidationError>) {
    if weights.is_empty() {
        errors.push(ValidationError::EmptyWeights);
    }
    for &weight in weights {
        if weight < 1 {
            errors.push(ValidationError::InvalidWeight(weight));
        }
    }
}

fn validate_response_handler(handler: &ResponseHandlerConfig, errors: &mut Vec<ValidationError>) {
    if let Some(matcher) = &handler.matcher {
        validate_matcher(matcher, errors);
    }
    for route in &handler.routes {
        match route {
            RouteConfig::CopyResponseHeaders { include, exclude } => {
                if !include.is_empty() && !exclude.is_empty() {
                    errors.push(ValidationError::IncludeExcludeConflict);
                }
            }
            RouteConfig::StaticResponse { status_code, .. } => {
                if !(100..=999).contains(status_code) {
                    errors.push(ValidationError::InvalidStaticStatus(*status_code));
                }
            }
            RouteConfig::CopyResponse { .. } => {}
        }
    }
}

fn validate_matcher(matcher: &MatchConfig, errors: &mut Vec<ValidationError>) {
    for status in &matcher.status {
        if !is_valid_status_matcher(status) {
            errors.push(ValidationError::InvalidStatusMatcher(status.clone()));
        }
    }
}

/// Accepts "404" (exact) and "4xx" (class) forms.
fn is_valid_status_matcher(s: &str) -> bool {
    if let Some(class) = s.strip_suffix("xx") {
        return matches!(class.parse::<u16>(), Ok(1..=5));
    }
    matches!(s.parse::<u16>(), Ok(100..=999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UpstreamConfig;

    fn base_config() -> ProxyConfig {
        ProxyConfig {
            upstreams: vec![UpstreamConfig {
                dial: "127.0.0.1:3001".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn accepts_the_default_policy() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn rejects_empty_upstreams() {
        let config = ProxyConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NoUpstreams));
    }

    #[test]
    fn rejects_duplicate_dials() {
        let mut config = base_config();
        config.upstreams.push(UpstreamConfig {
            dial: "127.0.0.1:3001".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::DuplicateUpstream(_)));
    }

    #[test]
    fn rejects_zero_weight() {
        let mut config = base_config();
        config.load_balancing = PolicyConfig::WeightedRoundRobin {
            weights: vec![1, 0, 3],
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidWeight(0)));
    }

    #[test]
    fn rejects_empty_weight_list() {
        let mut config = base_config();
        config.load_balancing = PolicyConfig::WeightedRoundRobin { weights: vec![] };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyWeights));
    }

    #[test]
    fn rejects_choose_below_two() {
        let mut config = base_config();
        config.load_balancing = PolicyConfig::RandomChoose { choose: Some(1) };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ChooseTooSmall));
    }

    #[test]
    fn rejects_missing_query_key() {
        let mut config = base_config();
        config.load_balancing = PolicyConfig::Query {
            key: String::new(),
            fallback: None,
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingQueryKey));
    }

    #[test]
    fn rejects_include_exclude_conflict() {
        let mut config = base_config();
        config.handle_response.push(ResponseHandlerConfig {
            matcher: None,
            status_code: None,
            routes: vec![RouteConfig::CopyResponseHeaders {
                include: vec!["A".into()],
                exclude: vec!["B".into()],
            }],
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::IncludeExcludeConflict));
    }

    #[test]
    fn rejects_malformed_status_matcher() {
        let mut config = base_config();
        config.handle_response.push(ResponseHandlerConfig {
            matcher: Some(MatchConfig {
                status: vec!["2xx".into(), "banana".into()],
                headers: vec![],
            }),
            status_code: None,
            routes: vec![],
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidStatusMatcher("banana".into())]
        );
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = ProxyConfig::default();
        config.load_balancing = PolicyConfig::RandomChoose { choose: Some(0) };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
