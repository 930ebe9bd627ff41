//! Placeholder expansion for response-handler configuration.

use std::collections::HashMap;

/// Request-scoped placeholder table.
///
/// Configuration strings may reference values as `{name}`; expansion
/// substitutes the stored value, or the empty string for a name that
/// was never set. The interceptor populates `intercept.status_code`
/// and `intercept.header.*` before running a diverted sub-pipeline.
#[derive(Debug, Default)]
pub struct Replacer {
    vars: HashMap<String, String>,
}

impl Replacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Expand every `{name}` occurrence in `input`. Unknown names
    /// expand to the empty string; a `{` without a closing `}` is
    /// passed through literally.
    pub fn replace_all(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            match rest[start..].find('}') {
                Some(end) => {
                    let name = &rest[start + 1..start + end];
                    if let Some(value) = self.vars.get(name) {
                        out.push_str(value);
                    }
                    rest = &rest[start + end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
