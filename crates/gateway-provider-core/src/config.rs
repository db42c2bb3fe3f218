use std::collections::HashSet;

use crate::errors::{ProviderError, ProviderResult};

/// Immutable-after-registration configuration for one upstream.
///
/// `allowed_paths` may contain exact paths (`/v1/chat/completions`) or
/// parameterized patterns using `{name}` placeholders that match exactly one
/// path segment, e.g. `/v1/models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub requires_api_key: bool,
    pub api_key: Option<String>,
    pub supports_native_usd_cost: bool,
    pub allowed_paths: HashSet<String>,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        requires_api_key: bool,
        api_key: Option<String>,
        supports_native_usd_cost: bool,
        allowed_paths: impl IntoIterator<Item = String>,
    ) -> ProviderResult<Self> {
        let name = name.into();
        if requires_api_key && api_key.is_none() {
            return Err(ProviderError::InvalidConfig(format!(
                "provider '{name}' requires an api key but none was configured"
            )));
        }
        Ok(Self {
            name,
            base_url: base_url.into(),
            requires_api_key,
            api_key,
            supports_native_usd_cost,
            allowed_paths: allowed_paths.into_iter().collect(),
        })
    }

    pub fn path_allowed(&self, path: &str) -> bool {
        self.allowed_paths
            .iter()
            .any(|pattern| path_matches(pattern, path))
    }
}

fn path_matches(pattern: &str, actual: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let actual_segments: Vec<&str> = actual.trim_matches('/').split('/').collect();
    if pattern_segments.len() != actual_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(actual_segments.iter())
        .all(|(p, a)| segment_matches(p, a))
}

fn segment_matches(pattern_segment: &str, actual_segment: &str) -> bool {
    let Some(brace_start) = pattern_segment.find('{') else {
        return pattern_segment == actual_segment;
    };
    let Some(brace_end) = pattern_segment[brace_start..].find('}') else {
        return pattern_segment == actual_segment;
    };
    let brace_end = brace_start + brace_end;
    let prefix = &pattern_segment[..brace_start];
    let suffix = &pattern_segment[brace_end + 1..];
    if actual_segment.len() < prefix.len() + suffix.len() {
        return false;
    }
    actual_segment.starts_with(prefix) && actual_segment.ends_with(suffix)
}
