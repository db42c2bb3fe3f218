use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::ProviderConfig;
use crate::provider::UpstreamProvider;

#[derive(Clone)]
pub struct RegisteredProvider {
    pub config: Arc<ProviderConfig>,
    pub driver: Arc<dyn UpstreamProvider>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("config", &self.config)
            .field("driver", &self.driver.key())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No provider could be chosen (no header, no path match, no default).
    ProviderNotEnabled,
    /// A provider was chosen but the requested path is not in its allow-list.
    PathNotAllowed,
}

type Table = HashMap<String, RegisteredProvider>;

/// Process-wide registry of enabled providers.
///
/// Reads are lock-free against an `arc_swap::ArcSwap` snapshot; registration
/// and removal publish a brand new table atomically so concurrent readers
/// never observe a torn mix of old and new entries.
#[derive(Default)]
pub struct ProviderRegistry {
    table: ArcSwap<Table>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        config: ProviderConfig,
        driver: Arc<dyn UpstreamProvider>,
    ) -> Result<(), String> {
        let name = config.name.clone();
        let mut next = (**self.table.load()).clone();
        if next.contains_key(&name) {
            return Err(format!("provider '{name}' already registered"));
        }
        next.insert(
            name,
            RegisteredProvider {
                config: Arc::new(config),
                driver,
            },
        );
        self.table.store(Arc::new(next));
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut next = (**self.table.load()).clone();
        let removed = next.remove(name).is_some();
        if removed {
            self.table.store(Arc::new(next));
        }
        removed
    }

    pub fn has(&self, name: &str) -> bool {
        self.table.load().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<RegisteredProvider> {
        self.table.load().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }

    /// Selection order: explicit `X-LLM-Provider` header, then the first
    /// path segment after `/api/v1/` if it names a registered provider,
    /// then the configured default. The returned provider is then checked
    /// against its own `allowed_paths`.
    pub fn resolve(
        &self,
        header_provider: Option<&str>,
        path_prefix_provider: Option<&str>,
        default_provider: Option<&str>,
        path: &str,
    ) -> Result<RegisteredProvider, ResolveError> {
        let table = self.table.load();

        let candidate = header_provider
            .and_then(|name| table.get(name))
            .or_else(|| path_prefix_provider.and_then(|name| table.get(name)))
            .or_else(|| default_provider.and_then(|name| table.get(name)))
            .cloned()
            .ok_or(ResolveError::ProviderNotEnabled)?;

        if !candidate.config.path_allowed(path) {
            return Err(ResolveError::PathNotAllowed);
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, UpstreamHttpRequest};
    use crate::usage::{StreamObservation, UsageExtractor};
    use bytes::Bytes;
    use gateway_common::{ProviderKey, UsageInfo};

    struct StubExtractor;
    impl UsageExtractor for StubExtractor {
        fn extract_non_stream(&self, _body: &[u8]) -> Option<UsageInfo> {
            None
        }
        fn extract_stream_event(&self, _event: &[u8]) -> StreamObservation {
            StreamObservation::default()
        }
    }

    struct StubDriver;
    impl UpstreamProvider for StubDriver {
        fn key(&self) -> ProviderKey {
            ProviderKey::OpenAI
        }
        fn supported_paths(&self) -> &'static [&'static str] {
            &["/v1/chat/completions"]
        }
        fn prepare_request_data(&self, _body: &mut serde_json::Value, _is_stream: bool) {}
        fn build_upstream_request(
            &self,
            _config: &ProviderConfig,
            _path: &str,
            _method: HttpMethod,
            _body: Option<Bytes>,
            _is_stream: bool,
        ) -> crate::errors::ProviderResult<UpstreamHttpRequest> {
            unimplemented!()
        }
        fn create_usage_extractor(&self) -> Arc<dyn UsageExtractor> {
            Arc::new(StubExtractor)
        }
    }

    fn registry_with_openai() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        let config = ProviderConfig::new(
            "openai",
            "https://api.openai.com",
            true,
            Some("sk-x".into()),
            false,
            ["/v1/chat/completions".to_string()],
        )
        .unwrap();
        registry.register(config, Arc::new(StubDriver)).unwrap();
        registry
    }

    #[test]
    fn header_selection_wins_over_path_and_default() {
        let registry = registry_with_openai();
        let resolved = registry
            .resolve(Some("openai"), Some("other"), Some("other"), "/v1/chat/completions")
            .unwrap();
        assert_eq!(resolved.config.name, "openai");
    }

    #[test]
    fn unresolved_provider_is_not_enabled() {
        let registry = registry_with_openai();
        let err = registry
            .resolve(None, None, None, "/v1/chat/completions")
            .unwrap_err();
        assert_eq!(err, ResolveError::ProviderNotEnabled);
    }

    #[test]
    fn path_outside_allow_list_is_rejected() {
        let registry = registry_with_openai();
        let err = registry
            .resolve(Some("openai"), None, None, "/v1/images/generations")
            .unwrap_err();
        assert_eq!(err, ResolveError::PathNotAllowed);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = registry_with_openai();
        let config = ProviderConfig::new(
            "openai",
            "https://api.openai.com",
            true,
            Some("sk-x".into()),
            false,
            ["/v1/chat/completions".to_string()],
        )
        .unwrap();
        assert!(registry.register(config, Arc::new(StubDriver)).is_err());
    }
}
