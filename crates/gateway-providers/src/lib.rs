mod claude;
mod google;
mod litellm;
mod openai;
mod openrouter;
mod sse;
mod url;

pub use claude::ClaudeProvider;
pub use google::GoogleProvider;
pub use litellm::LiteLlmProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

use std::sync::Arc;

use gateway_common::ProviderKey;
use gateway_provider_core::UpstreamProvider;

/// Constructs the stock driver for a provider key. The caller still decides
/// whether to register it (an API key must be present per `ProviderConfig`).
pub fn driver_for(key: ProviderKey) -> Arc<dyn UpstreamProvider> {
    match key {
        ProviderKey::OpenAI => Arc::new(OpenAiProvider),
        ProviderKey::OpenRouter => Arc::new(OpenRouterProvider),
        ProviderKey::LiteLlm => Arc::new(LiteLlmProvider),
        ProviderKey::Claude => Arc::new(ClaudeProvider),
        ProviderKey::Google => Arc::new(GoogleProvider),
    }
}
