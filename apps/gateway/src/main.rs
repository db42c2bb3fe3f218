use std::sync::Arc;

use gateway_common::{GatewayConfig, ProviderKey};
use gateway_core::{DidHeaderAuth, UpstreamClientConfig, WreqUpstreamClient};
use gateway_pricing::{PricingRegistry, PricingSnapshot};
use gateway_provider_core::{ProviderConfig, ProviderRegistry};
use gateway_router::{build_router, GatewayState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    init_tracing(config.debug);

    let providers = Arc::new(ProviderRegistry::new());
    for key in ProviderKey::ALL {
        let Some(api_key) = config.api_keys.get(&key).cloned() else {
            continue;
        };
        let driver = gateway_providers::driver_for(key);
        let base_url = config
            .base_url_overrides
            .get(&key)
            .cloned()
            .unwrap_or_else(|| default_base_url(key).to_string());
        let provider_config = ProviderConfig::new(
            key.as_str(),
            base_url,
            true,
            Some(api_key),
            matches!(key, ProviderKey::OpenRouter | ProviderKey::LiteLlm),
            driver.supported_paths().iter().map(|p| p.to_string()),
        )?;
        if let Err(err) = providers.register(provider_config, driver) {
            tracing::warn!(provider = key.as_str(), error = %err, "skipping duplicate provider registration");
        } else {
            tracing::info!(provider = key.as_str(), "registered provider");
        }
    }

    let mut pricing_snapshot = PricingSnapshot::with_defaults(config.pricing_multiplier, config.pricing_version.clone());
    if let Some(overrides) = &config.pricing_overrides_json {
        pricing_snapshot.merge_overrides(overrides);
    }
    let pricing = Arc::new(PricingRegistry::new(pricing_snapshot));

    let upstream = Arc::new(WreqUpstreamClient::new(UpstreamClientConfig::default())?);

    let state = Arc::new(GatewayState {
        providers,
        pricing,
        auth: Arc::new(DidHeaderAuth::default()),
        upstream,
        default_provider: config.default_provider,
        admin_api_key: config.admin_api_key.clone(),
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(host = %config.host, port = config.port, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn default_base_url(key: ProviderKey) -> &'static str {
    match key {
        ProviderKey::OpenAI => "https://api.openai.com",
        ProviderKey::OpenRouter => "https://openrouter.ai/api",
        ProviderKey::LiteLlm => "http://localhost:4000",
        ProviderKey::Claude => "https://api.anthropic.com",
        ProviderKey::Google => "https://generativelanguage.googleapis.com",
    }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
