use std::sync::Arc;

use gateway_common::ProviderKey;
use gateway_core::{AuthAdapter, UpstreamClient};
use gateway_pricing::PricingRegistry;
use gateway_provider_core::ProviderRegistry;

pub struct GatewayState {
    pub providers: Arc<ProviderRegistry>,
    pub pricing: Arc<PricingRegistry>,
    pub auth: Arc<dyn AuthAdapter>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub default_provider: Option<ProviderKey>,
    pub admin_api_key: Option<String>,
}
