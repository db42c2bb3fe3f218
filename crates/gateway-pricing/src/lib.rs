//! Locally configured per-(provider, model) USD rates, used whenever an
//! upstream does not quote its own cost.
//!
//! The registry is process-wide shared state (the only kind this gateway
//! has, besides the provider registry): reads are lock-free against an
//! `arc_swap::ArcSwap` snapshot, and `reload`/`update_pricing` publish a new
//! snapshot atomically so a reader never observes a torn mix of old and new
//! rates.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use gateway_common::{ProviderKey, UsageInfo};
use serde::{Deserialize, Serialize};

/// Per-million-token USD rates for one (provider, model) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_mtok_usd: f64,
    pub completion_per_mtok_usd: f64,
}

impl ModelPricing {
    pub fn new(prompt_per_mtok_usd: f64, completion_per_mtok_usd: f64) -> Self {
        Self {
            prompt_per_mtok_usd,
            completion_per_mtok_usd,
        }
    }

    fn is_valid(&self) -> bool {
        self.prompt_per_mtok_usd.is_finite()
            && self.prompt_per_mtok_usd >= 0.0
            && self.completion_per_mtok_usd.is_finite()
            && self.completion_per_mtok_usd >= 0.0
    }

    fn cost_for(&self, usage: UsageInfo) -> f64 {
        (usage.prompt_tokens as f64 / 1_000_000.0) * self.prompt_per_mtok_usd
            + (usage.completion_tokens as f64 / 1_000_000.0) * self.completion_per_mtok_usd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingSource {
    Provider,
    GatewayPricing,
}

impl PricingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingSource::Provider => "provider",
            PricingSource::GatewayPricing => "gateway-pricing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingResult {
    pub cost_usd: f64,
    pub source: PricingSource,
    pub pricing_version: Option<String>,
    pub model: Option<String>,
    pub usage: Option<UsageInfo>,
}

/// One provider's pricing table: exact model names plus longest-prefix
/// family fallbacks (e.g. `gpt-4o-2024-05-13` -> the `gpt-4o` entry).
#[derive(Debug, Clone, Default)]
struct ProviderTable {
    exact: HashMap<String, ModelPricing>,
    /// `(prefix_pattern, base_model)`, matched longest-prefix-first.
    family_patterns: Vec<(String, String)>,
}

impl ProviderTable {
    fn resolve(&self, model: &str) -> Option<ModelPricing> {
        if let Some(p) = self.exact.get(model) {
            return Some(*p);
        }
        let mut best: Option<(&str, &str)> = None;
        for (pattern, base_model) in &self.family_patterns {
            if model.starts_with(pattern.as_str()) {
                match best {
                    Some((best_pattern, _)) if best_pattern.len() >= pattern.len() => {}
                    _ => best = Some((pattern.as_str(), base_model.as_str())),
                }
            }
        }
        let base_model = best.map(|(_, base)| base)?;
        self.exact.get(base_model).copied()
    }

    fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.exact.insert(model.into(), pricing);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PricingSnapshot {
    tables: HashMap<ProviderKey, ProviderTable>,
    pub multiplier: f64,
    pub pricing_version: Option<String>,
}

impl PricingSnapshot {
    pub fn new(multiplier: f64, pricing_version: Option<String>) -> Self {
        Self {
            tables: HashMap::new(),
            multiplier: if multiplier.is_finite() && multiplier >= 0.0 {
                multiplier
            } else {
                1.0
            },
            pricing_version,
        }
    }

    /// A small seed table covering the models used in the worked examples
    /// and tests; real deployments replace this via `PRICING_OVERRIDES` or
    /// `update_pricing`.
    pub fn with_defaults(multiplier: f64, pricing_version: Option<String>) -> Self {
        let mut snapshot = Self::new(multiplier, pricing_version);
        snapshot.set(ProviderKey::OpenAI, "gpt-4", ModelPricing::new(30.0, 60.0));
        snapshot.set(
            ProviderKey::OpenAI,
            "gpt-4o",
            ModelPricing::new(2.5, 10.0),
        );
        snapshot.family(ProviderKey::OpenAI, "gpt-4o-", "gpt-4o");
        snapshot.set(
            ProviderKey::OpenAI,
            "gpt-4o-mini",
            ModelPricing::new(0.15, 0.6),
        );
        snapshot.family(ProviderKey::OpenAI, "gpt-4o-mini-", "gpt-4o-mini");
        snapshot.set(
            ProviderKey::Claude,
            "claude-3-5-sonnet",
            ModelPricing::new(3.0, 15.0),
        );
        snapshot.family(
            ProviderKey::Claude,
            "claude-3-5-sonnet-",
            "claude-3-5-sonnet",
        );
        snapshot.set(
            ProviderKey::Claude,
            "claude-3-haiku",
            ModelPricing::new(0.25, 1.25),
        );
        snapshot.family(ProviderKey::Claude, "claude-3-haiku-", "claude-3-haiku");
        snapshot.set(
            ProviderKey::Google,
            "gemini-1.5-pro",
            ModelPricing::new(1.25, 5.0),
        );
        snapshot.family(ProviderKey::Google, "gemini-1.5-pro-", "gemini-1.5-pro");
        snapshot.set(
            ProviderKey::Google,
            "gemini-1.5-flash",
            ModelPricing::new(0.075, 0.3),
        );
        snapshot.family(
            ProviderKey::Google,
            "gemini-1.5-flash-",
            "gemini-1.5-flash",
        );
        snapshot
    }

    pub fn set(&mut self, provider: ProviderKey, model: impl Into<String>, pricing: ModelPricing) {
        if !pricing.is_valid() {
            return;
        }
        self.tables.entry(provider).or_default().insert(model, pricing);
    }

    pub fn family(&mut self, provider: ProviderKey, prefix: impl Into<String>, base_model: impl Into<String>) {
        self.tables
            .entry(provider)
            .or_default()
            .family_patterns
            .push((prefix.into(), base_model.into()));
    }

    fn resolve(&self, provider: ProviderKey, model: &str) -> Option<ModelPricing> {
        self.tables.get(&provider)?.resolve(model)
    }

    /// Merges a `PRICING_OVERRIDES` JSON object of shape
    /// `{"<provider>": {"<model>": {"prompt_per_mtok_usd": .., "completion_per_mtok_usd": ..}}}`
    /// on top of this snapshot.
    pub fn merge_overrides(&mut self, overrides: &serde_json::Value) {
        let Some(providers) = overrides.as_object() else {
            return;
        };
        for (provider_name, models) in providers {
            let Some(provider) = ProviderKey::parse(provider_name) else {
                continue;
            };
            let Some(models) = models.as_object() else {
                continue;
            };
            for (model, pricing) in models {
                if let Ok(pricing) = serde_json::from_value::<ModelPricing>(pricing.clone()) {
                    self.set(provider, model.clone(), pricing);
                }
            }
        }
    }
}

pub struct PricingRegistry {
    snapshot: ArcSwap<PricingSnapshot>,
}

impl PricingRegistry {
    pub fn new(snapshot: PricingSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn reload(&self, snapshot: PricingSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn update_pricing(&self, provider: ProviderKey, model: impl Into<String>, pricing: ModelPricing) {
        let mut next = (**self.snapshot.load()).clone();
        next.set(provider, model, pricing);
        self.reload(next);
    }

    pub fn get_pricing(&self, provider: ProviderKey, model: &str) -> Option<ModelPricing> {
        self.snapshot.load().resolve(provider, model)
    }

    pub fn current_version(&self) -> Option<String> {
        self.snapshot.load().pricing_version.clone()
    }

    pub fn calculate_provider_cost(
        &self,
        provider: ProviderKey,
        model: &str,
        usage: UsageInfo,
    ) -> Option<PricingResult> {
        let snapshot = self.snapshot.load();
        let pricing = snapshot.resolve(provider, model)?;
        Some(PricingResult {
            cost_usd: pricing.cost_for(usage) * snapshot.multiplier,
            source: PricingSource::GatewayPricing,
            pricing_version: snapshot.pricing_version.clone(),
            model: Some(model.to_string()),
            usage: Some(usage),
        })
    }

    /// Provider-quoted USD wins if present; otherwise falls back to the
    /// gateway pricing table. Returns `None` (uncosted) if neither yields a
    /// result.
    pub fn calculate_request_cost(
        &self,
        provider: ProviderKey,
        model: &str,
        provider_cost_usd: Option<f64>,
        usage: Option<UsageInfo>,
    ) -> Option<PricingResult> {
        if let Some(cost_usd) = provider_cost_usd {
            let snapshot = self.snapshot.load();
            return Some(PricingResult {
                cost_usd: cost_usd * snapshot.multiplier,
                source: PricingSource::Provider,
                pricing_version: snapshot.pricing_version.clone(),
                model: Some(model.to_string()),
                usage,
            });
        }
        let usage = usage?;
        self.calculate_provider_cost(provider, model, usage)
    }
}

/// `round(usd * 1e12)`, nearest, ties away from zero — the JS `Math.round`
/// semantic this conversion must preserve bit-exactly for auditability.
pub fn usd_to_pico(usd: f64) -> i128 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    (usd * 1e12).round() as i128
}

pub fn pico_to_usd(pico: i128) -> f64 {
    pico as f64 / 1e12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_pricing_formula_matches_scenario_one() {
        let snapshot = PricingSnapshot::with_defaults(1.0, None);
        let registry = PricingRegistry::new(snapshot);
        let usage = UsageInfo::new(1000, 500, 1500);
        let result = registry
            .calculate_provider_cost(ProviderKey::OpenAI, "gpt-4", usage)
            .unwrap();
        assert!((result.cost_usd - 0.06).abs() < 1e-9);
        assert_eq!(usd_to_pico(result.cost_usd), 60_000_000_000);
    }

    #[test]
    fn family_pattern_resolves_variant_model_names() {
        let snapshot = PricingSnapshot::with_defaults(1.0, None);
        let registry = PricingRegistry::new(snapshot);
        let pricing = registry
            .get_pricing(ProviderKey::OpenAI, "gpt-4o-2024-05-13")
            .unwrap();
        assert_eq!(pricing, ModelPricing::new(2.5, 10.0));
    }

    #[test]
    fn longest_prefix_wins_between_overlapping_families() {
        let snapshot = PricingSnapshot::with_defaults(1.0, None);
        let registry = PricingRegistry::new(snapshot);
        // gpt-4o-mini-2024-07-18 matches both "gpt-4o-" and "gpt-4o-mini-";
        // the longer, more specific prefix must win.
        let pricing = registry
            .get_pricing(ProviderKey::OpenAI, "gpt-4o-mini-2024-07-18")
            .unwrap();
        assert_eq!(pricing, ModelPricing::new(0.15, 0.6));
    }

    #[test]
    fn unknown_model_yields_none_not_a_crash() {
        let snapshot = PricingSnapshot::with_defaults(1.0, None);
        let registry = PricingRegistry::new(snapshot);
        assert!(
            registry
                .calculate_provider_cost(ProviderKey::OpenAI, "totally-unknown-model", UsageInfo::default())
                .is_none()
        );
    }

    #[test]
    fn provider_cost_wins_over_gateway_pricing() {
        let snapshot = PricingSnapshot::with_defaults(1.0, None);
        let registry = PricingRegistry::new(snapshot);
        let result = registry
            .calculate_request_cost(ProviderKey::OpenRouter, "some-model", Some(0.000025), None)
            .unwrap();
        assert_eq!(result.source, PricingSource::Provider);
        assert!((result.cost_usd - 0.000025).abs() < 1e-12);
        assert_eq!(usd_to_pico(result.cost_usd), 25_000_000);
    }

    #[test]
    fn markup_applies_to_both_sources() {
        let snapshot = PricingSnapshot::with_defaults(2.0, None);
        let registry = PricingRegistry::new(snapshot);
        let provider_result = registry
            .calculate_request_cost(ProviderKey::OpenRouter, "m", Some(1.0), None)
            .unwrap();
        assert!((provider_result.cost_usd - 2.0).abs() < 1e-9);

        let gateway_result = registry
            .calculate_request_cost(
                ProviderKey::OpenAI,
                "gpt-4",
                None,
                Some(UsageInfo::new(1_000_000, 0, 1_000_000)),
            )
            .unwrap();
        assert!((gateway_result.cost_usd - 60.0).abs() < 1e-9);
    }

    #[test]
    fn hot_reload_swaps_the_whole_snapshot_atomically() {
        let registry = PricingRegistry::new(PricingSnapshot::with_defaults(1.0, None));
        assert!(registry.get_pricing(ProviderKey::OpenAI, "brand-new-model").is_none());
        registry.update_pricing(ProviderKey::OpenAI, "brand-new-model", ModelPricing::new(1.0, 2.0));
        assert_eq!(
            registry.get_pricing(ProviderKey::OpenAI, "brand-new-model"),
            Some(ModelPricing::new(1.0, 2.0))
        );
    }

    #[test]
    fn pico_usd_round_trip_for_amounts_up_to_12_fractional_digits() {
        let usd = 0.123456789012_f64;
        let pico = usd_to_pico(usd);
        assert_eq!(pico, 123_456_789_012);
        assert!((pico_to_usd(pico) - usd).abs() < 1e-12);
    }

    #[test]
    fn pricing_overrides_merge_on_top_of_defaults() {
        let mut snapshot = PricingSnapshot::with_defaults(1.0, None);
        let overrides: serde_json::Value = serde_json::json!({
            "openai": {
                "gpt-4": {"prompt_per_mtok_usd": 1.0, "completion_per_mtok_usd": 2.0}
            }
        });
        snapshot.merge_overrides(&overrides);
        assert_eq!(
            snapshot.resolve(ProviderKey::OpenAI, "gpt-4"),
            Some(ModelPricing::new(1.0, 2.0))
        );
    }
}
