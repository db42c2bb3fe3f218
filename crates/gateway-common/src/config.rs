use std::collections::HashMap;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// The five upstreams this gateway knows how to drive natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKey {
    OpenAI,
    OpenRouter,
    LiteLlm,
    Claude,
    Google,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 5] = [
        ProviderKey::OpenAI,
        ProviderKey::OpenRouter,
        ProviderKey::LiteLlm,
        ProviderKey::Claude,
        ProviderKey::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKey::OpenAI => "openai",
            ProviderKey::OpenRouter => "openrouter",
            ProviderKey::LiteLlm => "litellm",
            ProviderKey::Claude => "claude",
            ProviderKey::Google => "google",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKey::OpenAI),
            "openrouter" => Some(ProviderKey::OpenRouter),
            "litellm" => Some(ProviderKey::LiteLlm),
            "claude" => Some(ProviderKey::Claude),
            "google" => Some(ProviderKey::Google),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayConfigError {
    #[error("unknown LLM_BACKEND value: {0}")]
    UnknownDefaultProvider(String),
    #[error("PRICING_OVERRIDES is not valid JSON: {0}")]
    InvalidPricingOverrides(String),
    #[error("PRICING_MULTIPLIER must be a non-negative finite number, got {0}")]
    InvalidMultiplier(String),
}

/// Process-wide configuration, merged from environment variables at startup.
///
/// Mirrors the env table in the specification (`LLM_BACKEND`,
/// `OPENAI_API_KEY`, ... `DEBUG`). None of this is reloaded at runtime; only
/// the registries it seeds support hot reload.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub default_provider: Option<ProviderKey>,
    pub api_keys: HashMap<ProviderKey, String>,
    pub base_url_overrides: HashMap<ProviderKey, String>,
    pub pricing_overrides_json: Option<serde_json::Value>,
    pub pricing_version: Option<String>,
    pub pricing_multiplier: f64,
    pub admin_api_key: Option<String>,
    pub debug: bool,
}

/// CLI/env surface for the gateway. Every field is read from the matching
/// environment variable when no flag is given on the command line, same as
/// the rest of this family of proxies configures itself.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "llm-gateway", version, about = "DID-authenticated multi-provider LLM proxy")]
pub struct CliArgs {
    /// Which upstream unauthenticated/unprefixed requests route to. `both`
    /// (or unset) means no default — the provider must be named explicitly.
    #[arg(long, env = "LLM_BACKEND")]
    pub llm_backend: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub openrouter_api_key: Option<String>,

    #[arg(long, env = "LITELLM_MASTER_KEY")]
    pub litellm_master_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY")]
    pub google_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "LITELLM_BASE_URL")]
    pub litellm_base_url: Option<String>,

    #[arg(long, env = "GOOGLE_BASE_URL")]
    pub google_base_url: Option<String>,

    #[arg(long, env = "PRICING_OVERRIDES")]
    pub pricing_overrides: Option<String>,

    #[arg(long, env = "OPENAI_PRICING_VERSION")]
    pub openai_pricing_version: Option<String>,

    #[arg(long, env = "PRICING_MULTIPLIER")]
    pub pricing_multiplier: Option<String>,

    #[arg(long, env = "ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    #[arg(long, env = "DEBUG")]
    pub debug: Option<String>,

    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    #[arg(long, env = "PORT")]
    pub port: Option<String>,
}

impl GatewayConfig {
    /// Validates and shapes a parsed [`CliArgs`] into the process-wide
    /// config. Kept separate from [`CliArgs::parse`] so tests can build a
    /// `CliArgs` literal without touching the real process environment.
    pub fn from_args(args: CliArgs) -> Result<Self, GatewayConfigError> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());

        let default_provider = match present(args.llm_backend) {
            Some(raw) if raw.eq_ignore_ascii_case("both") => None,
            Some(raw) => Some(
                ProviderKey::parse(&raw).ok_or(GatewayConfigError::UnknownDefaultProvider(raw))?,
            ),
            None => None,
        };

        let mut api_keys = HashMap::new();
        if let Some(v) = present(args.openai_api_key) {
            api_keys.insert(ProviderKey::OpenAI, v);
        }
        if let Some(v) = present(args.openrouter_api_key) {
            api_keys.insert(ProviderKey::OpenRouter, v);
        }
        if let Some(v) = present(args.litellm_master_key) {
            api_keys.insert(ProviderKey::LiteLlm, v);
        }
        if let Some(v) = present(args.anthropic_api_key) {
            api_keys.insert(ProviderKey::Claude, v);
        }
        if let Some(v) = present(args.google_api_key) {
            api_keys.insert(ProviderKey::Google, v);
        }

        let mut base_url_overrides = HashMap::new();
        if let Some(v) = present(args.openai_base_url) {
            base_url_overrides.insert(ProviderKey::OpenAI, v);
        }
        if let Some(v) = present(args.litellm_base_url) {
            base_url_overrides.insert(ProviderKey::LiteLlm, v);
        }
        if let Some(v) = present(args.google_base_url) {
            base_url_overrides.insert(ProviderKey::Google, v);
        }

        let pricing_overrides_json = match present(args.pricing_overrides) {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| GatewayConfigError::InvalidPricingOverrides(e.to_string()))?,
            ),
            None => None,
        };

        let pricing_multiplier = match present(args.pricing_multiplier) {
            Some(raw) => {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| GatewayConfigError::InvalidMultiplier(raw.clone()))?;
                if !value.is_finite() || value < 0.0 {
                    return Err(GatewayConfigError::InvalidMultiplier(raw));
                }
                value
            }
            None => 1.0,
        };

        let port = present(args.port)
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);
        let host = present(args.host).unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(Self {
            host,
            port,
            default_provider,
            api_keys,
            base_url_overrides,
            pricing_overrides_json,
            pricing_version: present(args.openai_pricing_version),
            pricing_multiplier,
            admin_api_key: present(args.admin_api_key),
            debug: present(args.debug).is_some(),
        })
    }

    /// Parses CLI flags and environment variables from the real process
    /// (`clap`'s `env` feature checks each var when the matching flag is
    /// absent) and validates them into a [`GatewayConfig`].
    pub fn from_env() -> Result<Self, GatewayConfigError> {
        Self::from_args(CliArgs::parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(f: impl FnOnce(&mut CliArgs)) -> CliArgs {
        let mut args = CliArgs::default();
        f(&mut args);
        args
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let cfg = GatewayConfig::from_args(CliArgs::default()).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.pricing_multiplier, 1.0);
        assert!(cfg.default_provider.is_none());
        assert!(cfg.api_keys.is_empty());
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = GatewayConfig::from_args(args(|a| a.llm_backend = Some("bogus".into())))
            .unwrap_err();
        assert!(matches!(err, GatewayConfigError::UnknownDefaultProvider(_)));
    }

    #[test]
    fn both_backend_means_no_default() {
        let cfg =
            GatewayConfig::from_args(args(|a| a.llm_backend = Some("both".into()))).unwrap();
        assert!(cfg.default_provider.is_none());
    }

    #[test]
    fn rejects_negative_multiplier() {
        let err = GatewayConfig::from_args(args(|a| a.pricing_multiplier = Some("-1".into())))
            .unwrap_err();
        assert!(matches!(err, GatewayConfigError::InvalidMultiplier(_)));
    }

    #[test]
    fn collects_api_keys_per_provider() {
        let cfg = GatewayConfig::from_args(args(|a| {
            a.openai_api_key = Some("sk-a".into());
            a.anthropic_api_key = Some("sk-b".into());
        }))
        .unwrap();
        assert_eq!(cfg.api_keys.get(&ProviderKey::OpenAI).unwrap(), "sk-a");
        assert_eq!(cfg.api_keys.get(&ProviderKey::Claude).unwrap(), "sk-b");
        assert!(!cfg.api_keys.contains_key(&ProviderKey::Google));
    }
}
