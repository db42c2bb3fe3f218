use std::sync::Arc;

use gateway_common::{ProviderKey, UsageInfo};
use gateway_pricing::{PricingRegistry, PricingResult};

use crate::usage::UsageExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Accumulating,
    Finalized,
}

/// Single-threaded state machine driven synchronously as each upstream chunk
/// arrives. It never blocks the forwarder and never panics on malformed
/// input — a parse failure is simply a no-op observation.
///
/// `cumulative` selects the accumulation rule: `true` for providers that
/// stream running totals (Claude, Google), so each field is merged with a
/// maximum rather than overwritten, which is what prevents the classic
/// double-counting bug from a retransmitted `message_delta`. `false` for
/// providers that emit one terminal usage object (OpenAI, OpenRouter,
/// LiteLLM), which simply overwrite.
pub struct StreamProcessor {
    extractor: Arc<dyn UsageExtractor>,
    cumulative: bool,
    provider: ProviderKey,
    model: String,
    state: StreamState,
    accumulated_usage: Option<UsageInfo>,
    extracted_cost: Option<f64>,
    initial_provider_cost: Option<f64>,
    truncated: bool,
}

impl StreamProcessor {
    pub fn new(
        extractor: Arc<dyn UsageExtractor>,
        cumulative: bool,
        provider: ProviderKey,
        model: impl Into<String>,
        initial_provider_cost: Option<f64>,
    ) -> Self {
        Self {
            extractor,
            cumulative,
            provider,
            model: model.into(),
            state: StreamState::Idle,
            accumulated_usage: None,
            extracted_cost: None,
            initial_provider_cost,
            truncated: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn accumulated_usage(&self) -> Option<UsageInfo> {
        self.accumulated_usage
    }

    /// Feeds one already-delimited SSE event. Returns whether the event
    /// carried the provider's end-of-stream sentinel.
    pub fn observe_event(&mut self, event: &[u8]) -> bool {
        if self.state == StreamState::Finalized {
            return true;
        }
        let observation = self.extractor.extract_stream_event(event);

        if let Some(usage) = observation.usage {
            self.accumulated_usage = Some(match (self.accumulated_usage, self.cumulative) {
                (Some(prev), true) => {
                    let merged = UsageInfo::field_max(prev, usage);
                    // Claude/Google split prompt and completion counts across
                    // separate events (a `message_delta` repeats only
                    // `output_tokens`), so a per-event `total_tokens` is
                    // meaningless here; the running total is always the sum
                    // of the running per-field maxima.
                    UsageInfo::new(
                        merged.prompt_tokens,
                        merged.completion_tokens,
                        merged.prompt_tokens + merged.completion_tokens,
                    )
                }
                _ => usage,
            });
            self.state = StreamState::Accumulating;
        }
        if let Some(cost) = observation.cost_usd {
            self.extracted_cost = Some(cost);
            self.state = StreamState::Accumulating;
        }
        observation.terminal
    }

    /// Marks the stream as ending without a clean terminal sentinel (client
    /// disconnect or upstream reset). `finalize` still runs, using whatever
    /// was accumulated so far.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Computes the final cost per the precedence in the specification:
    /// an in-stream extracted cost wins, then an initial per-request
    /// provider cost (e.g. a LiteLLM response header read before the body
    /// started streaming), then the gateway pricing table, then `None`
    /// (uncosted).
    pub fn finalize(&mut self, pricing: &PricingRegistry) -> Option<PricingResult> {
        self.state = StreamState::Finalized;
        let provider_cost = self.extracted_cost.or(self.initial_provider_cost);
        pricing.calculate_request_cost(
            self.provider,
            &self.model,
            provider_cost,
            self.accumulated_usage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::StreamObservation;
    use gateway_pricing::PricingSnapshot;

    struct FixedExtractor(Vec<StreamObservation>, std::sync::Mutex<usize>);

    impl UsageExtractor for FixedExtractor {
        fn extract_non_stream(&self, _body: &[u8]) -> Option<UsageInfo> {
            None
        }

        fn extract_stream_event(&self, _event: &[u8]) -> StreamObservation {
            let mut idx = self.1.lock().unwrap();
            let obs = self.0.get(*idx).cloned().unwrap_or_default();
            *idx += 1;
            obs
        }
    }

    #[test]
    fn cumulative_provider_uses_per_field_maximum() {
        let extractor = Arc::new(FixedExtractor(
            vec![
                StreamObservation {
                    usage: Some(UsageInfo::new(100, 0, 100)),
                    cost_usd: None,
                    terminal: false,
                },
                StreamObservation {
                    usage: Some(UsageInfo::new(100, 40, 140)),
                    cost_usd: None,
                    terminal: false,
                },
                StreamObservation {
                    usage: Some(UsageInfo::new(100, 80, 180)),
                    cost_usd: None,
                    terminal: true,
                },
            ],
            std::sync::Mutex::new(0),
        ));
        let mut processor =
            StreamProcessor::new(extractor, true, ProviderKey::Claude, "claude-3-5-sonnet", None);
        assert!(!processor.observe_event(b""));
        assert!(!processor.observe_event(b""));
        assert!(processor.observe_event(b""));
        assert_eq!(processor.accumulated_usage(), Some(UsageInfo::new(100, 80, 180)));
    }

    #[test]
    fn non_cumulative_provider_overwrites() {
        let extractor = Arc::new(FixedExtractor(
            vec![StreamObservation {
                usage: Some(UsageInfo::new(10, 5, 15)),
                cost_usd: Some(0.000025),
                terminal: true,
            }],
            std::sync::Mutex::new(0),
        ));
        let mut processor =
            StreamProcessor::new(extractor, false, ProviderKey::OpenRouter, "m", None);
        processor.observe_event(b"");
        let pricing = PricingRegistry::new(PricingSnapshot::with_defaults(1.0, None));
        let result = processor.finalize(&pricing).unwrap();
        assert!((result.cost_usd - 0.000025).abs() < 1e-12);
    }

    #[test]
    fn no_observations_and_no_pricing_table_entry_is_uncosted() {
        let extractor = Arc::new(FixedExtractor(vec![], std::sync::Mutex::new(0)));
        let mut processor =
            StreamProcessor::new(extractor, false, ProviderKey::OpenAI, "no-such-model", None);
        let pricing = PricingRegistry::new(PricingSnapshot::with_defaults(1.0, None));
        assert!(processor.finalize(&pricing).is_none());
    }

    #[test]
    fn initial_provider_cost_is_used_when_stream_never_emits_its_own() {
        let extractor = Arc::new(FixedExtractor(
            vec![StreamObservation {
                usage: Some(UsageInfo::new(10, 5, 15)),
                cost_usd: None,
                terminal: true,
            }],
            std::sync::Mutex::new(0),
        ));
        let mut processor =
            StreamProcessor::new(extractor, false, ProviderKey::LiteLlm, "m", Some(0.01));
        processor.observe_event(b"");
        let pricing = PricingRegistry::new(PricingSnapshot::with_defaults(1.0, None));
        let result = processor.finalize(&pricing).unwrap();
        assert!((result.cost_usd - 0.01).abs() < 1e-12);
    }
}
