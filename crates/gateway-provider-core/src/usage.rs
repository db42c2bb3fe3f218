use gateway_common::UsageInfo;

/// What a single SSE event (or a non-stream body) told us.
///
/// `terminal` marks the provider-specific end-of-stream signal (`[DONE]` for
/// the OpenAI family, `message_stop` for Claude) so the stream processor
/// knows to finalize without waiting for connection close.
#[derive(Debug, Clone, Default)]
pub struct StreamObservation {
    pub usage: Option<UsageInfo>,
    pub cost_usd: Option<f64>,
    pub terminal: bool,
}

/// Pure functions of their input; extractors hold no state. Streaming
/// accumulation (including the cumulative-vs-overwrite distinction) is the
/// job of the stream processor, not the extractor.
pub trait UsageExtractor: Send + Sync {
    /// Parses a complete, non-streaming response body.
    fn extract_non_stream(&self, body: &[u8]) -> Option<UsageInfo>;

    /// Parses one already-delimited SSE event (the `event:`/`data:` lines
    /// that make up a single message, newline-joined). Must tolerate
    /// partial/invalid JSON by returning `None` rather than panicking.
    fn extract_stream_event(&self, event: &[u8]) -> StreamObservation;
}

/// Shared helper: recognizes both Chat-Completions-shaped usage
/// (`prompt_tokens`/`completion_tokens`/`total_tokens`) and Response-API-shaped
/// usage (`input_tokens`/`output_tokens` plus arbitrary `*_tokens` extras,
/// which are folded into the prompt side).
pub fn usage_from_json(value: &serde_json::Value) -> Option<UsageInfo> {
    let obj = value.as_object()?;

    if let (Some(prompt), Some(completion)) = (
        obj.get("prompt_tokens").and_then(as_u64),
        obj.get("completion_tokens").and_then(as_u64),
    ) {
        let total = obj
            .get("total_tokens")
            .and_then(as_u64)
            .unwrap_or(prompt + completion);
        return Some(UsageInfo::new(prompt, completion, total));
    }

    if let (Some(input), Some(output)) = (
        obj.get("input_tokens").and_then(as_u64),
        obj.get("output_tokens").and_then(as_u64),
    ) {
        let mut prompt = input;
        for (key, value) in obj {
            if key == "input_tokens" || key == "output_tokens" || key == "total_tokens" {
                continue;
            }
            if key.ends_with("_tokens")
                && let Some(extra) = as_u64(value)
            {
                prompt += extra;
            }
        }
        let total = obj.get("total_tokens").and_then(as_u64).unwrap_or(prompt + output);
        return Some(UsageInfo::new(prompt, output, total));
    }

    None
}

fn as_u64(value: &serde_json::Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_chat_completions_shape() {
        let usage =
            usage_from_json(&json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}))
                .unwrap();
        assert_eq!(usage, UsageInfo::new(10, 5, 15));
    }

    #[test]
    fn folds_tool_token_fields_into_prompt_side() {
        let usage = usage_from_json(&json!({
            "input_tokens": 100,
            "output_tokens": 50,
            "input_tokens_tools": 7,
        }))
        .unwrap();
        assert_eq!(usage.prompt_tokens, 107);
        assert_eq!(usage.completion_tokens, 50);
    }

    #[test]
    fn returns_none_for_unrelated_json() {
        assert!(usage_from_json(&json!({"id": "chatcmpl-1"})).is_none());
    }
}
