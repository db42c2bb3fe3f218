/// Token counts extracted from an upstream response, non-streaming or final.
///
/// `total_tokens` is carried separately from `prompt_tokens + completion_tokens`
/// because some upstreams (the OpenAI Response API with tool calls) bundle
/// extra accounting into the total that isn't cleanly prompt or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageInfo {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Per-field maximum, used to accumulate cumulative-usage streams
    /// (Claude, Google) without double-counting retransmitted totals.
    pub fn field_max(a: Self, b: Self) -> Self {
        Self {
            prompt_tokens: a.prompt_tokens.max(b.prompt_tokens),
            completion_tokens: a.completion_tokens.max(b.completion_tokens),
            total_tokens: a.total_tokens.max(b.total_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_max_takes_per_field_maximum_not_whichever_struct_is_larger() {
        let a = UsageInfo::new(100, 80, 180);
        let b = UsageInfo::new(100, 40, 140);
        let merged = UsageInfo::field_max(a, b);
        assert_eq!(merged, UsageInfo::new(100, 80, 180));
    }
}
