/// Pulls the `event:` name (if present) and the concatenation of all
/// `data:` lines out of one raw SSE event block. Drivers receive events
/// already split on the blank-line delimiter; this just separates the
/// two fields each extractor cares about.
pub fn parse_event(raw: &[u8]) -> (Option<&str>, String) {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => return (None, String::new()),
    };

    let mut event_name = None;
    let mut data = String::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim());
        }
    }
    (event_name, data)
}

pub fn is_done_sentinel(data: &str) -> bool {
    data.trim() == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_event_name_and_data() {
        let (name, data) = parse_event(b"event: response.completed\ndata: {\"a\":1}\n\n");
        assert_eq!(name, Some("response.completed"));
        assert_eq!(data, "{\"a\":1}");
    }

    #[test]
    fn recognizes_done_sentinel() {
        let (_, data) = parse_event(b"data: [DONE]\n\n");
        assert!(is_done_sentinel(&data));
    }

    #[test]
    fn handles_event_without_type_line() {
        let (name, data) = parse_event(b"data: {\"usage\":{}}\n\n");
        assert!(name.is_none());
        assert_eq!(data, "{\"usage\":{}}");
    }
}
