/// An ordered, case-insensitively-keyed header list.
///
/// A plain `Vec` rather than a `HeaderMap` because provider drivers build
/// these without ever touching an HTTP framework type — `gateway-provider-core`
/// has no axum/wreq dependency at all, matching the layering the teacher
/// codebase uses to keep provider logic IO-agnostic.
pub type Headers = Vec<(String, String)>;

pub fn header_set(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    let key = name.to_ascii_lowercase();
    if let Some((_, v)) = headers
        .iter_mut()
        .find(|(k, _)| k.to_ascii_lowercase() == key)
    {
        *v = value;
        return;
    }
    headers.push((name, value));
}

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    let key = name.to_ascii_lowercase();
    headers
        .iter()
        .find(|(k, _)| k.to_ascii_lowercase() == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_set_is_case_insensitive_and_overwrites() {
        let mut headers: Headers = Vec::new();
        header_set(&mut headers, "Content-Type", "application/json");
        header_set(&mut headers, "content-type", "text/plain");
        assert_eq!(headers.len(), 1);
        assert_eq!(header_get(&headers, "CONTENT-TYPE"), Some("text/plain"));
    }
}
