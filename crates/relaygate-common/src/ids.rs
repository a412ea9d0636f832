use http::HeaderMap;
use uuid::Uuid;

/// Ensure a request has a request id: honor an inbound hint header, else mint
/// one. Mirrors the teacher's `request_id` extraction in `handler.rs`, widened
/// to accept the `x-request-id` hint spec.md §4.I.1 calls for.
pub fn ensure_request_id(headers: &HeaderMap, inbound: Option<&str>) -> String {
    if let Some(id) = inbound {
        return id.to_string();
    }
    header_value(headers, "x-request-id")
        .or_else(|| header_value(headers, "request-id"))
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honors_inbound_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc-123".parse().unwrap());
        assert_eq!(ensure_request_id(&headers, None), "abc-123");
    }

    #[test]
    fn mints_when_absent() {
        let headers = HeaderMap::new();
        let id = ensure_request_id(&headers, None);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
