use axum::http::HeaderMap;

/// Per-request credentials pulled from HTTP headers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub bearer: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
        Self { bearer, request_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut h = HeaderMap::new();
        assert!(RequestContext::from_headers(&h).bearer.is_none());
        h.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        h.insert("x-request-id", HeaderValue::from_static("r-1"));
        let ctx = RequestContext::from_headers(&h);
        assert_eq!(ctx.bearer.as_deref(), Some("abc.def.ghi"));
        assert_eq!(ctx.request_id.as_deref(), Some("r-1"));
        h.insert("authorization", HeaderValue::from_static("Basic xyz"));
        assert!(RequestContext::from_headers(&h).bearer.is_none());
    }
}
