use {
    axum::{
        extract::State,
        http::{HeaderMap, StatusCode, Uri},
        middleware::Next,
        response::{IntoResponse, Json},
    },
    secrecy::ExposeSecret,
    sha2::{Digest, Sha256},
    tracing::debug,
};

use crate::server::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";

/// Protects admin routes behind the configured API key.
///
/// With no key configured every request passes. Otherwise the key must be
/// given in the `x-api-key` header or the `api_key` query parameter (browsers
/// cannot set headers on WebSocket upgrades).
pub async fn require_api_key(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let Some(expected) = state.gateway.api_key.as_ref() else {
        return next.run(request).await;
    };

    match presented_key(request.headers(), request.uri()) {
        Some(key) if keys_match(&key, expected.expose_secret()) => next.run(request).await,
        presented => {
            debug!(
                path = %request.uri().path(),
                key_present = presented.is_some(),
                "admin request rejected"
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "success": false, "error": "unauthorized" })),
            )
                .into_response()
        },
    }
}

/// API key from the header, else from the query string.
pub fn presented_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }
    parse_query_param(uri.query().unwrap_or(""), API_KEY_QUERY)
}

/// Decode one parameter from a query string.
pub fn parse_query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name)
            .then(|| urlencoding::decode(value).ok().map(|v| v.into_owned()))
            .flatten()
            .filter(|v| !v.is_empty())
    })
}

fn keys_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "from-header".parse().unwrap());
        let uri: Uri = "/admin-chat/ws?api_key=from-query".parse().unwrap();
        assert_eq!(presented_key(&headers, &uri).as_deref(), Some("from-header"));
        assert_eq!(
            presented_key(&HeaderMap::new(), &uri).as_deref(),
            Some("from-query")
        );
    }

    #[test]
    fn query_param_is_decoded() {
        assert_eq!(
            parse_query_param("a=1&api_key=k%2Fy", "api_key").as_deref(),
            Some("k/y")
        );
        assert_eq!(parse_query_param("api_key=", "api_key"), None);
        assert_eq!(parse_query_param("", "api_key"), None);
    }

    #[test]
    fn key_comparison() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "Secret"));
        assert!(!keys_match("", "secret"));
    }
}
