use axum::http::HeaderMap;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identify the calling client for per-client accounting.
///
/// Uses the first hop of `X-Forwarded-For`, then `X-Real-IP`, and falls back
/// to a shared `unknown` bucket when neither header is usable.
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(client) = forwarded {
        return client.to_string();
    }

    headers
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
