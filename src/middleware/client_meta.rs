use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Caller address and agent for the audit trail. Proxy headers win over the
/// socket address since the server normally sits behind the campus gateway.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub ip_address: String,
    pub user_agent: String,
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let ip_address = header_str(parts, "x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| header_str(parts, "x-real-ip"))
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = header_str(parts, "user-agent").unwrap_or_else(|| "unknown".to_string());

        std::future::ready(Ok(ClientMeta {
            ip_address,
            user_agent,
        }))
    }
}
