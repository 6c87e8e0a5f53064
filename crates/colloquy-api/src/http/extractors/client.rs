//! Client identity extractor for the cooldown gate.
//!
//! Resolution order:
//! - `X-Client-Id: <id>` header
//! - peer IP address (when the server was started with connect info)
//! - `anonymous`

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const ANONYMOUS: &str = "anonymous";

/// Identity of the caller, used as the cooldown key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(CLIENT_ID_HEADER)
            && let Ok(id) = value.to_str()
            && !id.trim().is_empty()
        {
            return Ok(ClientId(id.trim().to_string()));
        }

        let id = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| ANONYMOUS.to_string());
        Ok(ClientId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> ClientId {
        let (mut parts, _) = request.into_parts();
        ClientId::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_header_wins() {
        let mut request = Request::builder()
            .header(CLIENT_ID_HEADER, " tab-42 ")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5000))));
        assert_eq!(extract(request).await, ClientId("tab-42".to_string()));
    }

    #[tokio::test]
    async fn test_peer_ip_fallback() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 5000))));
        assert_eq!(extract(request).await, ClientId("10.0.0.1".to_string()));
    }

    #[tokio::test]
    async fn test_anonymous_fallback() {
        let request = Request::builder().header(CLIENT_ID_HEADER, "  ").body(()).unwrap();
        assert_eq!(extract(request).await, ClientId(ANONYMOUS.to_string()));
    }
}
