use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::services::Caller;

/// Set by the upstream auth layer once the session has been verified
pub const USER_ID_HEADER: &str = "x-user-id";

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const UNKNOWN_IP: &str = "unknown";

/// Caller identity taken from trusted headers and the peer address
///
/// Never rejects: a missing user id is reported by the service as
/// `NotAuthenticated` so the error shape stays uniform.
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let forwarded = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| UNKNOWN_IP.to_string());

        Ok(CallerIdentity(Caller { user_id, ip }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Caller {
        let (mut parts, _) = request.into_parts();
        let CallerIdentity(caller) = CallerIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        caller
    }

    #[tokio::test]
    async fn test_reads_user_and_first_forwarded_ip() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user-42")
            .header(FORWARDED_FOR_HEADER, "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();

        let caller = extract(request).await;
        assert_eq!(caller.user_id.as_deref(), Some("user-42"));
        assert_eq!(caller.ip, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_falls_back_to_peer_address() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 5555))));

        let caller = extract(request).await;
        assert_eq!(caller.user_id, None);
        assert_eq!(caller.ip, "198.51.100.4");
    }

    #[tokio::test]
    async fn test_blank_user_header_is_anonymous() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap();

        let caller = extract(request).await;
        assert_eq!(caller.user_id, None);
        assert_eq!(caller.ip, UNKNOWN_IP);
    }
}
