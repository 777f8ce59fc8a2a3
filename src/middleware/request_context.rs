use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::error::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request metadata available to handlers and activity logging.
#[derive(Clone, Debug, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub client_ip: Option<String>,
    pub forwarded_for: Vec<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::internal_server_error("Request context unavailable"))
    }
}

/// Whether forwarding headers set by a local reverse proxy are honoured.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyTrust {
    pub trust_proxy_headers: bool,
}

impl ProxyTrust {
    pub fn new(trust_proxy_headers: bool) -> Self {
        Self { trust_proxy_headers }
    }
}

/// 127.0.0.0/8, `::1` and the `localhost` hostname.
pub fn is_localhost_address(ip: &str) -> bool {
    ip == "::1" || ip.starts_with("127.") || ip.eq_ignore_ascii_case("localhost")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn forwarded_chain(headers: &HeaderMap) -> Vec<String> {
    header_str(headers, "x-forwarded-for")
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|hop| !hop.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Client address for a request.
///
/// Forwarding headers (`X-Forwarded-For` first hop, then `X-Real-IP`) are
/// only read when trusted and the TCP peer is loopback or unknown. Localhost
/// values inside them are ignored so a remote client cannot pose as local.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust: ProxyTrust) -> Option<String> {
    let peer_is_proxy = peer.map_or(true, |ip| ip.is_loopback());

    if trust.trust_proxy_headers && peer_is_proxy {
        let candidates = forwarded_chain(headers)
            .into_iter()
            .take(1)
            .chain(header_str(headers, "x-real-ip").map(str::to_string));
        for candidate in candidates {
            if is_localhost_address(&candidate) {
                tracing::warn!("Ignoring localhost value in forwarding header: '{}'", candidate);
                continue;
            }
            return Some(candidate);
        }
    } else if headers.contains_key("x-forwarded-for") {
        tracing::debug!("Ignoring X-Forwarded-For from untrusted peer {:?}", peer);
    }

    peer.map(|ip| ip.to_string())
}

pub async fn request_context_middleware(
    State(trust): State<ProxyTrust>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let headers = request.headers();

    let context = RequestContext {
        request_id: Uuid::new_v4(),
        client_ip: resolve_client_ip(headers, peer, trust),
        forwarded_for: forwarded_chain(headers),
        user_agent: header_str(headers, "user-agent").map(str::to_string),
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        received_at: Utc::now(),
    };
    let request_id = context.request_id;
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Json, Router};
    use tower::ServiceExt;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    const TRUSTED: ProxyTrust = ProxyTrust { trust_proxy_headers: true };
    const UNTRUSTED: ProxyTrust = ProxyTrust { trust_proxy_headers: false };

    #[test]
    fn localhost_detection() {
        assert!(is_localhost_address("127.0.0.1"));
        assert!(is_localhost_address("127.4.5.6"));
        assert!(is_localhost_address("::1"));
        assert!(is_localhost_address("LocalHost"));
        assert!(!is_localhost_address("10.0.0.1"));
        assert!(!is_localhost_address(""));
    }

    #[test]
    fn forwarded_header_from_local_proxy() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.2")]);
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(resolve_client_ip(&h, Some(loopback), TRUSTED).as_deref(), Some("203.0.113.9"));
        assert_eq!(forwarded_chain(&h), vec!["203.0.113.9", "10.0.0.2"]);
    }

    #[test]
    fn forwarded_header_ignored_when_untrusted_or_remote() {
        let h = headers(&[("x-forwarded-for", "203.0.113.9")]);
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        let remote: IpAddr = "198.51.100.4".parse().unwrap();
        assert_eq!(resolve_client_ip(&h, Some(loopback), UNTRUSTED).as_deref(), Some("127.0.0.1"));
        assert_eq!(resolve_client_ip(&h, Some(remote), TRUSTED).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn spoofed_localhost_falls_through() {
        let h = headers(&[("x-forwarded-for", "127.0.0.1"), ("x-real-ip", "192.0.2.7")]);
        assert_eq!(resolve_client_ip(&h, None, TRUSTED).as_deref(), Some("192.0.2.7"));

        let h = headers(&[("x-forwarded-for", "localhost")]);
        assert_eq!(resolve_client_ip(&h, None, TRUSTED), None);
    }

    #[tokio::test]
    async fn attaches_context_and_request_id_header() {
        let app = Router::new()
            .route(
                "/ctx",
                get(|ctx: RequestContext| async move {
                    Json(serde_json::json!({
                        "id": ctx.request_id,
                        "ua": ctx.user_agent,
                        "path": ctx.path,
                        "method": ctx.method,
                    }))
                }),
            )
            .layer(middleware::from_fn_with_state(ProxyTrust::default(), request_context_middleware));

        let res = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ctx")
                    .header("user-agent", "curl/8.4.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = res.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap().to_string();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["id"], header);
        assert_eq!(body["ua"], "curl/8.4.0");
        assert_eq!(body["path"], "/ctx");
        assert_eq!(body["method"], "GET");
    }
}
