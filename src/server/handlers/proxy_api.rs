//! 代理路由处理器

use crate::proxy::{find_fixture, InboundRequest, RouteConfig};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;

/// `ANY /api/:service/*path`
pub async fn proxy_request(
    State(state): State<AppState>,
    Path((service, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{}", path.trim_start_matches('/'));
    let fixture = if state.proxy.mock_mode() {
        find_fixture(&state.config.mock.fixtures, &service, &method, &path).cloned()
    } else {
        None
    };

    let target = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    let route = RouteConfig::new(service, method, target).with_mock_fixture(fixture);

    state
        .proxy
        .handle(InboundRequest::new(headers, body), route)
        .await
}
