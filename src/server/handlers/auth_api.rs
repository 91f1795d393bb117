//! 登出与健康检查

use crate::credential::clear_cookie;
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

/// `POST /auth/logout`：取消刷新定时器并清除凭证 Cookie
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(session) = &state.session {
        session.logout();
    }

    let auth = &state.config.auth;
    let jar = jar
        .add(clear_cookie(&auth.access_cookie))
        .add(clear_cookie(&auth.refresh_cookie));
    tracing::info!("[AUTH_API] 登出，已清除凭证 Cookie");
    (jar, StatusCode::NO_CONTENT)
}

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mock_mode": state.config.mock.enabled,
    }))
}
