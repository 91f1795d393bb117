//! 网关会话
//!
//! 把凭证存储、认证客户端和刷新调度器绑在一起：`start` 开始主动刷新，
//! `fetch` 发起认证请求，`logout` 取消定时器并清空凭证。

use crate::auth::{AuthOutcome, AuthenticatedClient, HttpTokenApi};
use crate::credential::{CookieCredentials, CredentialPair, RefreshScheduler};
use crate::transport::OutboundRequest;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct GatewaySession {
    credentials: CookieCredentials,
    client: Arc<AuthenticatedClient>,
    scheduler: RefreshScheduler,
    refresh_before_secs: u64,
}

impl GatewaySession {
    pub fn new(client: Arc<AuthenticatedClient>, credentials: CredentialPair, refresh_before_secs: u64) -> Self {
        let credentials = CookieCredentials::new(credentials);
        let api = HttpTokenApi::new(client.refresher().clone(), credentials.clone());
        Self {
            credentials,
            client,
            scheduler: RefreshScheduler::new(Arc::new(api)),
            refresh_before_secs,
        }
    }

    /// 开始主动刷新，返回首个定时器的等待时间
    pub async fn start(&self) -> Option<Duration> {
        self.scheduler.schedule_refresh(self.refresh_before_secs).await
    }

    pub async fn fetch(&self, request: OutboundRequest) -> AuthOutcome {
        self.client.fetch(request, &self.credentials).await
    }

    pub fn logout(&self) {
        self.scheduler.cancel_refresh();
        self.credentials.clear();
        tracing::info!("[SESSION] 已登出");
    }

    pub fn credentials(&self) -> &CookieCredentials {
        &self.credentials
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, TokenRefresher};
    use crate::config::AuthConfig;
    use crate::resilience::RetryConfig;
    use crate::transport::{ReqwestTransport, Transport};
    use reqwest::Method;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_for(server: &MockServer, pair: CredentialPair) -> GatewaySession {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(reqwest::Client::new()));
        let auth = AuthConfig::default();
        let retry = RetryConfig::new(1, 10, 50);
        let refresher = Arc::new(TokenRefresher::new(transport.clone(), &server.uri(), &auth, &retry));
        let client = Arc::new(AuthenticatedClient::new(transport, refresher, retry, &auth));
        GatewaySession::new(client, pair, 60)
    }

    #[tokio::test]
    async fn test_start_arms_scheduler_and_logout_cancels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/token-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expiresIn": 900
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server, CredentialPair::new("at", "rt"));
        assert_eq!(session.start().await, Some(Duration::from_secs(840)));
        assert!(session.scheduler().is_scheduled());

        session.logout();
        assert!(!session.scheduler().is_scheduled());
        assert!(session.credentials().credentials().is_anonymous());
    }

    #[tokio::test]
    async fn test_fetch_after_logout_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server, CredentialPair::new("at", "rt"));
        let url = format!("{}/users", server.uri());

        let resp = session
            .fetch(OutboundRequest::new(Method::GET, &url))
            .await
            .unwrap();
        assert!(resp.response.is_success());

        session.logout();
        let result = session.fetch(OutboundRequest::new(Method::GET, &url)).await;
        assert_eq!(result.unwrap_err(), AuthError::LoginRequired);
    }
}
