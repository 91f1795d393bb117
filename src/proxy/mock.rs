//! Mock 模式 fixture
//!
//! Mock 模式下网关不访问任何后端，直接返回配置好的响应

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// fixture 响应体，YAML 中写作 `body: {json: ...}` 或 `body: {text: ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MockBody {
    Json(serde_json::Value),
    Text(String),
}

/// 单个路由的 mock 响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockFixture {
    pub service: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub body: Option<MockBody>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 原样作为 `set-cookie` 返回
    #[serde(default)]
    pub cookies: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

impl MockFixture {
    pub fn new(service: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.as_str().to_string(),
            path: path.into(),
            status: default_status(),
            body: None,
            headers: BTreeMap::new(),
            cookies: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: MockBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    /// 路由是否匹配（忽略查询串，方法不区分大小写）
    pub fn matches(&self, service: &str, method: &Method, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or_default();
        self.service == service
            && self.method.eq_ignore_ascii_case(method.as_str())
            && self.path.trim_end_matches('/') == path.trim_end_matches('/')
    }

    /// 转换为 HTTP 响应，无效的状态码或头按 500 / 跳过处理
    pub fn to_response(&self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let (body, content_type) = match &self.body {
            Some(MockBody::Json(value)) => (Body::from(value.to_string()), Some("application/json")),
            Some(MockBody::Text(text)) => {
                (Body::from(text.clone()), Some("text/plain; charset=utf-8"))
            }
            None => (Body::empty(), None),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();

        if let Some(content_type) = content_type {
            headers.insert(
                axum::http::header::CONTENT_TYPE,
                HeaderValue::from_static(content_type),
            );
        }
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!("[MOCK] 跳过无效的 fixture 头: {}", name),
            }
        }
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(axum::http::header::SET_COOKIE, value);
            }
        }
        response
    }
}

/// 在 fixture 列表中查找路由
pub fn find_fixture<'a>(
    fixtures: &'a [MockFixture],
    service: &str,
    method: &Method,
    path: &str,
) -> Option<&'a MockFixture> {
    fixtures.iter().find(|f| f.matches(service, method, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{CONTENT_TYPE, SET_COOKIE};

    #[test]
    fn test_matches_ignores_query_and_method_case() {
        let mut fixture = MockFixture::new("identity", Method::GET, "/users");
        fixture.method = "get".into();

        assert!(fixture.matches("identity", &Method::GET, "/users?page=2"));
        assert!(fixture.matches("identity", &Method::GET, "/users/"));
        assert!(!fixture.matches("identity", &Method::POST, "/users"));
        assert!(!fixture.matches("storage", &Method::GET, "/users"));
    }

    #[test]
    fn test_to_response_json_with_cookies() {
        let fixture = MockFixture::new("identity", Method::GET, "/me")
            .with_status(201)
            .with_body(MockBody::Json(serde_json::json!({"id": 1})))
            .with_cookie("a=1; Path=/")
            .with_cookie("b=2; Path=/");

        let response = fixture.to_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_fixture_from_yaml() {
        let yaml = r#"
service: storage
path: /files/1
status: 404
body:
  text: not here
headers:
  x-mock: "yes"
"#;
        let fixture: MockFixture = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fixture.method, "GET");
        assert_eq!(fixture.body, Some(MockBody::Text("not here".into())));

        let response = fixture.to_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-mock"], "yes");
    }

    #[test]
    fn test_fixture_json_body_from_yaml() {
        let yaml = r#"
service: identity
method: POST
path: /users
status: 201
body:
  json:
    id: 7
    roles: [admin]
"#;
        let fixture: MockFixture = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fixture.method, "POST");
        assert_eq!(
            fixture.body,
            Some(MockBody::Json(serde_json::json!({"id": 7, "roles": ["admin"]})))
        );

        let without_body: MockFixture =
            serde_yaml::from_str("service: identity\npath: /users\n").unwrap();
        assert_eq!(without_body.body, None);
    }

    #[test]
    fn test_find_fixture() {
        let fixtures = vec![
            MockFixture::new("identity", Method::GET, "/users"),
            MockFixture::new("identity", Method::DELETE, "/users/1"),
        ];
        assert!(find_fixture(&fixtures, "identity", &Method::DELETE, "/users/1").is_some());
        assert!(find_fixture(&fixtures, "identity", &Method::GET, "/roles").is_none());
    }
}
