//! 网关配置
//!
//! YAML 配置文件 + 环境变量覆盖。所有字段都有默认值，缺省的段落直接使用默认配置。

use crate::proxy::MockFixture;
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "WEBGATE_CONFIG";

const ENV_PREFIX: &str = "WEBGATE_";
const SERVICE_ENV_PREFIX: &str = "WEBGATE_SERVICE_";
const SERVICE_ENV_SUFFIX: &str = "_URL";

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("环境变量 {name} 无效: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 请求体大小上限（字节）
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Mock 模式配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockConfig {
    pub enabled: bool,
    pub fixtures: Vec<MockFixture>,
}

/// 出站转发配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// 为 true 时直接转发，不经过认证客户端
    pub direct_forward: bool,
    /// 出站代理（http/https/socks5）
    pub egress_proxy: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            direct_forward: false,
            egress_proxy: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// 提供 refresh / token-info 接口的服务名
    pub service: String,
    pub refresh_path: String,
    pub token_info_path: String,
    /// 需要重新登录时的跳转地址
    pub login_path: String,
    /// 401 响应体中表示凭证过期的标记（不区分大小写）
    pub expiry_markers: Vec<String>,
    /// 刷新请求自身的重试次数
    pub refresh_retries: u32,
    /// 主动刷新提前量（秒）
    pub refresh_before_secs: u64,
    pub access_cookie: String,
    pub refresh_cookie: String,
    pub access_max_age_secs: i64,
    pub refresh_max_age_secs: i64,
    pub secure_cookies: bool,
    /// 网关自身的服务账号凭证，配置后启动时开启主动刷新
    pub service_account: Option<ServiceAccountConfig>,
}

/// 服务账号凭证
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceAccountConfig {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service: "authentication".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            token_info_path: "/auth/token-info".to_string(),
            login_path: "/login".to_string(),
            expiry_markers: vec!["token".to_string()],
            refresh_retries: 2,
            refresh_before_secs: crate::credential::DEFAULT_REFRESH_BEFORE_SECS,
            access_cookie: crate::credential::ACCESS_TOKEN_COOKIE.to_string(),
            refresh_cookie: crate::credential::REFRESH_TOKEN_COOKIE.to_string(),
            access_max_age_secs: 15 * 60,
            refresh_max_age_secs: 7 * 24 * 3600,
            secure_cookies: false,
            service_account: None,
        }
    }
}

impl AuthConfig {
    pub fn cookie_names(&self) -> crate::credential::CookieNames {
        crate::credential::CookieNames {
            access: self.access_cookie.clone(),
            refresh: self.refresh_cookie.clone(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 网关配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    /// 服务名 -> 基础 URL
    pub services: BTreeMap<String, String>,
    pub mock: MockConfig,
    pub proxy: ProxyConfig,
    pub retry: RetryConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            services: BTreeMap::new(),
            mock: MockConfig::default(),
            proxy: ProxyConfig::default(),
            retry: RetryConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// 从 YAML 字符串解析
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// 从文件加载
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// 按优先级加载：指定路径 > 环境变量 > 默认位置 > 内置默认值，
    /// 然后应用环境变量覆盖并校验
    pub fn load(cli_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => {
                tracing::info!("[CONFIG] 加载配置文件: {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("[CONFIG] 未找到配置文件，使用默认配置");
                Self::default()
            }
        };
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// 应用 `WEBGATE_*` 环境变量覆盖
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if !name.starts_with(ENV_PREFIX) {
                continue;
            }
            match name.as_str() {
                "WEBGATE_MOCK_MODE" => {
                    self.mock.enabled = parse_bool(&value).ok_or_else(|| {
                        ConfigError::InvalidEnv {
                            name: name.clone(),
                            value: value.clone(),
                        }
                    })?;
                }
                "WEBGATE_HOST" => self.server.host = value,
                "WEBGATE_PORT" => {
                    self.server.port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                        name: name.clone(),
                        value: value.clone(),
                    })?;
                }
                "WEBGATE_LOG_LEVEL" => self.logging.level = value,
                "WEBGATE_ACCOUNT_ACCESS_TOKEN" => {
                    self.service_account_mut().access_token = value;
                }
                "WEBGATE_ACCOUNT_REFRESH_TOKEN" => {
                    self.service_account_mut().refresh_token = value;
                }
                _ => {
                    if let Some(service) = name
                        .strip_prefix(SERVICE_ENV_PREFIX)
                        .and_then(|rest| rest.strip_suffix(SERVICE_ENV_SUFFIX))
                        .filter(|s| !s.is_empty())
                    {
                        let key = self.service_key_for_env(service);
                        tracing::debug!("[CONFIG] 环境变量覆盖服务地址: {}", key);
                        self.services.insert(key, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn service_account_mut(&mut self) -> &mut ServiceAccountConfig {
        self.auth
            .service_account
            .get_or_insert_with(|| ServiceAccountConfig {
                access_token: String::new(),
                refresh_token: String::new(),
            })
    }

    /// `IMPORT_EXPORT` 对应已有的 `import-export`，没有则新建小写名
    fn service_key_for_env(&self, env_name: &str) -> String {
        self.services
            .keys()
            .find(|key| env_service_name(key) == env_name)
            .cloned()
            .unwrap_or_else(|| env_name.to_ascii_lowercase().replace('_', "-"))
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, base) in &self.services {
            let parsed = url::Url::parse(base).map_err(|e| {
                ConfigError::Invalid(format!("服务 '{name}' 的地址无效 '{base}': {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "服务 '{name}' 的地址必须是 http(s): {base}"
                )));
            }
        }

        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor 必须大于 0: {}",
                self.retry.backoff_factor
            )));
        }

        if !self.mock.enabled
            && !self.proxy.direct_forward
            && !self.services.contains_key(&self.auth.service)
        {
            return Err(ConfigError::Invalid(format!(
                "auth.service '{}' 不在 services 中",
                self.auth.service
            )));
        }

        if let Some(account) = &self.auth.service_account {
            if account.access_token.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "auth.service_account.access_token 不能为空".to_string(),
                ));
            }
        }

        if let Some(proxy) = self.proxy.egress_proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            crate::proxy::parse_egress_proxy(proxy)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        Ok(())
    }

    /// 查找服务的基础 URL（去掉末尾的 `/`）
    pub fn service_url(&self, service: &str) -> Option<&str> {
        self.services
            .get(service)
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// 认证服务的基础 URL
    pub fn auth_base_url(&self) -> Option<&str> {
        self.service_url(&self.auth.service)
    }
}

/// 解析配置文件路径
pub fn resolve_config_path(cli_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli_path.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path().filter(|p| p.exists())
}

/// 默认配置路径: ~/.webgate/config.yaml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".webgate").join("config.yaml"))
}

fn env_service_name(service: &str) -> String {
    service.to_ascii_uppercase().replace('-', "_")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
