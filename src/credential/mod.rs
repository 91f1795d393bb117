//! 凭证模块
//!
//! 提供 Token 声明解码、Cookie 凭证读写和主动刷新调度

pub mod codec;
mod cookies;
mod scheduler;

pub use cookies::{
    clear_cookie, cookie_header_with, credential_cookie, extract_set_cookie, parse_cookie_header,
    read_credentials, set_cookie_values, single_cookie_header, CookieCredentials, CookieNames,
    CredentialPair, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
pub use scheduler::{RefreshScheduler, TokenApi, DEFAULT_REFRESH_BEFORE_SECS};
