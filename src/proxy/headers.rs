//! 转发时的请求头 / 响应头过滤

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST,
};

/// 逐跳头，不能跨连接转发
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// `connection` 头里额外声明的逐跳头
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_droppable(name: &HeaderName, extra: &[String]) -> bool {
    is_hop_by_hop(name) || extra.iter().any(|token| token == name.as_str())
}

/// 构造转发给后端的请求头
///
/// 去掉 `host`、逐跳头和 `accept-encoding`，并按缓冲后的 body 重新计算 `content-length`
pub fn forwardable_request_headers(inbound: &HeaderMap, body_len: Option<usize>) -> HeaderMap {
    let extra = connection_tokens(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound {
        if name == HOST || name == ACCEPT_ENCODING || name == CONTENT_LENGTH {
            continue;
        }
        if is_droppable(name, &extra) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(len) = body_len {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers
}

/// 构造返回给浏览器的响应头
///
/// 去掉逐跳头和 `content-length`（body 可能被重新编码）。`set-cookie` 逐条保留。
pub fn relayable_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let extra = connection_tokens(upstream);
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if name == CONTENT_LENGTH || is_droppable(name, &extra) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE, TRANSFER_ENCODING};

    fn map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_request_headers_drop_host_and_hop_by_hop() {
        let inbound = map(&[
            ("host", "gateway.local"),
            ("connection", "keep-alive, x-trace-hop"),
            ("keep-alive", "timeout=5"),
            ("x-trace-hop", "1"),
            ("accept-encoding", "gzip, br"),
            ("transfer-encoding", "chunked"),
            ("content-length", "999"),
            ("cookie", "access_token=at"),
            ("content-type", "application/json"),
        ]);

        let headers = forwardable_request_headers(&inbound, Some(12));

        assert!(headers.get(HOST).is_none());
        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-trace-hop").is_none());
        assert!(headers.get(ACCEPT_ENCODING).is_none());
        assert!(headers.get(TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "12");
        assert_eq!(headers.get(COOKIE).unwrap(), "access_token=at");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_request_headers_without_body_have_no_length() {
        let inbound = map(&[("content-length", "0"), ("x-request-id", "r1")]);
        let headers = forwardable_request_headers(&inbound, None);
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(headers.get("x-request-id").unwrap(), "r1");
    }

    #[test]
    fn test_response_headers_keep_each_set_cookie() {
        let upstream = map(&[
            ("set-cookie", "a=1; Path=/"),
            ("set-cookie", "b=2; Path=/"),
            ("content-length", "42"),
            ("transfer-encoding", "chunked"),
            ("content-disposition", "attachment; filename=\"export.csv\""),
            ("cache-control", "no-store"),
        ]);

        let headers = relayable_response_headers(&upstream);

        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(TRANSFER_ENCODING).is_none());
        assert!(headers.get("content-disposition").is_some());
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    }
}
