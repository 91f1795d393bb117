//! 代理模块
//!
//! 入站请求转发、响应重建、Mock 模式和出站客户端

mod handler;
mod headers;
mod mock;
mod outbound;

pub use handler::{build_response, InboundRequest, ProxyHandler, RouteConfig};
pub use headers::{
    forwardable_request_headers, is_hop_by_hop, relayable_response_headers, HOP_BY_HOP_HEADERS,
};
pub use mock::{find_fixture, MockBody, MockFixture};
pub use outbound::{build_client, client_builder, parse_egress_proxy, ClientBuildError};
