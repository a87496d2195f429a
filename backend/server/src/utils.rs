use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{
        Extensions, HeaderMap,
        header::{REFERER, USER_AGENT},
    },
};

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Who sent the request, as far as the headers and socket tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl RequestMeta {
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            ip_address: client_ip(headers)
                .or(peer)
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            user_agent: header_str(headers, USER_AGENT.as_str()),
            referer: header_str(headers, REFERER.as_str()),
        }
    }
}

/// Proxy headers first, the reverse proxy sets them.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        // first hop is the original client
        if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    header_str(headers, "client-ip").or_else(|| header_str(headers, "x-real-ip"))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let meta = RequestMeta::from_parts(
            &headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]),
            &Extensions::new(),
        );

        assert_eq!(meta.ip_address, "203.0.113.7");
    }

    #[test]
    fn falls_back_through_proxy_headers_then_peer() {
        let meta = RequestMeta::from_parts(
            &headers(&[("x-real-ip", "198.51.100.2")]),
            &Extensions::new(),
        );
        assert_eq!(meta.ip_address, "198.51.100.2");

        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4040))));
        let meta = RequestMeta::from_parts(&HeaderMap::new(), &extensions);
        assert_eq!(meta.ip_address, "192.0.2.9");

        let meta = RequestMeta::from_parts(&HeaderMap::new(), &Extensions::new());
        assert_eq!(meta.ip_address, UNKNOWN_CLIENT);
    }

    #[test]
    fn collects_agent_and_referer() {
        let meta = RequestMeta::from_parts(
            &headers(&[
                ("user-agent", "Mozilla/5.0"),
                ("referer", "https://site.example/contact"),
            ]),
            &Extensions::new(),
        );

        assert_eq!(meta.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(meta.referer.as_deref(), Some("https://site.example/contact"));
    }
}
