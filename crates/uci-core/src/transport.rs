//! Outbound HTTP client shared by the provider and scanner adapters.
//!
//! When `core.socks5Proxy` is set every request goes through that SOCKS5
//! proxy, with host names resolved on the proxy side.

use std::time::Duration;

use tracing::info;

use crate::error::{Result, UciError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Check a proxy endpoint and return it as `host:port`.
///
/// A leading `socks5://` or `socks5h://` is accepted and stripped.
pub fn validate_proxy_endpoint(endpoint: &str) -> Result<String> {
    let trimmed = endpoint.trim();
    let bare = trimmed
        .strip_prefix("socks5h://")
        .or_else(|| trimmed.strip_prefix("socks5://"))
        .unwrap_or(trimmed);

    let (host, port) = bare
        .rsplit_once(':')
        .ok_or_else(|| UciError::Proxy(format!("expected host:port, got {endpoint:?}")))?;
    if host.is_empty() {
        return Err(UciError::Proxy(format!("missing host in {endpoint:?}")));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(format!("{host}:{port}")),
        _ => Err(UciError::Proxy(format!("invalid port in {endpoint:?}"))),
    }
}

/// Build the process-wide HTTP client.
pub fn build_client(socks5_proxy: Option<&str>, user_agent: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT);

    if let Some(endpoint) = socks5_proxy {
        let endpoint = validate_proxy_endpoint(endpoint)?;
        let proxy = reqwest::Proxy::all(format!("socks5h://{endpoint}"))
            .map_err(|e| UciError::Proxy(e.to_string()))?;
        builder = builder.proxy(proxy);
        info!(proxy = %endpoint, "routing outbound traffic through SOCKS5 proxy");
    }

    builder.build().map_err(|e| UciError::Proxy(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_proxy_endpoint() {
        assert_eq!(
            validate_proxy_endpoint("127.0.0.1:1080").unwrap(),
            "127.0.0.1:1080"
        );
        assert_eq!(
            validate_proxy_endpoint("socks5://proxy.internal:9050").unwrap(),
            "proxy.internal:9050"
        );
        assert!(validate_proxy_endpoint("proxy.internal").is_err());
        assert!(validate_proxy_endpoint(":1080").is_err());
        assert!(validate_proxy_endpoint("host:0").is_err());
        assert!(validate_proxy_endpoint("host:http").is_err());
    }

    #[test]
    fn test_build_client_with_and_without_proxy() {
        build_client(None, "unified-ci/test").unwrap();
        build_client(Some("127.0.0.1:1080"), "unified-ci/test").unwrap();
    }

    #[test]
    fn test_bad_proxy_is_proxy_error() {
        let err = build_client(Some("nonsense"), "unified-ci/test").unwrap_err();
        assert!(matches!(err, UciError::Proxy(_)));
    }
}
