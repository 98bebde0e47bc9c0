//! Small networking helpers shared by the master client, the slave server,
//! and the subscriber's peer-resolution path (spec §4.2: "parse the first
//! URI of the form `http://HOST:PORT/`, resolve HOST (IPv4 or IPv6) to a
//! numeric address string").

use crate::error::{Error, Result};

/// Splits a `SCHEME://HOST:PORT/` URI into its host and port. Used both for
/// `http://` xmlrpc URIs (spec §4.2) and `rosrpc://` service URIs (spec §3
/// `ServiceCaller`/`lookupService`); accepts a missing trailing slash and
/// bracketed IPv6 hosts.
pub(crate) fn parse_xmlrpc_uri(uri: &str) -> Result<(String, u16)> {
    let rest = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| Error::Protocol(format!("not a scheme://host:port uri: {uri}")))?;
    let rest = rest.trim_end_matches('/');
    let (host, port) = if let Some(bracket_end) = rest.find(']') {
        // bracketed IPv6: [::1]:1234
        let host = &rest[..=bracket_end];
        let port_str = rest[bracket_end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| Error::Protocol(format!("missing port in uri: {uri}")))?;
        (host.to_string(), port_str)
    } else {
        let (host, port_str) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Protocol(format!("missing port in uri: {uri}")))?;
        (host.to_string(), port_str)
    };
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid port in uri: {uri}")))?;
    Ok((host, port))
}

/// Resolves `host` (already an IPv4/IPv6 literal or a DNS name) to a numeric
/// address string, per spec §4.2's `registerSubscriber`/`publisherUpdate`
/// handling.
pub(crate) async fn resolve_host(host: &str) -> Result<String> {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Ok(host.to_string());
    }
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if trimmed.parse::<std::net::IpAddr>().is_ok() {
        return Ok(trimmed.to_string());
    }
    let mut addrs = tokio::net::lookup_host((trimmed, 0))
        .await
        .map_err(|e| Error::Disconnected(format!("failed to resolve host {host}: {e}")))?;
    let addr = addrs
        .next()
        .ok_or_else(|| Error::Disconnected(format!("no addresses found for host {host}")))?;
    Ok(addr.ip().to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_standard_uri() {
        assert_eq!(
            parse_xmlrpc_uri("http://127.0.0.1:45101/").unwrap(),
            ("127.0.0.1".to_string(), 45101)
        );
    }

    #[test]
    fn parses_uri_without_trailing_slash() {
        assert_eq!(
            parse_xmlrpc_uri("http://hostname:11311").unwrap(),
            ("hostname".to_string(), 11311)
        );
    }

    #[test]
    fn parses_bracketed_ipv6_uri() {
        assert_eq!(
            parse_xmlrpc_uri("http://[::1]:45101/").unwrap(),
            ("[::1]".to_string(), 45101)
        );
    }

    #[test]
    fn parses_rosrpc_service_uri() {
        assert_eq!(
            parse_xmlrpc_uri("rosrpc://127.0.0.1:1234").unwrap(),
            ("127.0.0.1".to_string(), 1234)
        );
    }

    #[test]
    fn rejects_uri_without_a_scheme() {
        assert!(parse_xmlrpc_uri("127.0.0.1:1234").is_err());
    }

    #[tokio::test]
    async fn resolve_host_passes_through_numeric_ipv4() {
        assert_eq!(resolve_host("127.0.0.1").await.unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn resolve_host_passes_through_bracketed_ipv6() {
        assert_eq!(resolve_host("[::1]").await.unwrap(), "::1");
    }
}
