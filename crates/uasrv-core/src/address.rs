// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint URL helpers.
//!
//! Servers usually bind to a wildcard address (`0.0.0.0` or `::`), which is
//! useless to a remote client. These helpers work out the `host:port` the
//! client actually used and substitute it into advertised URLs.

use std::net::{IpAddr, SocketAddr};

use crate::error::DiscoveryError;

/// The pieces of an endpoint URL that address rewriting cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    /// Everything up to and including `://` (empty if there is no scheme).
    pub prefix: &'a str,
    /// The network location (`[userinfo@]host[:port]`).
    pub netloc: &'a str,
    /// Path, query and fragment.
    pub rest: &'a str,
}

impl<'a> UrlParts<'a> {
    /// Splits `url` into prefix, netloc and remainder.
    ///
    /// URLs without `//` have an empty netloc.
    pub fn parse(url: &'a str) -> Self {
        let start = match url.find("://") {
            Some(idx) => idx + 3,
            None if url.starts_with("//") => 2,
            None => {
                return Self {
                    prefix: "",
                    netloc: "",
                    rest: url,
                }
            }
        };
        let tail = &url[start..];
        let end = tail.find(['/', '?', '#']).unwrap_or(tail.len());
        Self {
            prefix: &url[..start],
            netloc: &tail[..end],
            rest: &tail[end..],
        }
    }

    /// Returns the host part of the netloc, without brackets or port.
    pub fn host(&self) -> Option<&'a str> {
        let hostport = match self.netloc.rfind('@') {
            Some(idx) => &self.netloc[idx + 1..],
            None => self.netloc,
        };
        if hostport.is_empty() {
            return None;
        }
        if let Some(bracketed) = hostport.strip_prefix('[') {
            return bracketed.find(']').map(|end| &bracketed[..end]);
        }
        let host = match hostport.rfind(':') {
            Some(idx) => &hostport[..idx],
            None => hostport,
        };
        (!host.is_empty()).then_some(host)
    }

    /// Returns the host parsed as an IP address, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host().and_then(|h| h.parse().ok())
    }
}

/// Replaces the netloc of `url` with `netloc`.
pub fn replace_netloc(url: &str, netloc: &str) -> String {
    let parts = UrlParts::parse(url);
    if parts.prefix.is_empty() {
        return url.to_string();
    }
    format!("{}{}{}", parts.prefix, netloc, parts.rest)
}

/// Returns `true` if the URL's host is a wildcard bind address.
pub fn is_inaddr_any(url: &str) -> bool {
    UrlParts::parse(url).ip().is_some_and(|ip| ip.is_unspecified())
}

/// Rewrites `url` to use `netloc` if its host is `0.0.0.0` or `::`.
///
/// Any other URL, and any URL when `netloc` is empty, is returned unchanged.
pub fn replace_inaddr_any(url: &str, netloc: &str) -> String {
    if netloc.is_empty() || !is_inaddr_any(url) {
        return url.to_string();
    }
    replace_netloc(url, netloc)
}

/// Formats a socket address as a netloc (`ip:port`, IPv6 bracketed).
pub fn netloc_from_socket(addr: &SocketAddr) -> String {
    addr.to_string()
}

/// Works out the `host:port` the client used to reach this server.
///
/// The netloc of the request-supplied endpoint URL wins; otherwise the
/// transport-observed socket address is used.
///
/// # Errors
///
/// Returns [`DiscoveryError::AddressResolution`] when neither source yields
/// an address.
pub fn resolve_netloc(
    endpoint_url: Option<&str>,
    observed: Option<SocketAddr>,
) -> Result<String, DiscoveryError> {
    if let Some(url) = endpoint_url {
        let netloc = UrlParts::parse(url).netloc;
        if !netloc.is_empty() {
            return Ok(netloc.to_string());
        }
    }
    if let Some(addr) = observed {
        return Ok(netloc_from_socket(&addr));
    }
    Err(DiscoveryError::address_resolution(endpoint_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        let parts = UrlParts::parse("opc.tcp://0.0.0.0:4840/freeopcua/server/");
        assert_eq!(parts.prefix, "opc.tcp://");
        assert_eq!(parts.netloc, "0.0.0.0:4840");
        assert_eq!(parts.rest, "/freeopcua/server/");
        assert_eq!(parts.host(), Some("0.0.0.0"));

        let v6 = UrlParts::parse("opc.tcp://[::]:4840");
        assert_eq!(v6.netloc, "[::]:4840");
        assert_eq!(v6.host(), Some("::"));
        assert_eq!(v6.rest, "");

        let named = UrlParts::parse("opc.tcp://user@plc-01:4840?x=1");
        assert_eq!(named.host(), Some("plc-01"));
        assert_eq!(named.rest, "?x=1");
        assert!(named.ip().is_none());

        let bare = UrlParts::parse("not a url");
        assert_eq!(bare.netloc, "");
        assert!(bare.host().is_none());
    }

    #[test]
    fn test_replace_inaddr_any() {
        assert_eq!(
            replace_inaddr_any("opc.tcp://0.0.0.0:4840", "10.0.0.5:4840"),
            "opc.tcp://10.0.0.5:4840"
        );
        assert_eq!(
            replace_inaddr_any("opc.tcp://[::]:4840/ua", "10.0.0.5:4841"),
            "opc.tcp://10.0.0.5:4841/ua"
        );
        assert_eq!(
            replace_inaddr_any("opc.tcp://192.168.1.2:4840", "10.0.0.5:4840"),
            "opc.tcp://192.168.1.2:4840"
        );
        assert_eq!(
            replace_inaddr_any("opc.tcp://plc-01:4840", "10.0.0.5:4840"),
            "opc.tcp://plc-01:4840"
        );
        assert_eq!(
            replace_inaddr_any("opc.tcp://0.0.0.0:4840", ""),
            "opc.tcp://0.0.0.0:4840"
        );
    }

    #[test]
    fn test_resolve_netloc_precedence() {
        let peer: SocketAddr = "10.0.0.9:50000".parse().unwrap();

        let netloc = resolve_netloc(Some("opc.tcp://10.0.0.5:4840"), Some(peer)).unwrap();
        assert_eq!(netloc, "10.0.0.5:4840");

        let netloc = resolve_netloc(Some(""), Some(peer)).unwrap();
        assert_eq!(netloc, "10.0.0.9:50000");

        let netloc = resolve_netloc(None, Some(peer)).unwrap();
        assert_eq!(netloc, "10.0.0.9:50000");

        let v6: SocketAddr = "[fe80::1]:4840".parse().unwrap();
        assert_eq!(resolve_netloc(None, Some(v6)).unwrap(), "[fe80::1]:4840");
    }

    #[test]
    fn test_resolve_netloc_fails_without_source() {
        let err = resolve_netloc(None, None).unwrap_err();
        assert!(matches!(err, DiscoveryError::AddressResolution { .. }));

        let err = resolve_netloc(Some("garbage"), None).unwrap_err();
        assert!(matches!(err, DiscoveryError::AddressResolution { .. }));
    }
}
