//! `coap://` URI handling: parsing, option generation and address resolution.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use log::debug;
use percent_encoding::percent_decode_str;
use url::Url;

use super::pdu::{option, CoapOption, OptionList};
use super::ExchangeError;

/// URI scheme accepted by the engine.
pub const COAP_SCHEME: &str = "coap";

/// Default CoAP UDP port.
pub const DEFAULT_PORT: u16 = 5683;

/// Longest value allowed for Uri-Host, Uri-Path and Uri-Query options.
const MAX_URI_OPTION_LEN: usize = 255;

/// A parsed exchange target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDestination {
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Percent-decoded path segments.
    pub path: Vec<String>,
    /// Percent-decoded query parameters.
    pub query: Vec<String>,
}

impl ExchangeDestination {
    /// Parse a `coap://host[:port]/path[?query]` URI.
    pub fn parse(uri: &str) -> Result<Self, ExchangeError> {
        let url = Url::parse(uri).map_err(|e| ExchangeError::UriParse(e.to_string()))?;

        if url.scheme() != COAP_SCHEME {
            return Err(ExchangeError::UriParse(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.fragment().is_some() {
            return Err(ExchangeError::UriParse("fragment not allowed".into()));
        }

        let raw_host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ExchangeError::UriParse("missing host".into()))?;
        let host = raw_host.trim_start_matches('[').trim_end_matches(']');
        let host = decode(host)?;

        let path = match url.path() {
            "" | "/" => Vec::new(),
            p => p
                .trim_start_matches('/')
                .split('/')
                .map(decode)
                .collect::<Result<_, _>>()?,
        };

        let query = match url.query() {
            None | Some("") => Vec::new(),
            Some(q) => q.split('&').map(decode).collect::<Result<_, _>>()?,
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            path,
            query,
        })
    }

    /// Whether the host is an IPv4 or IPv6 literal.
    pub fn host_is_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// Request options describing this destination.
    pub fn to_options(&self) -> Result<OptionList, ExchangeError> {
        let mut list = OptionList::new();

        if !self.host_is_literal() {
            list.insert(uri_option(option::URI_HOST, &self.host)?);
        }
        if self.port != DEFAULT_PORT {
            list.insert(CoapOption::uint(option::URI_PORT, u32::from(self.port)));
        }
        for segment in &self.path {
            list.insert(uri_option(option::URI_PATH, segment)?);
        }
        for param in &self.query {
            list.insert(uri_option(option::URI_QUERY, param)?);
        }

        Ok(list)
    }

    /// Resolve to a socket address. IP literals never touch the resolver.
    pub fn resolve(&self) -> Result<SocketAddr, ExchangeError> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                debug!("resolve {} failed: {}", self.host, e);
                ExchangeError::AddressResolve(self.host.clone())
            })?
            .next()
            .ok_or_else(|| ExchangeError::AddressResolve(self.host.clone()))?;

        debug!("resolved {} to {}", self.host, addr);
        Ok(addr)
    }
}

fn decode(raw: &str) -> Result<String, ExchangeError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ExchangeError::UriParse(format!("bad percent-encoding in '{}': {}", raw, e)))
}

fn uri_option(number: u16, value: &str) -> Result<CoapOption, ExchangeError> {
    if value.len() > MAX_URI_OPTION_LEN {
        return Err(ExchangeError::PduBuild(super::PduError::OptionTooLong(value.len())));
    }
    Ok(CoapOption::new(number, value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_default_target() {
        let dest = ExchangeDestination::parse("coap://134.102.218.18/hello").unwrap();
        assert_eq!(dest.host, "134.102.218.18");
        assert_eq!(dest.port, DEFAULT_PORT);
        assert_eq!(dest.path, vec!["hello"]);
        assert!(dest.query.is_empty());
        assert!(dest.host_is_literal());
    }

    #[test]
    fn test_parse_port_path_and_query() {
        let dest =
            ExchangeDestination::parse("coap://example.com:5684/a/b%20c?x=1&y=%41").unwrap();
        assert_eq!(dest.host, "example.com");
        assert_eq!(dest.port, 5684);
        assert_eq!(dest.path, vec!["a", "b c"]);
        assert_eq!(dest.query, vec!["x=1", "y=A"]);
        assert!(!dest.host_is_literal());
    }

    #[test]
    fn test_parse_ipv6_literal() {
        let dest = ExchangeDestination::parse("coap://[::1]:6000/x").unwrap();
        assert_eq!(dest.host, "::1");
        assert_eq!(dest.port, 6000);
        assert!(dest.host_is_literal());
    }

    #[test]
    fn test_parse_root_path_has_no_segments() {
        assert!(ExchangeDestination::parse("coap://10.0.0.1/").unwrap().path.is_empty());
        assert!(ExchangeDestination::parse("coap://10.0.0.1").unwrap().path.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for uri in ["", "not a uri", "http://10.0.0.1/hello", "coap://10.0.0.1/a#frag"] {
            assert!(
                matches!(ExchangeDestination::parse(uri), Err(ExchangeError::UriParse(_))),
                "accepted {:?}",
                uri
            );
        }
    }

    // ==================== Option Tests ====================

    #[test]
    fn test_options_for_literal_default_port() {
        let dest = ExchangeDestination::parse("coap://134.102.218.18/hello").unwrap();
        let opts: Vec<_> = dest.to_options().unwrap().iter().cloned().collect();
        assert_eq!(opts, vec![CoapOption::new(option::URI_PATH, "hello")]);
    }

    #[test]
    fn test_options_for_named_host_and_port() {
        let dest = ExchangeDestination::parse("coap://example.com:5684/a?x=1").unwrap();
        let opts: Vec<_> = dest.to_options().unwrap().iter().cloned().collect();
        assert_eq!(
            opts,
            vec![
                CoapOption::new(option::URI_HOST, "example.com"),
                CoapOption::uint(option::URI_PORT, 5684),
                CoapOption::new(option::URI_PATH, "a"),
                CoapOption::new(option::URI_QUERY, "x=1"),
            ]
        );
    }

    #[test]
    fn test_options_reject_oversized_segment() {
        let uri = format!("coap://10.0.0.1/{}", "s".repeat(300));
        let dest = ExchangeDestination::parse(&uri).unwrap();
        assert!(matches!(dest.to_options(), Err(ExchangeError::PduBuild(_))));
    }

    // ==================== Resolve Tests ====================

    #[test]
    fn test_resolve_ipv4_literal() {
        let dest = ExchangeDestination::parse("coap://127.0.0.1:7000/x").unwrap();
        assert_eq!(dest.resolve().unwrap(), "127.0.0.1:7000".parse().unwrap());
    }

    #[test]
    fn test_resolve_ipv6_literal() {
        let dest = ExchangeDestination::parse("coap://[::1]/x").unwrap();
        assert_eq!(
            dest.resolve().unwrap(),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), DEFAULT_PORT)
        );
    }
}
