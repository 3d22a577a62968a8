//! Share-link codecs
//!
//! This module provides:
//! - The `LinkCodec` trait, one implementation per URI scheme
//! - `LinkRegistry`, dispatching links to codecs by scheme (aliases allowed)
//! - `Decoded`, the match/no-match result used by every text importer
//!
//! Codecs translate between a link and form state; the registry runs the
//! builder and the projector around them, so its public results are
//! canonical entities.

pub mod base64;
pub mod detection;
mod params;
mod proxy;
mod shadowsocks;
mod trojan;
mod vless;
mod vmess;
mod wireguard;

pub use proxy::{HttpCodec, SocksCodec};
pub use shadowsocks::ShadowsocksCodec;
pub use trojan::TrojanCodec;
pub use vless::VlessCodec;
pub use vmess::VmessCodec;
pub use wireguard::WireGuardCodec;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::builder::build_outbound;
use crate::catalog::Protocol;
use crate::error::CodecError;
use crate::form::OutboundForm;
use crate::model::Outbound;
use crate::projector::project_outbound;

// ============================================================================
// Decoded
// ============================================================================

/// Outcome of trying one textual format
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Match(T),
    /// The input is not in this format; the caller may try the next one
    NoMatch { reason: String },
}

impl<T> Decoded<T> {
    pub fn no_match(reason: impl Into<String>) -> Self {
        Decoded::NoMatch {
            reason: reason.into(),
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Decoded::Match(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Match(value) => Some(value),
            Decoded::NoMatch { .. } => None,
        }
    }
}

// ============================================================================
// Link Codec Trait
// ============================================================================

/// Codec for one share-link scheme
pub trait LinkCodec: Send + Sync {
    /// The scheme this codec handles (e.g. "ss", "vmess")
    fn scheme(&self) -> &str;

    /// Further schemes decoded by this codec (e.g. "wg" for "wireguard")
    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// Protocol of the outbounds this codec produces and exports
    fn protocol(&self) -> Protocol;

    /// Parses a link into form state
    fn decode(&self, link: &str) -> Result<OutboundForm>;

    /// Renders form state as a link
    fn encode(&self, form: &OutboundForm) -> Result<String>;

    /// Checks if this codec can handle the given link
    fn can_decode(&self, link: &str) -> bool {
        extract_scheme(link).is_ok_and(|scheme| {
            scheme.eq_ignore_ascii_case(self.scheme())
                || self
                    .aliases()
                    .iter()
                    .any(|alias| scheme.eq_ignore_ascii_case(alias))
        })
    }
}

// ============================================================================
// Link Registry
// ============================================================================

/// Registry of link codecs with dynamic dispatch
#[derive(Default)]
pub struct LinkRegistry {
    codecs: HashMap<String, Arc<dyn LinkCodec>>,
    exporters: HashMap<Protocol, Arc<dyn LinkCodec>>,
}

impl LinkRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with all built-in codecs registered
    pub fn with_builtin_codecs() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VlessCodec));
        registry.register(Arc::new(VmessCodec));
        registry.register(Arc::new(TrojanCodec));
        registry.register(Arc::new(ShadowsocksCodec));
        registry.register(Arc::new(SocksCodec));
        registry.register(Arc::new(HttpCodec));
        registry.register(Arc::new(WireGuardCodec));
        registry
    }

    /// Registers a codec under its scheme and aliases
    pub fn register(&mut self, codec: Arc<dyn LinkCodec>) {
        for alias in codec.aliases() {
            self.codecs.insert(alias.to_string(), Arc::clone(&codec));
        }
        self.codecs
            .insert(codec.scheme().to_string(), Arc::clone(&codec));
        self.exporters.insert(codec.protocol(), codec);
    }

    /// Gets the codec for the given scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn LinkCodec>> {
        self.codecs.get(&scheme.to_ascii_lowercase())
    }

    /// Decodes one link into a canonical outbound
    pub fn decode(&self, link: &str) -> Decoded<Outbound> {
        let link = link.trim();
        let scheme = match extract_scheme(link) {
            Ok(scheme) => scheme,
            Err(e) => return Decoded::no_match(e.to_string()),
        };
        let Some(codec) = self.get(scheme) else {
            return Decoded::no_match(format!("No codec registered for scheme: {}", scheme));
        };

        match codec.decode(link) {
            Ok(form) => {
                let outbound = build_outbound(&form, None);
                debug!("Decoded {} link -> outbound '{}'", scheme, outbound.tag);
                Decoded::Match(outbound)
            }
            Err(e) => {
                debug!("Failed to decode {} link: {:#}", scheme, e);
                Decoded::no_match(format!("{:#}", e))
            }
        }
    }

    /// Decodes every link of a multi-line text (one per line)
    pub fn decode_list(&self, content: &str) -> Vec<Decoded<Outbound>> {
        let lines: Vec<&str> = content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        debug!("Decoding {} link lines from content", lines.len());

        lines.into_iter().map(|line| self.decode(line)).collect()
    }

    /// Decodes a multi-line text, keeping only the links that decoded
    pub fn decode_list_lossy(&self, content: &str) -> Vec<Outbound> {
        let results = self.decode_list(content);
        let total = results.len();

        let outbounds: Vec<Outbound> = results
            .into_iter()
            .filter_map(|decoded| match decoded {
                Decoded::Match(outbound) => Some(outbound),
                Decoded::NoMatch { reason } => {
                    warn!("Skipping link: {}", reason);
                    None
                }
            })
            .collect();

        debug!(
            "Link list decoding complete: {} total, {} decoded",
            total,
            outbounds.len()
        );
        outbounds
    }

    /// Encodes a canonical outbound as a share link
    pub fn encode(&self, outbound: &Value) -> Result<String, CodecError> {
        let form = project_outbound(outbound);
        if let Some(foreign) = form.extra.foreign(form.protocol) {
            return Err(CodecError::UnsupportedLink(foreign.protocol));
        }
        let codec = self
            .exporters
            .get(&form.protocol)
            .ok_or_else(|| CodecError::UnsupportedLink(form.protocol.to_string()))?;
        Ok(codec.encode(&form)?)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses host:port string, handling IPv6 addresses in brackets
pub fn parse_host_port(hostport: &str) -> Result<(String, u16)> {
    if hostport.starts_with('[') {
        let bracket_end = hostport
            .find(']')
            .ok_or_else(|| anyhow!("Invalid IPv6 address: missing closing bracket"))?;

        let host = hostport[1..bracket_end].to_string();
        let port_str = hostport[bracket_end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("Missing port after IPv6 address"))?;

        let port: u16 = port_str
            .parse()
            .map_err(|_| anyhow!("Invalid port number: {}", port_str))?;
        return Ok((host, port));
    }

    let colon_pos = hostport
        .rfind(':')
        .ok_or_else(|| anyhow!("Invalid host:port format: missing colon"))?;

    let host = hostport[..colon_pos].to_string();
    let port: u16 = hostport[colon_pos + 1..]
        .parse()
        .map_err(|_| anyhow!("Invalid port number"))?;

    Ok((host, port))
}

/// Formats a host for the authority part of a URI (brackets IPv6)
pub fn format_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// Extracts the scheme from a URI
pub fn extract_scheme(uri: &str) -> Result<&str> {
    if !uri.contains("://") {
        bail!("Invalid URI: missing scheme separator ://");
    }
    uri.split("://")
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Invalid URI: missing scheme"))
}

/// Host and port of a parsed link, IPv6 brackets stripped
pub(crate) fn host_port(url: &Url) -> Result<(String, u16)> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("Link missing host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("Link missing port"))?;
    Ok((host, port))
}

/// Fragment as the tag; empty without one, matching an untagged export
pub(crate) fn tag_from(url: &Url) -> String {
    url.fragment()
        .map(|f| {
            urlencoding::decode(f)
                .unwrap_or_else(|_| f.into())
                .into_owned()
        })
        .unwrap_or_default()
}

/// Percent-decoded userinfo component
pub(crate) fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or_else(|_| raw.into())
        .into_owned()
}

/// `#tag` suffix, empty when there is no tag
pub(crate) fn fragment(tag: &str) -> String {
    if tag.is_empty() {
        String::new()
    } else {
        format!("#{}", urlencoding::encode(tag))
    }
}

/// Requires a non-empty endpoint before encoding
pub(crate) fn endpoint(form: &OutboundForm) -> Result<(String, String)> {
    let address = form.address.trim();
    let port = form.port.trim();
    if address.is_empty() || port.is_empty() {
        bail!("Outbound has no address/port to export");
    }
    Ok((format_host(address), port.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_registry_new() {
        let registry = LinkRegistry::new();
        assert!(registry.codecs.is_empty());
    }

    #[test]
    fn test_link_registry_with_builtin_codecs() {
        let registry = LinkRegistry::with_builtin_codecs();
        for scheme in ["vless", "vmess", "trojan", "ss", "socks", "socks5", "http", "wireguard", "wg"] {
            assert!(registry.get(scheme).is_some(), "missing codec for {}", scheme);
        }
    }

    #[test]
    fn test_extract_scheme_valid() {
        assert_eq!(extract_scheme("ss://abc").unwrap(), "ss");
        assert_eq!(extract_scheme("vmess://xyz").unwrap(), "vmess");
    }

    #[test]
    fn test_extract_scheme_invalid() {
        assert!(extract_scheme("not-a-uri").is_err());
        assert!(extract_scheme("://missing").is_err());
        assert!(extract_scheme("").is_err());
    }

    #[test]
    fn test_decode_unknown_scheme_is_no_match() {
        let registry = LinkRegistry::with_builtin_codecs();
        let decoded = registry.decode("hysteria2://pw@host:443");
        assert!(!decoded.is_match());
        if let Decoded::NoMatch { reason } = decoded {
            assert!(reason.contains("hysteria2"));
        } else {
            panic!("Expected NoMatch");
        }
    }

    #[test]
    fn test_decode_list_filters_comments_and_blanks() {
        let registry = LinkRegistry::new();
        let results = registry.decode_list("\n\n# comment\n  \n");
        assert!(results.is_empty());
    }

    #[test]
    fn test_encode_unsupported_protocol() {
        let registry = LinkRegistry::with_builtin_codecs();
        let freedom = serde_json::json!({"tag": "direct", "protocol": "freedom", "settings": {}});
        let err = registry.encode(&freedom).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedLink(ref name) if name == "freedom"));

        let hysteria = serde_json::json!({"protocol": "hysteria2", "settings": {"server": "x:443"}});
        let err = registry.encode(&hysteria).unwrap_err();
        assert_eq!(err.to_string(), "hysteria2 outbounds have no share-link form");
    }

    #[test]
    fn test_parse_host_port_ipv4() {
        let (host, port) = parse_host_port("example.com:8080").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_parse_host_port_ipv6() {
        let (host, port) = parse_host_port("[2001:db8::1]:443").unwrap();
        assert_eq!(host, "2001:db8::1");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_parse_host_port_invalid() {
        assert!(parse_host_port("example.com").is_err());
        assert!(parse_host_port("example.com:invalid").is_err());
        assert!(parse_host_port("[::1:8080").is_err());
        assert!(parse_host_port("[::1]x443").is_err());
        assert!(parse_host_port("[::1]").is_err());
    }

    #[test]
    fn test_format_host_brackets_ipv6() {
        assert_eq!(format_host("::1"), "[::1]");
        assert_eq!(format_host("example.com"), "example.com");
    }
}
