//! Protocol catalog and capability matrix
//!
//! This module is the static registry of everything the codec knows about:
//! - The closed set of protocols, transports and security layers
//! - Which transports a protocol may ride on (per direction)
//! - Which optional features (TLS, REALITY, flow, mux) are legal for a selection
//!
//! All functions here are pure lookups over constant tables.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::settings::{
    BlackholeSettings, DnsSettings, FreedomSettings, OutboundSettings, ProxyServerSettings,
    ShadowsocksSettings, TrojanSettings, VlessSettings, VmessSettings, WireGuardSettings,
};

// ============================================================================
// Protocol
// ============================================================================

/// Proxy protocol of an outbound or inbound entity
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[serde(rename = "vmess")]
    VMess,
    #[default]
    #[serde(rename = "vless")]
    VLess,
    Trojan,
    Shadowsocks,
    Socks,
    Http,
    Freedom,
    Blackhole,
    Dns,
    #[serde(rename = "wireguard")]
    WireGuard,
}

impl Protocol {
    /// Every supported protocol, in catalog order
    pub const ALL: [Protocol; 10] = [
        Protocol::VMess,
        Protocol::VLess,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::Socks,
        Protocol::Http,
        Protocol::Freedom,
        Protocol::Blackhole,
        Protocol::Dns,
        Protocol::WireGuard,
    ];

    /// Name used in the `protocol` key of canonical JSON
    pub fn wire_name(self) -> &'static str {
        match self {
            Protocol::VMess => "vmess",
            Protocol::VLess => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Socks => "socks",
            Protocol::Http => "http",
            Protocol::Freedom => "freedom",
            Protocol::Blackhole => "blackhole",
            Protocol::Dns => "dns",
            Protocol::WireGuard => "wireguard",
        }
    }

    /// Strict lookup by wire name (case-insensitive)
    pub fn from_wire(name: &str) -> Option<Protocol> {
        let lowered = name.trim().to_ascii_lowercase();
        Protocol::ALL
            .into_iter()
            .find(|p| p.wire_name() == lowered)
    }

    /// Lenient lookup: unknown names fall back to VLESS.
    ///
    /// Partially-known configurations must still project onto a usable form,
    /// so this never fails. The raw JSON survives through the passthrough.
    pub fn from_wire_lenient(name: &str) -> Protocol {
        Protocol::from_wire(name).unwrap_or_else(|| {
            warn!(protocol = name, "Unknown protocol, falling back to vless");
            Protocol::VLess
        })
    }

    /// Whether the protocol dials a remote endpoint (address/port)
    pub fn has_endpoint(self) -> bool {
        !matches!(
            self,
            Protocol::Freedom | Protocol::Blackhole | Protocol::Dns
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Stream transport (`streamSettings.network`)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Kcp,
    Ws,
    Grpc,
    Http,
    HttpUpgrade,
    Xhttp,
    SplitHttp,
    Quic,
}

impl Transport {
    /// Every transport, in catalog order
    pub const ALL: [Transport; 9] = [
        Transport::Tcp,
        Transport::Kcp,
        Transport::Ws,
        Transport::Grpc,
        Transport::Http,
        Transport::HttpUpgrade,
        Transport::Xhttp,
        Transport::SplitHttp,
        Transport::Quic,
    ];

    /// Name used in `streamSettings.network`
    pub fn wire_name(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Kcp => "kcp",
            Transport::Ws => "ws",
            Transport::Grpc => "grpc",
            Transport::Http => "http",
            Transport::HttpUpgrade => "httpupgrade",
            Transport::Xhttp => "xhttp",
            Transport::SplitHttp => "splithttp",
            Transport::Quic => "quic",
        }
    }

    /// Key of the transport-specific settings object inside `streamSettings`
    pub fn settings_key(self) -> &'static str {
        match self {
            Transport::Tcp => "tcpSettings",
            Transport::Kcp => "kcpSettings",
            Transport::Ws => "wsSettings",
            Transport::Grpc => "grpcSettings",
            Transport::Http => "httpSettings",
            Transport::HttpUpgrade => "httpupgradeSettings",
            Transport::Xhttp => "xhttpSettings",
            Transport::SplitHttp => "splithttpSettings",
            Transport::Quic => "quicSettings",
        }
    }

    /// Lookup by wire name, accepting the common aliases
    pub fn from_wire(name: &str) -> Option<Transport> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tcp" | "raw" => Some(Transport::Tcp),
            "kcp" | "mkcp" => Some(Transport::Kcp),
            "ws" | "websocket" => Some(Transport::Ws),
            "grpc" | "gun" => Some(Transport::Grpc),
            "http" | "h2" => Some(Transport::Http),
            "httpupgrade" => Some(Transport::HttpUpgrade),
            "xhttp" => Some(Transport::Xhttp),
            "splithttp" => Some(Transport::SplitHttp),
            "quic" => Some(Transport::Quic),
            _ => None,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// Security
// ============================================================================

/// Security layer (`streamSettings.security`)
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    #[default]
    None,
    Tls,
    Reality,
}

impl Security {
    pub fn wire_name(self) -> &'static str {
        match self {
            Security::None => "none",
            Security::Tls => "tls",
            Security::Reality => "reality",
        }
    }

    /// Lookup by wire name; an empty string means no security
    pub fn from_wire(name: &str) -> Option<Security> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(Security::None),
            "tls" => Some(Security::Tls),
            "reality" => Some(Security::Reality),
            _ => None,
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Whether an entity dials out (outbound) or listens (inbound)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Header disguise of the raw TCP transport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TcpHeader {
    #[default]
    None,
    Http,
}

impl TcpHeader {
    pub fn from_wire(name: &str) -> TcpHeader {
        if name.trim().eq_ignore_ascii_case("http") {
            TcpHeader::Http
        } else {
            TcpHeader::None
        }
    }
}

// ============================================================================
// Capability Matrix
// ============================================================================

const OUTBOUND_STREAM_TRANSPORTS: &[Transport] = &[
    Transport::Tcp,
    Transport::Kcp,
    Transport::Ws,
    Transport::Grpc,
    Transport::Http,
    Transport::HttpUpgrade,
    Transport::Xhttp,
];

const INBOUND_STREAM_TRANSPORTS: &[Transport] = &[
    Transport::Tcp,
    Transport::Kcp,
    Transport::Ws,
    Transport::Grpc,
    Transport::Http,
    Transport::HttpUpgrade,
    Transport::Xhttp,
    Transport::SplitHttp,
    Transport::Quic,
];

const REALITY_TRANSPORTS: &[Transport] = &[
    Transport::Tcp,
    Transport::Grpc,
    Transport::Http,
    Transport::Xhttp,
    Transport::SplitHttp,
];

/// Transports a protocol may carry in the given direction.
///
/// Empty for protocols without a stream layer (Freedom, Blackhole, DNS,
/// WireGuard, SOCKS, HTTP proxy): such entities never get `streamSettings`.
pub fn legal_transports(protocol: Protocol, direction: Direction) -> &'static [Transport] {
    match protocol {
        Protocol::VMess | Protocol::VLess | Protocol::Trojan | Protocol::Shadowsocks => {
            match direction {
                Direction::Outbound => OUTBOUND_STREAM_TRANSPORTS,
                Direction::Inbound => INBOUND_STREAM_TRANSPORTS,
            }
        }
        Protocol::Socks
        | Protocol::Http
        | Protocol::Freedom
        | Protocol::Blackhole
        | Protocol::Dns
        | Protocol::WireGuard => &[],
    }
}

/// Whether the protocol has a stream layer at all
pub fn has_stream(protocol: Protocol, direction: Direction) -> bool {
    !legal_transports(protocol, direction).is_empty()
}

/// Whether `transport` is legal for `protocol` in `direction`
pub fn is_legal_transport(protocol: Protocol, direction: Direction, transport: Transport) -> bool {
    legal_transports(protocol, direction).contains(&transport)
}

/// TLS may wrap any transport the protocol can carry
pub fn can_enable_tls(protocol: Protocol, transport: Transport) -> bool {
    is_legal_transport(protocol, Direction::Outbound, transport)
        || is_legal_transport(protocol, Direction::Inbound, transport)
}

/// REALITY needs a TLS-capable transport that keeps a single TLS stream
pub fn can_enable_reality(protocol: Protocol, transport: Transport) -> bool {
    protocol != Protocol::WireGuard
        && can_enable_tls(protocol, transport)
        && REALITY_TRANSPORTS.contains(&transport)
}

/// Connection multiplexing is available to proxy protocols with a session
/// layer; WireGuard tunnels packets and has none
pub fn can_enable_mux(protocol: Protocol) -> bool {
    protocol.has_endpoint() && protocol != Protocol::WireGuard
}

/// Flow control is VLESS-only, over raw TCP without an HTTP disguise header
pub fn can_enable_flow(protocol: Protocol, transport: Transport, tcp_header: TcpHeader) -> bool {
    protocol == Protocol::VLess && transport == Transport::Tcp && tcp_header != TcpHeader::Http
}

// ============================================================================
// Settings Templates
// ============================================================================

/// Default settings record for a protocol.
///
/// Required fields are empty; defaulted fields carry their documented
/// defaults (e.g. Shadowsocks method `chacha20-ietf-poly1305`).
pub fn settings_template(protocol: Protocol) -> OutboundSettings {
    match protocol {
        Protocol::VMess => OutboundSettings::VMess(VmessSettings::template()),
        Protocol::VLess => OutboundSettings::VLess(VlessSettings::template()),
        Protocol::Trojan => OutboundSettings::Trojan(TrojanSettings::default()),
        Protocol::Shadowsocks => OutboundSettings::Shadowsocks(ShadowsocksSettings::template()),
        Protocol::Socks => OutboundSettings::Socks(ProxyServerSettings::default()),
        Protocol::Http => OutboundSettings::Http(ProxyServerSettings::default()),
        Protocol::Freedom => OutboundSettings::Freedom(FreedomSettings::template()),
        Protocol::Blackhole => OutboundSettings::Blackhole(BlackholeSettings::template()),
        Protocol::Dns => OutboundSettings::Dns(DnsSettings::template()),
        Protocol::WireGuard => OutboundSettings::WireGuard(WireGuardSettings::template()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_wire_names_round_trip() {
        for protocol in Protocol::ALL {
            assert_eq!(Protocol::from_wire(protocol.wire_name()), Some(protocol));
        }
    }

    #[test]
    fn test_protocol_lenient_fallback() {
        assert_eq!(Protocol::from_wire_lenient("VMESS"), Protocol::VMess);
        assert_eq!(Protocol::from_wire_lenient("hysteria2"), Protocol::VLess);
        assert_eq!(Protocol::from_wire_lenient(""), Protocol::VLess);
    }

    #[test]
    fn test_transport_aliases() {
        assert_eq!(Transport::from_wire("raw"), Some(Transport::Tcp));
        assert_eq!(Transport::from_wire("websocket"), Some(Transport::Ws));
        assert_eq!(Transport::from_wire("h2"), Some(Transport::Http));
        assert_eq!(Transport::from_wire("carrier-pigeon"), None);
    }

    #[test]
    fn test_legal_transports_empty_for_endpointless_and_plain_proxies() {
        for protocol in [
            Protocol::Freedom,
            Protocol::Blackhole,
            Protocol::Dns,
            Protocol::WireGuard,
            Protocol::Socks,
            Protocol::Http,
        ] {
            assert!(legal_transports(protocol, Direction::Outbound).is_empty());
            assert!(!has_stream(protocol, Direction::Inbound));
        }
    }

    #[test]
    fn test_legal_transports_inbound_superset() {
        let outbound = legal_transports(Protocol::VLess, Direction::Outbound);
        let inbound = legal_transports(Protocol::VLess, Direction::Inbound);
        assert!(outbound.iter().all(|t| inbound.contains(t)));
        assert!(inbound.contains(&Transport::Quic));
        assert!(!outbound.contains(&Transport::Quic));
    }

    #[test]
    fn test_reality_requires_single_stream_transport() {
        assert!(can_enable_reality(Protocol::VLess, Transport::Tcp));
        assert!(can_enable_reality(Protocol::Trojan, Transport::Grpc));
        assert!(!can_enable_reality(Protocol::VLess, Transport::Ws));
        assert!(!can_enable_reality(Protocol::WireGuard, Transport::Tcp));
        assert!(!can_enable_reality(Protocol::Socks, Transport::Tcp));
    }

    #[test]
    fn test_tls_needs_legal_transport() {
        assert!(can_enable_tls(Protocol::VMess, Transport::Ws));
        assert!(can_enable_tls(Protocol::VLess, Transport::Quic));
        assert!(!can_enable_tls(Protocol::Http, Transport::Tcp));
        assert!(!can_enable_tls(Protocol::Freedom, Transport::Tcp));
    }

    #[test]
    fn test_flow_only_for_vless_raw_tcp() {
        assert!(can_enable_flow(Protocol::VLess, Transport::Tcp, TcpHeader::None));
        assert!(!can_enable_flow(Protocol::VLess, Transport::Tcp, TcpHeader::Http));
        assert!(!can_enable_flow(Protocol::VLess, Transport::Ws, TcpHeader::None));
        assert!(!can_enable_flow(Protocol::Trojan, Transport::Tcp, TcpHeader::None));
    }

    #[test]
    fn test_mux_matrix() {
        assert!(can_enable_mux(Protocol::VMess));
        assert!(can_enable_mux(Protocol::Socks));
        assert!(!can_enable_mux(Protocol::Freedom));
        assert!(!can_enable_mux(Protocol::WireGuard));
        for protocol in [Protocol::Freedom, Protocol::Blackhole, Protocol::Dns] {
            assert!(!protocol.has_endpoint());
            assert!(!can_enable_mux(protocol));
        }
        assert!(Protocol::WireGuard.has_endpoint());
    }

    #[test]
    fn test_settings_template_matches_protocol() {
        for protocol in Protocol::ALL {
            assert_eq!(settings_template(protocol).protocol(), protocol);
        }
    }

    #[test]
    fn test_shadowsocks_template_method() {
        if let OutboundSettings::Shadowsocks(ss) = settings_template(Protocol::Shadowsocks) {
            assert_eq!(ss.method.as_deref(), Some("chacha20-ietf-poly1305"));
        } else {
            panic!("Expected Shadowsocks settings");
        }
    }
}
