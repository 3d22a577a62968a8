//! Per-protocol settings variants.
//!
//! Exactly one variant is populated per entity. The variant decides the
//! entity's protocol, so settings and protocol can never disagree.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::catalog::Protocol;
use crate::model::defaults;
use crate::model::value::NumOrStr;

// ============================================================================
// Outbound Settings
// ============================================================================

/// Settings of an outbound, one variant per protocol
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum OutboundSettings {
    VMess(VmessSettings),
    VLess(VlessSettings),
    Trojan(TrojanSettings),
    Shadowsocks(ShadowsocksSettings),
    Socks(ProxyServerSettings),
    Http(ProxyServerSettings),
    Freedom(FreedomSettings),
    Blackhole(BlackholeSettings),
    Dns(DnsSettings),
    WireGuard(WireGuardSettings),
}

impl OutboundSettings {
    /// Protocol selected by this variant
    pub fn protocol(&self) -> Protocol {
        match self {
            OutboundSettings::VMess(_) => Protocol::VMess,
            OutboundSettings::VLess(_) => Protocol::VLess,
            OutboundSettings::Trojan(_) => Protocol::Trojan,
            OutboundSettings::Shadowsocks(_) => Protocol::Shadowsocks,
            OutboundSettings::Socks(_) => Protocol::Socks,
            OutboundSettings::Http(_) => Protocol::Http,
            OutboundSettings::Freedom(_) => Protocol::Freedom,
            OutboundSettings::Blackhole(_) => Protocol::Blackhole,
            OutboundSettings::Dns(_) => Protocol::Dns,
            OutboundSettings::WireGuard(_) => Protocol::WireGuard,
        }
    }
}

/// VMess outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VmessSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cipher: auto, aes-128-gcm, chacha20-poly1305, none, zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
}

impl VmessSettings {
    pub fn template() -> Self {
        Self {
            security: Some(defaults::VMESS_SECURITY.to_string()),
            ..Default::default()
        }
    }
}

/// VLESS outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VlessSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Flow control, e.g. `xtls-rprx-vision`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
}

impl VlessSettings {
    pub fn template() -> Self {
        Self {
            encryption: Some(defaults::VLESS_ENCRYPTION.to_string()),
            ..Default::default()
        }
    }
}

/// Trojan outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrojanSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Shadowsocks outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ShadowsocksSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// UDP over TCP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv_check: Option<bool>,
}

impl ShadowsocksSettings {
    pub fn template() -> Self {
        Self {
            method: Some(defaults::SHADOWSOCKS_METHOD.to_string()),
            uot: Some(false),
            iv_check: Some(false),
            ..Default::default()
        }
    }
}

/// SOCKS / HTTP proxy outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyServerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

/// Freedom (direct) outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FreedomSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_strategy: Option<String>,
    /// Force every connection to `host:port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl FreedomSettings {
    pub fn template() -> Self {
        Self {
            domain_strategy: Some(defaults::FREEDOM_DOMAIN_STRATEGY.to_string()),
            ..Default::default()
        }
    }
}

/// Blackhole outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BlackholeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BlackholeResponse>,
}

/// Response sent before dropping: `none` or `http` (403)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BlackholeResponse {
    #[serde(rename = "type")]
    pub kind: String,
}

impl BlackholeSettings {
    pub fn template() -> Self {
        Self {
            response: Some(BlackholeResponse {
                kind: defaults::BLACKHOLE_RESPONSE.to_string(),
            }),
        }
    }
}

/// DNS outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DnsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<NumOrStr>,
    #[serde(rename = "nonIPQuery", skip_serializing_if = "Option::is_none")]
    pub non_ip_query: Option<String>,
}

impl DnsSettings {
    pub fn template() -> Self {
        Self {
            non_ip_query: Some(defaults::DNS_NON_IP_QUERY.to_string()),
            ..Default::default()
        }
    }
}

/// WireGuard outbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WireGuardSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Local interface addresses (CIDR)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<WireGuardPeer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<Vec<NumOrStr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_kernel_tun: Option<bool>,
}

impl WireGuardSettings {
    pub fn template() -> Self {
        Self {
            mtu: Some(NumOrStr::Num(defaults::WIREGUARD_MTU)),
            workers: Some(NumOrStr::Num(defaults::WIREGUARD_WORKERS)),
            domain_strategy: Some(defaults::WIREGUARD_DOMAIN_STRATEGY.to_string()),
            no_kernel_tun: Some(false),
            ..Default::default()
        }
    }
}

/// WireGuard peer (shared by outbound and inbound settings)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WireGuardPeer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,
    /// `host:port` of the remote peer (outbound only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(rename = "allowedIPs", skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
    /// Persistent keep-alive interval in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<NumOrStr>,
}

// ============================================================================
// Inbound Settings
// ============================================================================

/// Settings of an inbound, one variant per protocol.
///
/// Freedom, Blackhole and DNS cannot listen; an inbound carrying one of
/// them is kept as `Passive` and serializes an empty settings object.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundSettings {
    VMess(ClientSettings),
    VLess(ClientSettings),
    Trojan(ClientSettings),
    Shadowsocks(ShadowsocksInboundSettings),
    Socks(SocksInboundSettings),
    Http(HttpInboundSettings),
    WireGuard(WireGuardInboundSettings),
    Passive(Protocol),
}

impl InboundSettings {
    /// Protocol selected by this variant
    pub fn protocol(&self) -> Protocol {
        match self {
            InboundSettings::VMess(_) => Protocol::VMess,
            InboundSettings::VLess(_) => Protocol::VLess,
            InboundSettings::Trojan(_) => Protocol::Trojan,
            InboundSettings::Shadowsocks(_) => Protocol::Shadowsocks,
            InboundSettings::Socks(_) => Protocol::Socks,
            InboundSettings::Http(_) => Protocol::Http,
            InboundSettings::WireGuard(_) => Protocol::WireGuard,
            InboundSettings::Passive(protocol) => *protocol,
        }
    }
}

impl Serialize for InboundSettings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InboundSettings::VMess(s) | InboundSettings::VLess(s) | InboundSettings::Trojan(s) => {
                s.serialize(serializer)
            }
            InboundSettings::Shadowsocks(s) => s.serialize(serializer),
            InboundSettings::Socks(s) => s.serialize(serializer),
            InboundSettings::Http(s) => s.serialize(serializer),
            InboundSettings::WireGuard(s) => s.serialize(serializer),
            InboundSettings::Passive(_) => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Client list of VMess / VLESS / Trojan inbounds
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<Vec<Client>>,
    /// VLESS only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decryption: Option<String>,
}

/// One inbound user
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Client {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Shadowsocks inbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ShadowsocksInboundSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// SOCKS inbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SocksInboundSettings {
    /// `noauth` or `password`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Account>>,
}

/// HTTP proxy inbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpInboundSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Account>>,
}

/// Username/password pair of SOCKS and HTTP inbounds
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Account {
    pub user: String,
    pub pass: String,
}

/// WireGuard inbound settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WireGuardInboundSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<WireGuardPeer>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<NumOrStr>,
}
