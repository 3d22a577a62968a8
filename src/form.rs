//! Flat form-state records.
//!
//! A form holds every field of every protocol, transport and security layer
//! at once; only the fields relevant to the current selection are read by
//! the builder. Numeric fields are strings so in-progress input (or an
//! environment placeholder) survives untouched, lists are comma/newline
//! separated strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{Protocol, Security, Transport};
use crate::model::{defaults, Foreign};

// ============================================================================
// Passthrough
// ============================================================================

/// Keys of the source entity the form has no field for
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Passthrough {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub root: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub stream: Map<String, Value>,
    /// `protocol` of a source entity outside the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_settings: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stream: Option<Map<String, Value>>,
}

impl Passthrough {
    /// The source's own protocol block, as long as the form still holds the
    /// fallback protocol it was projected onto
    pub fn foreign(&self, protocol: Protocol) -> Option<Foreign> {
        if protocol != Protocol::default() {
            return None;
        }
        Some(Foreign {
            protocol: self.raw_protocol.clone()?,
            settings: self.raw_settings.clone(),
            stream: self.raw_stream.clone(),
        })
    }
}

// ============================================================================
// Stream Form
// ============================================================================

/// Transport, security and socket option fields shared by both directions
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamForm {
    pub network: Transport,
    pub security: Security,

    // TCP
    pub tcp_header_type: String,
    pub tcp_path: String,
    pub tcp_host: String,

    // mKCP
    pub kcp_mtu: String,
    pub kcp_tti: String,
    pub kcp_uplink_capacity: String,
    pub kcp_downlink_capacity: String,
    pub kcp_congestion: bool,
    pub kcp_header_type: String,
    pub kcp_seed: String,

    /// Path of ws / httpupgrade / http / xhttp / splithttp
    pub path: String,
    /// Host of ws / httpupgrade / http / xhttp / splithttp
    pub host: String,

    // gRPC
    pub grpc_service_name: String,
    pub grpc_authority: String,
    pub grpc_multi_mode: bool,
    pub grpc_idle_timeout: String,
    pub grpc_health_check_timeout: String,
    pub grpc_initial_windows_size: String,
    pub grpc_permit_without_stream: bool,

    pub xhttp_mode: String,

    // QUIC
    pub quic_security: String,
    pub quic_key: String,
    pub quic_header_type: String,

    // TLS
    pub server_name: String,
    pub alpn: String,
    pub fingerprint: String,
    pub allow_insecure: bool,
    pub verify_peer_cert_by_name: String,
    pub ech_config_list: String,
    pub reject_unknown_sni: bool,
    pub certificates: Vec<CertificateForm>,

    // REALITY
    pub reality_fingerprint: String,
    pub public_key: String,
    pub short_id: String,
    pub spider_x: String,
    pub mldsa65_verify: String,
    pub reality_target: String,
    pub reality_server_names: String,
    pub private_key: String,
    pub short_ids: String,
    pub xver: String,

    // Socket options
    pub dialer_proxy: String,
    pub tcp_fast_open: bool,
    pub mark: String,
    pub accept_proxy_protocol: bool,
}

impl Default for StreamForm {
    fn default() -> Self {
        Self {
            network: Transport::Tcp,
            security: Security::None,
            tcp_header_type: defaults::HEADER_NONE.to_string(),
            tcp_path: defaults::HTTP_PATH.to_string(),
            tcp_host: String::new(),
            kcp_mtu: defaults::KCP_MTU.to_string(),
            kcp_tti: defaults::KCP_TTI.to_string(),
            kcp_uplink_capacity: defaults::KCP_UPLINK_CAPACITY.to_string(),
            kcp_downlink_capacity: defaults::KCP_DOWNLINK_CAPACITY.to_string(),
            kcp_congestion: false,
            kcp_header_type: defaults::HEADER_NONE.to_string(),
            kcp_seed: String::new(),
            path: defaults::HTTP_PATH.to_string(),
            host: String::new(),
            grpc_service_name: String::new(),
            grpc_authority: String::new(),
            grpc_multi_mode: false,
            grpc_idle_timeout: String::new(),
            grpc_health_check_timeout: String::new(),
            grpc_initial_windows_size: String::new(),
            grpc_permit_without_stream: false,
            xhttp_mode: defaults::XHTTP_MODE.to_string(),
            quic_security: defaults::QUIC_SECURITY.to_string(),
            quic_key: String::new(),
            quic_header_type: defaults::HEADER_NONE.to_string(),
            server_name: String::new(),
            alpn: String::new(),
            fingerprint: String::new(),
            allow_insecure: false,
            verify_peer_cert_by_name: String::new(),
            ech_config_list: String::new(),
            reject_unknown_sni: false,
            certificates: Vec::new(),
            reality_fingerprint: defaults::REALITY_FINGERPRINT.to_string(),
            public_key: String::new(),
            short_id: String::new(),
            spider_x: String::new(),
            mldsa65_verify: String::new(),
            reality_target: String::new(),
            reality_server_names: String::new(),
            private_key: String::new(),
            short_ids: String::new(),
            xver: defaults::REALITY_XVER.to_string(),
            dialer_proxy: String::new(),
            tcp_fast_open: false,
            mark: String::new(),
            accept_proxy_protocol: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CertificateForm {
    pub certificate_file: String,
    pub key_file: String,
}

// ============================================================================
// Outbound Form
// ============================================================================

/// Editable state of one outbound
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OutboundForm {
    pub tag: String,
    pub protocol: Protocol,
    pub address: String,
    pub port: String,

    // VMess / VLESS
    pub id: String,
    pub vmess_security: String,
    pub encryption: String,
    pub flow: String,

    // Trojan / Shadowsocks
    pub password: String,
    pub method: String,
    pub uot: bool,
    pub iv_check: bool,

    // SOCKS / HTTP
    pub user: String,
    pub pass: String,

    // Freedom
    pub domain_strategy: String,
    pub redirect: String,

    pub response_type: String,

    // DNS
    pub dns_network: String,
    pub dns_address: String,
    pub dns_port: String,
    pub non_ip_query: String,

    // WireGuard
    pub secret_key: String,
    pub wg_address: String,
    pub wg_mtu: String,
    pub workers: String,
    pub reserved: String,
    pub wg_domain_strategy: String,
    pub no_kernel_tun: bool,
    pub peers: Vec<WireGuardPeerForm>,

    #[serde(flatten)]
    pub stream: StreamForm,

    // Mux
    pub mux_enabled: bool,
    pub mux_concurrency: String,
    pub mux_xudp_concurrency: String,
    pub mux_xudp_proxy_udp443: String,

    pub extra: Passthrough,
}

impl Default for OutboundForm {
    fn default() -> Self {
        Self {
            tag: String::new(),
            protocol: Protocol::VLess,
            address: String::new(),
            port: String::new(),
            id: String::new(),
            vmess_security: defaults::VMESS_SECURITY.to_string(),
            encryption: defaults::VLESS_ENCRYPTION.to_string(),
            flow: String::new(),
            password: String::new(),
            method: defaults::SHADOWSOCKS_METHOD.to_string(),
            uot: false,
            iv_check: false,
            user: String::new(),
            pass: String::new(),
            domain_strategy: defaults::FREEDOM_DOMAIN_STRATEGY.to_string(),
            redirect: String::new(),
            response_type: defaults::BLACKHOLE_RESPONSE.to_string(),
            dns_network: String::new(),
            dns_address: String::new(),
            dns_port: String::new(),
            non_ip_query: defaults::DNS_NON_IP_QUERY.to_string(),
            secret_key: String::new(),
            wg_address: String::new(),
            wg_mtu: defaults::WIREGUARD_MTU.to_string(),
            workers: defaults::WIREGUARD_WORKERS.to_string(),
            reserved: String::new(),
            wg_domain_strategy: defaults::WIREGUARD_DOMAIN_STRATEGY.to_string(),
            no_kernel_tun: false,
            peers: Vec::new(),
            stream: StreamForm::default(),
            mux_enabled: false,
            mux_concurrency: defaults::MUX_CONCURRENCY.to_string(),
            mux_xudp_concurrency: defaults::MUX_XUDP_CONCURRENCY.to_string(),
            mux_xudp_proxy_udp443: defaults::MUX_XUDP_PROXY_UDP443.to_string(),
            extra: Passthrough::default(),
        }
    }
}

impl OutboundForm {
    /// Template form for `protocol`
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }
}

/// One WireGuard peer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WireGuardPeerForm {
    pub public_key: String,
    pub pre_shared_key: String,
    pub endpoint: String,
    pub allowed_ips: String,
    pub keep_alive: String,
}

impl Default for WireGuardPeerForm {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            pre_shared_key: String::new(),
            endpoint: String::new(),
            allowed_ips: String::new(),
            keep_alive: defaults::WIREGUARD_KEEP_ALIVE.to_string(),
        }
    }
}

// ============================================================================
// Inbound Form
// ============================================================================

/// Editable state of one inbound
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundForm {
    pub tag: String,
    pub listen: String,
    pub port: String,
    pub protocol: Protocol,

    // VMess / VLESS / Trojan
    pub clients: Vec<ClientForm>,
    pub decryption: String,

    // Shadowsocks
    pub method: String,
    pub password: String,
    pub ss_network: String,

    // SOCKS / HTTP
    pub auth: String,
    pub udp: bool,
    pub accounts: Vec<AccountForm>,

    // WireGuard
    pub secret_key: String,
    pub wg_mtu: String,
    pub peers: Vec<WireGuardPeerForm>,

    #[serde(flatten)]
    pub stream: StreamForm,

    // Sniffing
    pub sniffing_enabled: bool,
    pub dest_override: String,
    pub route_only: bool,
    pub metadata_only: bool,

    pub extra: Passthrough,
}

impl Default for InboundForm {
    fn default() -> Self {
        Self {
            tag: String::new(),
            listen: String::new(),
            port: String::new(),
            protocol: Protocol::VLess,
            clients: Vec::new(),
            decryption: defaults::VLESS_ENCRYPTION.to_string(),
            method: defaults::SHADOWSOCKS_METHOD.to_string(),
            password: String::new(),
            ss_network: defaults::SHADOWSOCKS_INBOUND_NETWORK.to_string(),
            auth: defaults::SOCKS_AUTH.to_string(),
            udp: false,
            accounts: Vec::new(),
            secret_key: String::new(),
            wg_mtu: defaults::WIREGUARD_MTU.to_string(),
            peers: Vec::new(),
            stream: StreamForm::default(),
            sniffing_enabled: false,
            dest_override: String::new(),
            route_only: false,
            metadata_only: false,
            extra: Passthrough::default(),
        }
    }
}

/// One inbound user; `id` for VMess/VLESS, `password` for Trojan
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientForm {
    pub id: String,
    pub password: String,
    pub flow: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AccountForm {
    pub user: String,
    pub pass: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_form_template() {
        let form = OutboundForm::default();
        assert_eq!(form.protocol, Protocol::VLess);
        assert_eq!(form.stream.network, Transport::Tcp);
        assert_eq!(form.stream.security, Security::None);
        assert_eq!(form.encryption, "none");
        assert_eq!(form.mux_concurrency, "8");
    }

    #[test]
    fn test_form_deserializes_partial_json() {
        let form: OutboundForm = serde_json::from_value(json!({
            "protocol": "trojan",
            "address": "example.com",
            "port": "443",
            "network": "ws",
            "path": "/ws"
        }))
        .unwrap();
        assert_eq!(form.protocol, Protocol::Trojan);
        assert_eq!(form.stream.network, Transport::Ws);
        assert_eq!(form.stream.path, "/ws");
        assert_eq!(form.vmess_security, "auto");
    }

    #[test]
    fn test_stream_fields_are_flattened() {
        let value = serde_json::to_value(OutboundForm::default()).unwrap();
        assert_eq!(value["network"], "tcp");
        assert_eq!(value["realityFingerprint"], "chrome");
        assert!(value.get("stream").is_none());
    }
}
