//! Stream layer of the canonical model.
//!
//! `streamSettings` is a transport variant (exactly one, matching `network`)
//! plus a security variant (`tlsSettings` xor `realitySettings`) plus an
//! optional `sockopt` block. Mux and sniffing live here as well since they
//! are the other optional blocks hanging off an entity.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::catalog::{Security, Transport};
use crate::model::value::NumOrStr;

/// Keys of `streamSettings` owned by the model; anything else is passthrough
pub const STREAM_KEYS: &[&str] = &[
    "network",
    "security",
    "tcpSettings",
    "rawSettings",
    "kcpSettings",
    "wsSettings",
    "grpcSettings",
    "httpSettings",
    "httpupgradeSettings",
    "xhttpSettings",
    "splithttpSettings",
    "quicSettings",
    "tlsSettings",
    "realitySettings",
    "sockopt",
];

// ============================================================================
// Stream Settings
// ============================================================================

/// `streamSettings` of an outbound or inbound
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamSettings {
    pub transport: TransportSettings,
    pub security: SecuritySettings,
    /// Emit `network` even when it is the default `tcp`
    pub explicit_network: bool,
    /// Emit `security` even when it is the default `none`
    pub explicit_security: bool,
    /// Spell the tcp network as `raw`
    pub raw_network_name: bool,
    /// Write the tcp block under `rawSettings`
    pub raw_settings_key: bool,
    pub sockopt: Option<Sockopt>,
    pub extra: Map<String, Value>,
}

impl StreamSettings {
    pub fn network(&self) -> Transport {
        self.transport.transport()
    }
}

impl Serialize for StreamSettings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        let network = self.network();
        if self.explicit_network || network != Transport::Tcp {
            let name = if network == Transport::Tcp && self.raw_network_name {
                "raw"
            } else {
                network.wire_name()
            };
            map.serialize_entry("network", name)?;
        }
        let security = self.security.security();
        if self.explicit_security || security != Security::None {
            map.serialize_entry("security", security.wire_name())?;
        }
        self.transport.serialize_entry(&mut map, self.raw_settings_key)?;
        match &self.security {
            SecuritySettings::Tls(Some(tls)) => map.serialize_entry("tlsSettings", tls)?,
            SecuritySettings::Reality(Some(reality)) => {
                map.serialize_entry("realitySettings", reality)?
            }
            _ => {}
        }
        if let Some(sockopt) = &self.sockopt {
            map.serialize_entry("sockopt", sockopt)?;
        }
        for (key, value) in &self.extra {
            if !STREAM_KEYS.contains(&key.as_str()) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

// ============================================================================
// Transport Variants
// ============================================================================

/// Transport-specific settings; `None` payload means the block is omitted
#[derive(Clone, Debug, PartialEq)]
pub enum TransportSettings {
    Tcp(Option<TcpSettings>),
    Kcp(Option<KcpSettings>),
    Ws(Option<WsSettings>),
    Grpc(Option<GrpcSettings>),
    Http(Option<HttpSettings>),
    HttpUpgrade(Option<WsSettings>),
    Xhttp(Option<XhttpSettings>),
    SplitHttp(Option<XhttpSettings>),
    Quic(Option<QuicSettings>),
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings::Tcp(None)
    }
}

impl TransportSettings {
    pub fn transport(&self) -> Transport {
        match self {
            TransportSettings::Tcp(_) => Transport::Tcp,
            TransportSettings::Kcp(_) => Transport::Kcp,
            TransportSettings::Ws(_) => Transport::Ws,
            TransportSettings::Grpc(_) => Transport::Grpc,
            TransportSettings::Http(_) => Transport::Http,
            TransportSettings::HttpUpgrade(_) => Transport::HttpUpgrade,
            TransportSettings::Xhttp(_) => Transport::Xhttp,
            TransportSettings::SplitHttp(_) => Transport::SplitHttp,
            TransportSettings::Quic(_) => Transport::Quic,
        }
    }

    fn serialize_entry<M: SerializeMap>(&self, map: &mut M, raw_key: bool) -> Result<(), M::Error> {
        let key = match self {
            TransportSettings::Tcp(_) if raw_key => "rawSettings",
            _ => self.transport().settings_key(),
        };
        match self {
            TransportSettings::Tcp(Some(s)) => map.serialize_entry(key, s),
            TransportSettings::Kcp(Some(s)) => map.serialize_entry(key, s),
            TransportSettings::Ws(Some(s)) | TransportSettings::HttpUpgrade(Some(s)) => {
                map.serialize_entry(key, s)
            }
            TransportSettings::Grpc(Some(s)) => map.serialize_entry(key, s),
            TransportSettings::Http(Some(s)) => map.serialize_entry(key, s),
            TransportSettings::Xhttp(Some(s)) | TransportSettings::SplitHttp(Some(s)) => {
                map.serialize_entry(key, s)
            }
            TransportSettings::Quic(Some(s)) => map.serialize_entry(key, s),
            _ => Ok(()),
        }
    }
}

/// `{"type": "..."}` header object used by kcp and quic
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct HeaderType {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Raw TCP settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TcpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<TcpHeaderSettings>,
}

/// TCP header disguise; `request` only for `type: http`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TcpHeaderSettings {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequestHeader>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct HttpRequestHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HttpHeaders>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct HttpHeaders {
    #[serde(rename = "Host", skip_serializing_if = "Option::is_none")]
    pub host: Option<Vec<String>>,
}

/// mKCP settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct KcpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tti: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_capacity: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_capacity: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

/// WebSocket and HTTPUpgrade settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct WsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// gRPC settings. The timeout keys are snake_case on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GrpcSettings {
    #[serde(rename = "serviceName", skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(rename = "multiMode", skip_serializing_if = "Option::is_none")]
    pub multi_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_windows_size: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit_without_stream: Option<bool>,
}

/// HTTP/2 settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// XHTTP and SplitHTTP settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct XhttpSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// QUIC settings (inbound only)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct QuicSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<HeaderType>,
}

// ============================================================================
// Security Variants
// ============================================================================

/// Security layer; TLS and REALITY settings can never coexist
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SecuritySettings {
    #[default]
    None,
    Tls(Option<TlsSettings>),
    Reality(Option<RealitySettings>),
}

impl SecuritySettings {
    pub fn security(&self) -> Security {
        match self {
            SecuritySettings::None => Security::None,
            SecuritySettings::Tls(_) => Security::Tls,
            SecuritySettings::Reality(_) => Security::Reality,
        }
    }
}

/// `tlsSettings`; client fields on outbounds, certificate fields on inbounds
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpn: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_peer_cert_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ech_config_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_unknown_sni: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<Vec<Certificate>>,
}

/// Certificate/key file pair of a TLS inbound
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Certificate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

/// `realitySettings`; client fields on outbounds, server fields on inbounds
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RealitySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
    #[serde(rename = "spiderX", skip_serializing_if = "Option::is_none")]
    pub spider_x: Option<String>,
    #[serde(rename = "mldsa65Verify", skip_serializing_if = "Option::is_none")]
    pub mldsa65_verify: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xver: Option<NumOrStr>,
}

// ============================================================================
// Socket Options, Mux, Sniffing
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Sockopt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialer_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_fast_open: Option<bool>,
    /// SO_MARK
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_proxy_protocol: Option<bool>,
}

/// Outbound connection multiplexing
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Mux {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<NumOrStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xudp_concurrency: Option<NumOrStr>,
    #[serde(rename = "xudpProxyUDP443", skip_serializing_if = "Option::is_none")]
    pub xudp_proxy_udp443: Option<String>,
}

/// Inbound traffic sniffing
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Sniffing {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_override: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_only: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_stream_serializes_empty() {
        let stream = StreamSettings::default();
        assert_eq!(serde_json::to_value(&stream).unwrap(), json!({}));
    }

    #[test]
    fn test_explicit_defaults_are_written() {
        let stream = StreamSettings {
            explicit_network: true,
            explicit_security: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&stream).unwrap(),
            json!({"network": "tcp", "security": "none"})
        );
    }

    #[test]
    fn test_transport_key_matches_network() {
        let stream = StreamSettings {
            transport: TransportSettings::HttpUpgrade(Some(WsSettings {
                path: Some("/up".into()),
                host: None,
            })),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&stream).unwrap(),
            json!({"network": "httpupgrade", "httpupgradeSettings": {"path": "/up"}})
        );
    }

    #[test]
    fn test_reality_block_only_under_reality() {
        let stream = StreamSettings {
            security: SecuritySettings::Reality(Some(RealitySettings {
                public_key: Some("pbk".into()),
                ..Default::default()
            })),
            ..Default::default()
        };
        let value = serde_json::to_value(&stream).unwrap();
        assert_eq!(value["security"], "reality");
        assert_eq!(value["realitySettings"]["publicKey"], "pbk");
        assert!(value.get("tlsSettings").is_none());
    }

    #[test]
    fn test_passthrough_never_overrides_managed_keys() {
        let mut extra = Map::new();
        extra.insert("network".into(), json!("quic"));
        extra.insert("finalmask".into(), json!({"x": 1}));
        let stream = StreamSettings {
            extra,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&stream).unwrap(),
            json!({"finalmask": {"x": 1}})
        );
    }

    #[test]
    fn test_grpc_snake_case_keys() {
        let grpc = GrpcSettings {
            service_name: Some("svc".into()),
            idle_timeout: Some(NumOrStr::Num(60)),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&grpc).unwrap(),
            json!({"serviceName": "svc", "idle_timeout": 60})
        );
    }

    #[test]
    fn test_raw_naming_of_tcp() {
        let stream = StreamSettings {
            transport: TransportSettings::Tcp(Some(TcpSettings {
                header: Some(TcpHeaderSettings {
                    kind: Some("none".into()),
                    request: None,
                }),
            })),
            explicit_network: true,
            raw_network_name: true,
            raw_settings_key: true,
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&stream).unwrap(),
            json!({"network": "raw", "rawSettings": {"header": {"type": "none"}}})
        );
    }
}
