//! Canonical typed entities.
//!
//! `Outbound` and `Inbound` serialize to the proxy core's JSON shape. The
//! protocol is never stored separately: it is read off the settings variant,
//! so an entity cannot carry settings for a protocol other than its own.

pub mod defaults;
pub mod settings;
pub mod stream;
pub mod value;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::catalog::{Direction, Protocol};
use settings::{InboundSettings, OutboundSettings};
use stream::{Mux, Sniffing, StreamSettings};
use value::NumOrStr;

/// Root keys of an outbound owned by the model
pub const OUTBOUND_KEYS: &[&str] = &["tag", "protocol", "settings", "streamSettings", "mux"];

/// Root keys of an inbound owned by the model
pub const INBOUND_KEYS: &[&str] = &[
    "tag",
    "listen",
    "port",
    "protocol",
    "settings",
    "streamSettings",
    "sniffing",
];

/// Keys of `settings` owned by the model for one protocol and direction.
///
/// Outbounds of the proxy protocols also own the older `vnext` / `servers`
/// shapes, which are read on projection and rewritten in the flat shape.
pub fn settings_keys(protocol: Protocol, direction: Direction) -> &'static [&'static str] {
    match (direction, protocol) {
        (Direction::Outbound, Protocol::VMess) => {
            &["address", "port", "id", "security", "vnext", "servers"]
        }
        (Direction::Outbound, Protocol::VLess) => {
            &["address", "port", "id", "encryption", "flow", "vnext", "servers"]
        }
        (Direction::Outbound, Protocol::Trojan) => &["address", "port", "password", "vnext", "servers"],
        (Direction::Outbound, Protocol::Shadowsocks) => &[
            "address", "port", "method", "password", "uot", "ivCheck", "vnext", "servers",
        ],
        (Direction::Outbound, Protocol::Socks | Protocol::Http) => {
            &["address", "port", "user", "pass", "vnext", "servers"]
        }
        (Direction::Outbound, Protocol::Freedom) => &["domainStrategy", "redirect"],
        (Direction::Outbound, Protocol::Blackhole) => &["response"],
        (Direction::Outbound, Protocol::Dns) => &["network", "address", "port", "nonIPQuery"],
        (Direction::Outbound, Protocol::WireGuard) => &[
            "secretKey",
            "address",
            "peers",
            "mtu",
            "workers",
            "reserved",
            "domainStrategy",
            "noKernelTun",
        ],
        (Direction::Inbound, Protocol::VMess | Protocol::VLess | Protocol::Trojan) => {
            &["clients", "decryption"]
        }
        (Direction::Inbound, Protocol::Shadowsocks) => &["method", "password", "network"],
        (Direction::Inbound, Protocol::Socks) => &["auth", "udp", "accounts"],
        (Direction::Inbound, Protocol::Http) => &["accounts"],
        (Direction::Inbound, Protocol::WireGuard) => &["secretKey", "peers", "mtu"],
        (Direction::Inbound, Protocol::Freedom | Protocol::Blackhole | Protocol::Dns) => &[],
    }
}

/// Protocol-specific parts of an entity whose protocol is outside the
/// catalog, emitted exactly as the source wrote them
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Foreign {
    pub protocol: String,
    pub settings: Option<Map<String, Value>>,
    pub stream: Option<Map<String, Value>>,
}

impl Foreign {
    fn serialize_into<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("protocol", &self.protocol)?;
        if let Some(settings) = &self.settings {
            map.serialize_entry("settings", settings)?;
        }
        if let Some(stream) = &self.stream {
            map.serialize_entry("streamSettings", stream)?;
        }
        Ok(())
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One egress connection definition
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub tag: String,
    pub settings: OutboundSettings,
    /// Unknown `settings` keys carried over from the source
    pub settings_extra: Map<String, Value>,
    pub stream: Option<StreamSettings>,
    pub mux: Option<Mux>,
    /// Unknown root keys carried over from the source
    pub extra: Map<String, Value>,
    /// Set when the source protocol is not in the catalog; replaces
    /// `settings` and `stream` on output
    pub foreign: Option<Foreign>,
}

impl Outbound {
    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    /// Canonical JSON of this outbound
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for Outbound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.tag.is_empty() {
            map.serialize_entry("tag", &self.tag)?;
        }
        if let Some(foreign) = &self.foreign {
            foreign.serialize_into(&mut map)?;
        } else {
            map.serialize_entry("protocol", self.protocol().wire_name())?;
            map.serialize_entry(
                "settings",
                &WithExtra {
                    inner: &self.settings,
                    extra: &self.settings_extra,
                },
            )?;
            if let Some(stream) = &self.stream {
                map.serialize_entry("streamSettings", stream)?;
            }
        }
        if let Some(mux) = &self.mux {
            map.serialize_entry("mux", mux)?;
        }
        serialize_extra(&mut map, &self.extra, OUTBOUND_KEYS)?;
        map.end()
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// One ingress (listener) definition
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub tag: String,
    pub listen: Option<String>,
    pub port: Option<NumOrStr>,
    pub settings: InboundSettings,
    pub settings_extra: Map<String, Value>,
    pub stream: Option<StreamSettings>,
    pub sniffing: Option<Sniffing>,
    pub extra: Map<String, Value>,
    pub foreign: Option<Foreign>,
}

impl Inbound {
    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    /// Canonical JSON of this inbound
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for Inbound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.tag.is_empty() {
            map.serialize_entry("tag", &self.tag)?;
        }
        if let Some(listen) = &self.listen {
            map.serialize_entry("listen", listen)?;
        }
        if let Some(port) = &self.port {
            map.serialize_entry("port", port)?;
        }
        if let Some(foreign) = &self.foreign {
            foreign.serialize_into(&mut map)?;
        } else {
            map.serialize_entry("protocol", self.protocol().wire_name())?;
            map.serialize_entry(
                "settings",
                &WithExtra {
                    inner: &self.settings,
                    extra: &self.settings_extra,
                },
            )?;
            if let Some(stream) = &self.stream {
                map.serialize_entry("streamSettings", stream)?;
            }
        }
        if let Some(sniffing) = &self.sniffing {
            map.serialize_entry("sniffing", sniffing)?;
        }
        serialize_extra(&mut map, &self.extra, INBOUND_KEYS)?;
        map.end()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A settings variant followed by its passthrough keys.
///
/// Callers filter `extra` against `settings_keys` before building.
#[derive(Serialize)]
struct WithExtra<'a, T: Serialize> {
    #[serde(flatten)]
    inner: &'a T,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

fn serialize_extra<M: SerializeMap>(
    map: &mut M,
    extra: &Map<String, Value>,
    managed: &[&str],
) -> Result<(), M::Error> {
    for (key, value) in extra {
        if !managed.contains(&key.as_str()) {
            map.serialize_entry(key, value)?;
        }
    }
    Ok(())
}

/// Copies the keys of `source` that the model does not manage
pub fn unmanaged_keys(source: &Map<String, Value>, managed: &[&str]) -> Map<String, Value> {
    source
        .iter()
        .filter(|(key, _)| !managed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::settings::{FreedomSettings, VmessSettings};
    use serde_json::json;

    #[test]
    fn test_outbound_settings_always_present() {
        let outbound = Outbound {
            tag: "direct".into(),
            settings: OutboundSettings::Freedom(FreedomSettings::default()),
            settings_extra: Map::new(),
            stream: None,
            mux: None,
            extra: Map::new(),
            foreign: None,
        };
        assert_eq!(
            outbound.to_value().unwrap(),
            json!({"tag": "direct", "protocol": "freedom", "settings": {}})
        );
    }

    #[test]
    fn test_outbound_passthrough_keys() {
        let mut settings_extra = Map::new();
        settings_extra.insert("level".into(), json!(1));
        let mut extra = Map::new();
        extra.insert("sendThrough".into(), json!("0.0.0.0"));
        extra.insert("protocol".into(), json!("trojan"));
        let outbound = Outbound {
            tag: "a".into(),
            settings: OutboundSettings::VMess(VmessSettings {
                id: Some("uuid".into()),
                ..Default::default()
            }),
            settings_extra,
            stream: None,
            mux: None,
            extra,
            foreign: None,
        };
        let value = outbound.to_value().unwrap();
        assert_eq!(value["protocol"], "vmess");
        assert_eq!(value["settings"], json!({"id": "uuid", "level": 1}));
        assert_eq!(value["sendThrough"], "0.0.0.0");
    }

    #[test]
    fn test_unmanaged_keys_filter() {
        let source = json!({"tag": "x", "sendThrough": "1.2.3.4", "mux": {}});
        let extra = unmanaged_keys(source.as_object().unwrap(), OUTBOUND_KEYS);
        assert_eq!(Value::Object(extra), json!({"sendThrough": "1.2.3.4"}));
    }

    #[test]
    fn test_inbound_passive_settings() {
        let inbound = Inbound {
            tag: "in".into(),
            listen: None,
            port: Some(NumOrStr::Num(1080)),
            settings: InboundSettings::Passive(Protocol::Dns),
            settings_extra: Map::new(),
            stream: None,
            sniffing: None,
            extra: Map::new(),
            foreign: None,
        };
        assert_eq!(
            inbound.to_value().unwrap(),
            json!({"tag": "in", "port": 1080, "protocol": "dns", "settings": {}})
        );
    }

    #[test]
    fn test_foreign_outbound_written_as_is() {
        let outbound = Outbound {
            tag: "h2".into(),
            settings: OutboundSettings::VLess(Default::default()),
            settings_extra: Map::new(),
            stream: None,
            mux: None,
            extra: Map::new(),
            foreign: Some(Foreign {
                protocol: "hysteria2".into(),
                settings: json!({"server": "x", "password": "p"}).as_object().cloned(),
                stream: None,
            }),
        };
        assert_eq!(
            outbound.to_value().unwrap(),
            json!({
                "tag": "h2",
                "protocol": "hysteria2",
                "settings": {"server": "x", "password": "p"}
            })
        );
    }

    #[test]
    fn test_settings_keys_follow_protocol() {
        let trojan = settings_keys(Protocol::Trojan, Direction::Outbound);
        assert!(trojan.contains(&"password"));
        assert!(!trojan.contains(&"flow"));
        assert!(settings_keys(Protocol::VLess, Direction::Outbound).contains(&"flow"));
        assert!(settings_keys(Protocol::Dns, Direction::Inbound).is_empty());
    }
}
