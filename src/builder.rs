//! Canonical model builder: form state → canonical entity.
//!
//! The builder never fails. Every form, however incomplete, yields a valid
//! entity: only the settings variant of the selected protocol is filled,
//! capability-refused blocks are dropped, malformed numbers are omitted and
//! defaulted fields are suppressed unless the original entity wrote them.

pub mod provenance;
mod stream;

use serde_json::Value;
use tracing::debug;

use crate::catalog::{can_enable_flow, can_enable_mux, has_stream, Direction, Protocol, TcpHeader};
use crate::form::{AccountForm, ClientForm, InboundForm, OutboundForm, WireGuardPeerForm};
use crate::model::settings::{
    Account, BlackholeResponse, BlackholeSettings, Client, ClientSettings, DnsSettings,
    FreedomSettings, HttpInboundSettings, InboundSettings, OutboundSettings, ProxyServerSettings,
    ShadowsocksInboundSettings, ShadowsocksSettings, SocksInboundSettings, TrojanSettings,
    VlessSettings, VmessSettings, WireGuardInboundSettings, WireGuardPeer, WireGuardSettings,
};
use crate::model::value::{coerce_number, split_list, NumOrStr};
use crate::model::{
    defaults, settings_keys, unmanaged_keys, Inbound, Outbound, INBOUND_KEYS, OUTBOUND_KEYS,
};

pub use provenance::{FieldPresence, Provenance};
use provenance::{list, required};
use stream::{build_mux, build_sniffing, build_stream, effective_network};

// ============================================================================
// Outbound
// ============================================================================

/// Builds an outbound from form state.
///
/// `original` is the raw JSON of the entity being edited, if any; it only
/// decides whether default-valued fields are kept.
pub fn build_outbound(form: &OutboundForm, original: Option<&Value>) -> Outbound {
    let root = Provenance::new(original);
    let protocol = form.protocol;
    let foreign = form.extra.foreign(protocol);
    if let Some(foreign) = &foreign {
        debug!(protocol = %foreign.protocol, "Unknown protocol, keeping its settings as written");
    }

    let settings = build_outbound_settings(form, &settings_provenance(&root));

    let stream = if foreign.is_none() && has_stream(protocol, Direction::Outbound) {
        build_stream(
            &form.stream,
            &form.extra,
            protocol,
            Direction::Outbound,
            &root.child("streamSettings"),
        )
    } else {
        None
    };

    let mux = if can_enable_mux(protocol) {
        build_mux(
            form.mux_enabled,
            &form.mux_concurrency,
            &form.mux_xudp_concurrency,
            &form.mux_xudp_proxy_udp443,
            &root.child("mux"),
        )
    } else {
        if form.mux_enabled {
            debug!(%protocol, "Mux not available, dropping");
        }
        None
    };

    Outbound {
        tag: form.tag.trim().to_string(),
        settings,
        settings_extra: unmanaged_keys(
            &form.extra.settings,
            settings_keys(protocol, Direction::Outbound),
        ),
        stream,
        mux,
        extra: unmanaged_keys(&form.extra.root, OUTBOUND_KEYS),
        foreign,
    }
}

/// `settings` plus the older `vnext[0]` / `servers[0]` layouts
fn settings_provenance<'a>(root: &Provenance<'a>) -> Provenance<'a> {
    let settings = root.child("settings");
    let vnext = settings.child("vnext").index(0);
    let servers = settings.child("servers").index(0);
    settings
        .clone()
        .alongside(vnext.child("users").index(0))
        .alongside(vnext)
        .alongside(servers.child("users").index(0))
        .alongside(servers)
}

fn build_outbound_settings(form: &OutboundForm, p: &Provenance<'_>) -> OutboundSettings {
    let address = required(&form.address);
    let port = coerce_number(&form.port);

    match form.protocol {
        Protocol::VMess => OutboundSettings::VMess(VmessSettings {
            address,
            port,
            id: required(&form.id),
            security: p.text("security", &form.vmess_security, defaults::VMESS_SECURITY),
        }),
        Protocol::VLess => {
            let network = effective_network(Protocol::VLess, Direction::Outbound, form.stream.network);
            let header = TcpHeader::from_wire(&form.stream.tcp_header_type);
            let flow = if can_enable_flow(Protocol::VLess, network, header) {
                p.text("flow", &form.flow, "")
            } else {
                if !form.flow.trim().is_empty() {
                    debug!(%network, "Flow needs raw tcp, dropping");
                }
                None
            };
            OutboundSettings::VLess(VlessSettings {
                address,
                port,
                id: required(&form.id),
                encryption: required(&form.encryption),
                flow,
            })
        }
        Protocol::Trojan => OutboundSettings::Trojan(TrojanSettings {
            address,
            port,
            password: required(&form.password),
        }),
        Protocol::Shadowsocks => OutboundSettings::Shadowsocks(ShadowsocksSettings {
            address,
            port,
            method: p.text("method", &form.method, defaults::SHADOWSOCKS_METHOD),
            password: required(&form.password),
            uot: p.flag("uot", form.uot, false),
            iv_check: p.flag("ivCheck", form.iv_check, false),
        }),
        Protocol::Socks | Protocol::Http => {
            let server = ProxyServerSettings {
                address,
                port,
                user: p.text("user", &form.user, ""),
                pass: p.text("pass", &form.pass, ""),
            };
            if form.protocol == Protocol::Socks {
                OutboundSettings::Socks(server)
            } else {
                OutboundSettings::Http(server)
            }
        }
        Protocol::Freedom => OutboundSettings::Freedom(FreedomSettings {
            domain_strategy: p.text(
                "domainStrategy",
                &form.domain_strategy,
                defaults::FREEDOM_DOMAIN_STRATEGY,
            ),
            redirect: p.text("redirect", &form.redirect, ""),
        }),
        Protocol::Blackhole => OutboundSettings::Blackhole(BlackholeSettings {
            response: p
                .child("response")
                .text("type", &form.response_type, defaults::BLACKHOLE_RESPONSE)
                .map(|kind| BlackholeResponse { kind }),
        }),
        Protocol::Dns => OutboundSettings::Dns(DnsSettings {
            network: p.text("network", &form.dns_network, ""),
            address: p.text("address", &form.dns_address, ""),
            port: p.number("port", &form.dns_port, None),
            non_ip_query: p.text("nonIPQuery", &form.non_ip_query, defaults::DNS_NON_IP_QUERY),
        }),
        Protocol::WireGuard => OutboundSettings::WireGuard(WireGuardSettings {
            secret_key: required(&form.secret_key),
            address: list(&form.wg_address),
            peers: build_peers(&form.peers, &p.child("peers")),
            mtu: p.number("mtu", &form.wg_mtu, Some(defaults::WIREGUARD_MTU)),
            workers: p.number("workers", &form.workers, Some(defaults::WIREGUARD_WORKERS)),
            reserved: build_reserved(&form.reserved),
            domain_strategy: p.text(
                "domainStrategy",
                &form.wg_domain_strategy,
                defaults::WIREGUARD_DOMAIN_STRATEGY,
            ),
            no_kernel_tun: p.flag("noKernelTun", form.no_kernel_tun, false),
        }),
    }
}

fn build_peers(peers: &[WireGuardPeerForm], p: &Provenance<'_>) -> Option<Vec<WireGuardPeer>> {
    let peers: Vec<WireGuardPeer> = peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            let peer_p = p.index(i);
            WireGuardPeer {
                public_key: required(&peer.public_key),
                pre_shared_key: peer_p.text("preSharedKey", &peer.pre_shared_key, ""),
                endpoint: required(&peer.endpoint),
                allowed_ips: list(&peer.allowed_ips),
                keep_alive: peer_p.number(
                    "keepAlive",
                    &peer.keep_alive,
                    Some(defaults::WIREGUARD_KEEP_ALIVE),
                ),
            }
        })
        .filter(|peer| *peer != WireGuardPeer::default())
        .collect();
    (!peers.is_empty()).then_some(peers)
}

/// Reserved bytes; malformed entries are dropped one by one
fn build_reserved(raw: &str) -> Option<Vec<NumOrStr>> {
    let bytes: Vec<_> = split_list(raw)
        .iter()
        .filter_map(|item| coerce_number(item))
        .collect();
    (!bytes.is_empty()).then_some(bytes)
}

// ============================================================================
// Inbound
// ============================================================================

/// Builds an inbound from form state
pub fn build_inbound(form: &InboundForm, original: Option<&Value>) -> Inbound {
    let root = Provenance::new(original);
    let protocol = form.protocol;
    let foreign = form.extra.foreign(protocol);
    if let Some(foreign) = &foreign {
        debug!(protocol = %foreign.protocol, "Unknown protocol, keeping its settings as written");
    }

    let settings = build_inbound_settings(form, &root.child("settings"));

    let stream = if foreign.is_none() && has_stream(protocol, Direction::Inbound) {
        build_stream(
            &form.stream,
            &form.extra,
            protocol,
            Direction::Inbound,
            &root.child("streamSettings"),
        )
    } else {
        None
    };

    Inbound {
        tag: form.tag.trim().to_string(),
        listen: root.text("listen", &form.listen, ""),
        port: coerce_number(&form.port),
        settings,
        settings_extra: unmanaged_keys(&form.extra.settings, settings_keys(protocol, Direction::Inbound)),
        stream,
        sniffing: build_sniffing(
            form.sniffing_enabled,
            &form.dest_override,
            form.route_only,
            form.metadata_only,
            &root.child("sniffing"),
        ),
        extra: unmanaged_keys(&form.extra.root, INBOUND_KEYS),
        foreign,
    }
}

fn build_inbound_settings(form: &InboundForm, p: &Provenance<'_>) -> InboundSettings {
    match form.protocol {
        Protocol::VMess => InboundSettings::VMess(ClientSettings {
            clients: build_clients(&form.clients, &p.child("clients"), ClientKind::Id),
            decryption: None,
        }),
        Protocol::VLess => {
            let network = effective_network(Protocol::VLess, Direction::Inbound, form.stream.network);
            let header = TcpHeader::from_wire(&form.stream.tcp_header_type);
            let kind = if can_enable_flow(Protocol::VLess, network, header) {
                ClientKind::IdWithFlow
            } else {
                ClientKind::Id
            };
            InboundSettings::VLess(ClientSettings {
                clients: build_clients(&form.clients, &p.child("clients"), kind),
                decryption: required(&form.decryption),
            })
        }
        Protocol::Trojan => InboundSettings::Trojan(ClientSettings {
            clients: build_clients(&form.clients, &p.child("clients"), ClientKind::Password),
            decryption: None,
        }),
        Protocol::Shadowsocks => InboundSettings::Shadowsocks(ShadowsocksInboundSettings {
            method: required(&form.method),
            password: required(&form.password),
            network: p.text("network", &form.ss_network, defaults::SHADOWSOCKS_INBOUND_NETWORK),
        }),
        Protocol::Socks => InboundSettings::Socks(SocksInboundSettings {
            auth: p.text("auth", &form.auth, defaults::SOCKS_AUTH),
            udp: p.flag("udp", form.udp, false),
            accounts: build_accounts(&form.accounts),
        }),
        Protocol::Http => InboundSettings::Http(HttpInboundSettings {
            accounts: build_accounts(&form.accounts),
        }),
        Protocol::WireGuard => InboundSettings::WireGuard(WireGuardInboundSettings {
            secret_key: required(&form.secret_key),
            peers: build_peers(&form.peers, &p.child("peers")),
            mtu: p.number("mtu", &form.wg_mtu, Some(defaults::WIREGUARD_MTU)),
        }),
        passive @ (Protocol::Freedom | Protocol::Blackhole | Protocol::Dns) => {
            InboundSettings::Passive(passive)
        }
    }
}

/// Which credential an inbound client carries
#[derive(Clone, Copy)]
enum ClientKind {
    Id,
    IdWithFlow,
    Password,
}

fn build_clients(clients: &[ClientForm], p: &Provenance<'_>, kind: ClientKind) -> Option<Vec<Client>> {
    let clients: Vec<Client> = clients
        .iter()
        .enumerate()
        .map(|(i, client)| Client {
            id: match kind {
                ClientKind::Id | ClientKind::IdWithFlow => required(&client.id),
                ClientKind::Password => None,
            },
            password: match kind {
                ClientKind::Password => required(&client.password),
                _ => None,
            },
            flow: match kind {
                ClientKind::IdWithFlow => p.index(i).text("flow", &client.flow, ""),
                _ => None,
            },
            email: required(&client.email),
        })
        .filter(|client| *client != Client::default())
        .collect();
    (!clients.is_empty()).then_some(clients)
}

fn build_accounts(accounts: &[AccountForm]) -> Option<Vec<Account>> {
    let accounts: Vec<Account> = accounts
        .iter()
        .filter(|account| !account.user.trim().is_empty())
        .map(|account| Account {
            user: account.user.trim().to_string(),
            pass: account.pass.clone(),
        })
        .collect();
    (!accounts.is_empty()).then_some(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Security, Transport};
    use crate::form::{CertificateForm, StreamForm};
    use serde_json::json;

    fn vless_form() -> OutboundForm {
        OutboundForm {
            tag: "proxy".into(),
            address: "example.com".into(),
            port: "443".into(),
            id: "b831381d-6324-4d53-ad4f-8cda48b30811".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_vless_is_minimal() {
        let outbound = build_outbound(&vless_form(), None);
        assert_eq!(
            outbound.to_value().unwrap(),
            json!({
                "tag": "proxy",
                "protocol": "vless",
                "settings": {
                    "address": "example.com",
                    "port": 443,
                    "id": "b831381d-6324-4d53-ad4f-8cda48b30811",
                    "encryption": "none"
                }
            })
        );
    }

    #[test]
    fn test_vless_flow_emitted_when_set() {
        let mut form = vless_form();
        form.flow = "xtls-rprx-vision".into();
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(value["settings"]["flow"], "xtls-rprx-vision");
    }

    #[test]
    fn test_vless_flow_dropped_on_ws() {
        let mut form = vless_form();
        form.flow = "xtls-rprx-vision".into();
        form.stream.network = Transport::Ws;
        let value = build_outbound(&form, None).to_value().unwrap();
        assert!(value["settings"].get("flow").is_none());
        assert_eq!(value["streamSettings"]["network"], "ws");
    }

    #[test]
    fn test_reality_refused_on_ws() {
        let mut form = vless_form();
        form.stream.network = Transport::Ws;
        form.stream.security = Security::Reality;
        form.stream.public_key = "pbk".into();
        let value = build_outbound(&form, None).to_value().unwrap();
        assert!(value["streamSettings"].get("security").is_none());
        assert!(value["streamSettings"].get("realitySettings").is_none());
    }

    #[test]
    fn test_tls_explicit_default_preserved() {
        let original = json!({
            "tag": "proxy",
            "protocol": "vless",
            "settings": {"address": "example.com", "port": 443, "id": "x", "encryption": "none"},
            "streamSettings": {
                "security": "tls",
                "tlsSettings": {"serverName": "example.com", "allowInsecure": false}
            }
        });
        let mut form = vless_form();
        form.stream.security = Security::Tls;
        form.stream.server_name = "example.com".into();
        let value = build_outbound(&form, Some(&original)).to_value().unwrap();
        assert_eq!(
            value["streamSettings"]["tlsSettings"],
            json!({"serverName": "example.com", "allowInsecure": false})
        );

        let fresh = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(
            fresh["streamSettings"]["tlsSettings"],
            json!({"serverName": "example.com"})
        );
    }

    #[test]
    fn test_freedom_never_has_stream_or_mux() {
        let form = OutboundForm {
            tag: "direct".into(),
            protocol: Protocol::Freedom,
            mux_enabled: true,
            stream: StreamForm {
                network: Transport::Ws,
                security: Security::Tls,
                ..Default::default()
            },
            ..Default::default()
        };
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(
            value,
            json!({"tag": "direct", "protocol": "freedom", "settings": {}})
        );
    }

    #[test]
    fn test_wireguard_defaults_suppressed() {
        let form = OutboundForm {
            tag: "wg".into(),
            protocol: Protocol::WireGuard,
            secret_key: "secret".into(),
            wg_address: "10.0.0.2/32".into(),
            reserved: "1, 2, x, 3".into(),
            peers: vec![WireGuardPeerForm {
                public_key: "peer".into(),
                endpoint: "1.2.3.4:51820".into(),
                allowed_ips: "0.0.0.0/0, ::/0".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(
            value["settings"],
            json!({
                "secretKey": "secret",
                "address": ["10.0.0.2/32"],
                "peers": [{
                    "publicKey": "peer",
                    "endpoint": "1.2.3.4:51820",
                    "allowedIPs": ["0.0.0.0/0", "::/0"]
                }],
                "reserved": [1, 2, 3]
            })
        );
        assert!(value.get("streamSettings").is_none());
    }

    #[test]
    fn test_malformed_port_omitted_placeholder_kept() {
        let mut form = vless_form();
        form.port = "44x3".into();
        let value = build_outbound(&form, None).to_value().unwrap();
        assert!(value["settings"].get("port").is_none());

        form.port = "${PORT}".into();
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(value["settings"]["port"], "${PORT}");
    }

    #[test]
    fn test_mux_disabled_kept_when_original_wrote_it() {
        let original = json!({"protocol": "vless", "settings": {}, "mux": {"enabled": false}});
        let value = build_outbound(&vless_form(), Some(&original)).to_value().unwrap();
        assert_eq!(value["mux"], json!({"enabled": false}));

        let fresh = build_outbound(&vless_form(), None).to_value().unwrap();
        assert!(fresh.get("mux").is_none());
    }

    #[test]
    fn test_mux_enabled_suppresses_defaults() {
        let mut form = vless_form();
        form.mux_enabled = true;
        form.mux_concurrency = "-1".into();
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(value["mux"], json!({"enabled": true, "concurrency": -1}));
    }

    #[test]
    fn test_legacy_vnext_counts_as_provenance() {
        let original = json!({
            "protocol": "vmess",
            "settings": {"vnext": [{"address": "a.com", "port": 443, "users": [{"id": "u", "security": "auto"}]}]}
        });
        let form = OutboundForm {
            protocol: Protocol::VMess,
            address: "a.com".into(),
            port: "443".into(),
            id: "u".into(),
            ..Default::default()
        };
        let value = build_outbound(&form, Some(&original)).to_value().unwrap();
        assert_eq!(
            value["settings"],
            json!({"address": "a.com", "port": 443, "id": "u", "security": "auto"})
        );
    }

    #[test]
    fn test_inbound_vless_reality() {
        let form = InboundForm {
            tag: "in".into(),
            port: "443".into(),
            clients: vec![ClientForm {
                id: "uuid".into(),
                flow: "xtls-rprx-vision".into(),
                ..Default::default()
            }],
            stream: StreamForm {
                security: Security::Reality,
                reality_target: "example.com:443".into(),
                reality_server_names: "example.com".into(),
                private_key: "pk".into(),
                short_ids: "ab,cd".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let value = build_inbound(&form, None).to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "tag": "in",
                "port": 443,
                "protocol": "vless",
                "settings": {
                    "clients": [{"id": "uuid", "flow": "xtls-rprx-vision"}],
                    "decryption": "none"
                },
                "streamSettings": {
                    "security": "reality",
                    "realitySettings": {
                        "target": "example.com:443",
                        "serverNames": ["example.com"],
                        "privateKey": "pk",
                        "shortIds": ["ab", "cd"]
                    }
                }
            })
        );
    }

    #[test]
    fn test_inbound_tls_certificates_and_sniffing() {
        let form = InboundForm {
            protocol: Protocol::Trojan,
            port: "8443".into(),
            clients: vec![ClientForm {
                password: "secret".into(),
                ..Default::default()
            }],
            stream: StreamForm {
                security: Security::Tls,
                certificates: vec![
                    CertificateForm {
                        certificate_file: "/etc/cert.pem".into(),
                        key_file: "/etc/key.pem".into(),
                    },
                    CertificateForm::default(),
                ],
                ..Default::default()
            },
            sniffing_enabled: true,
            dest_override: "http,tls".into(),
            ..Default::default()
        };
        let value = build_inbound(&form, None).to_value().unwrap();
        assert_eq!(
            value["streamSettings"]["tlsSettings"],
            json!({"certificates": [{"certificateFile": "/etc/cert.pem", "keyFile": "/etc/key.pem"}]})
        );
        assert_eq!(
            value["sniffing"],
            json!({"enabled": true, "destOverride": ["http", "tls"]})
        );
        assert_eq!(value["settings"], json!({"clients": [{"password": "secret"}]}));
    }

    #[test]
    fn test_inbound_passive_protocol() {
        let form = InboundForm {
            protocol: Protocol::Blackhole,
            port: "53".into(),
            ..Default::default()
        };
        let value = build_inbound(&form, None).to_value().unwrap();
        assert_eq!(value, json!({"port": 53, "protocol": "blackhole", "settings": {}}));
    }

    #[test]
    fn test_passthrough_reemitted() {
        let mut form = vless_form();
        form.extra.root.insert("sendThrough".into(), json!("10.0.0.1"));
        form.extra.settings.insert("level".into(), json!(0));
        form.extra.settings.insert("id".into(), json!("hijack"));
        let value = build_outbound(&form, None).to_value().unwrap();
        assert_eq!(value["sendThrough"], "10.0.0.1");
        assert_eq!(value["settings"]["level"], 0);
        assert_eq!(value["settings"]["id"], "b831381d-6324-4d53-ad4f-8cda48b30811");
    }
}
