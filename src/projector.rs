//! Form projector: canonical (or foreign) JSON → form state.
//!
//! Projection is lenient. Missing keys leave the template value in place,
//! unknown keys go to the passthrough, older layouts (`vnext`, `servers`,
//! `dest`, `verifyPeerCertInNames`, header lists) are read alongside the
//! current ones, and nothing here ever fails.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog::{Direction, Protocol, Security, Transport};
use crate::form::{
    AccountForm, CertificateForm, ClientForm, InboundForm, OutboundForm, Passthrough, StreamForm,
    WireGuardPeerForm,
};
use crate::model::stream::STREAM_KEYS;
use crate::model::value::{
    bool_at, first_object_at, join_list, list_at, list_of, object_at, text_at, text_of,
};
use crate::model::{settings_keys, unmanaged_keys, INBOUND_KEYS, OUTBOUND_KEYS};

/// Overwrites `target` when the source had a value
fn assign(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn assign_bool(target: &mut bool, value: Option<bool>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Assigns a list field; absent or empty sources keep the template
fn assign_list(target: &mut String, items: Vec<String>) {
    if !items.is_empty() {
        *target = join_list(&items);
    }
}

fn protocol_of(root: &Map<String, Value>) -> Protocol {
    root.get("protocol")
        .and_then(Value::as_str)
        .map(Protocol::from_wire_lenient)
        .unwrap_or_default()
}

/// Keeps protocol, settings and stream as written when the protocol is not
/// in the catalog
fn keep_foreign(extra: &mut Passthrough, root: &Map<String, Value>) {
    let Some(name) = root.get("protocol").and_then(Value::as_str) else {
        return;
    };
    if name.trim().is_empty() || Protocol::from_wire(name).is_some() {
        return;
    }
    extra.raw_protocol = Some(name.to_string());
    extra.raw_settings = object_at(root, "settings").cloned();
    extra.raw_stream = object_at(root, "streamSettings").cloned();
}

// ============================================================================
// Outbound
// ============================================================================

/// Projects an outbound onto a full form
pub fn project_outbound(value: &Value) -> OutboundForm {
    let Some(root) = value.as_object() else {
        debug!("Outbound is not an object, using template");
        return OutboundForm::default();
    };
    let empty = Map::new();
    let settings = object_at(root, "settings").unwrap_or(&empty);

    let mut form = OutboundForm::for_protocol(protocol_of(root));
    let managed = settings_keys(form.protocol, Direction::Outbound);
    let layers = SettingsLayers::new(settings, managed);
    assign(&mut form.tag, text_at(root, "tag"));
    project_outbound_settings(&mut form, settings, &layers);

    if let Some(stream) = object_at(root, "streamSettings") {
        project_stream(&mut form.stream, stream);
        form.extra.stream = unmanaged_keys(stream, STREAM_KEYS);
    }

    if let Some(mux) = object_at(root, "mux") {
        assign_bool(&mut form.mux_enabled, bool_at(mux, "enabled"));
        assign(&mut form.mux_concurrency, text_at(mux, "concurrency"));
        assign(&mut form.mux_xudp_concurrency, text_at(mux, "xudpConcurrency"));
        assign(&mut form.mux_xudp_proxy_udp443, text_at(mux, "xudpProxyUDP443"));
    }

    form.extra.root = unmanaged_keys(root, OUTBOUND_KEYS);
    form.extra.settings = layers.unmanaged(managed);
    keep_foreign(&mut form.extra, root);
    form
}

/// Settings keys looked up in the flat layout first, then `vnext[0]` /
/// `servers[0]`, then their `users[0]`
struct SettingsLayers<'a> {
    layers: Vec<&'a Map<String, Value>>,
}

impl<'a> SettingsLayers<'a> {
    /// Descends into `vnext` / `servers` only where the protocol owns them
    fn new(settings: &'a Map<String, Value>, managed: &[&str]) -> Self {
        let mut layers = vec![settings];
        for key in ["vnext", "servers"] {
            if !managed.contains(&key) {
                continue;
            }
            if let Some(server) = first_object_at(settings, key) {
                layers.push(server);
                if let Some(user) = first_object_at(server, "users") {
                    layers.push(user);
                }
            }
        }
        Self { layers }
    }

    /// Unmanaged keys of every layer, flattened; the flat layout wins, then
    /// the order of lookup
    fn unmanaged(&self, managed: &[&str]) -> Map<String, Value> {
        let mut extra = Map::new();
        for (depth, layer) in self.layers.iter().enumerate().rev() {
            for (key, value) in layer.iter() {
                let nested_users = depth > 0 && key == "users";
                if !nested_users && !managed.contains(&key.as_str()) {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }
        extra
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn text(&self, key: &str) -> Option<String> {
        text_of(self.get(key))
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.layers.iter().find_map(|layer| bool_at(layer, key))
    }
}

fn project_outbound_settings(
    form: &mut OutboundForm,
    settings: &Map<String, Value>,
    s: &SettingsLayers<'_>,
) {
    match form.protocol {
        Protocol::VMess
        | Protocol::VLess
        | Protocol::Trojan
        | Protocol::Shadowsocks
        | Protocol::Socks
        | Protocol::Http => {
            assign(&mut form.address, s.text("address"));
            assign(&mut form.port, s.text("port"));
            assign(&mut form.id, s.text("id"));
            assign(&mut form.vmess_security, s.text("security"));
            assign(&mut form.encryption, s.text("encryption"));
            assign(&mut form.flow, s.text("flow"));
            assign(&mut form.password, s.text("password"));
            assign(&mut form.method, s.text("method"));
            assign_bool(&mut form.uot, s.flag("uot"));
            assign_bool(&mut form.iv_check, s.flag("ivCheck"));
            assign(&mut form.user, s.text("user"));
            assign(&mut form.pass, s.text("pass"));
        }
        Protocol::Freedom => {
            assign(&mut form.domain_strategy, s.text("domainStrategy"));
            assign(&mut form.redirect, s.text("redirect"));
        }
        Protocol::Blackhole => {
            if let Some(response) = object_at(settings, "response") {
                assign(&mut form.response_type, text_at(response, "type"));
            }
        }
        Protocol::Dns => {
            assign(&mut form.dns_network, s.text("network"));
            assign(&mut form.dns_address, s.text("address"));
            assign(&mut form.dns_port, s.text("port"));
            assign(&mut form.non_ip_query, s.text("nonIPQuery"));
        }
        Protocol::WireGuard => {
            assign(&mut form.secret_key, s.text("secretKey"));
            assign_list(&mut form.wg_address, list_at(settings, "address"));
            assign(&mut form.wg_mtu, s.text("mtu"));
            assign(&mut form.workers, s.text("workers"));
            assign_list(&mut form.reserved, list_at(settings, "reserved"));
            assign(&mut form.wg_domain_strategy, s.text("domainStrategy"));
            assign_bool(&mut form.no_kernel_tun, s.flag("noKernelTun"));
            form.peers = project_peers(settings);
        }
    }
}

fn project_peers(settings: &Map<String, Value>) -> Vec<WireGuardPeerForm> {
    objects_at(settings, "peers")
        .map(|peer| {
            let mut form = WireGuardPeerForm::default();
            assign(&mut form.public_key, text_at(peer, "publicKey"));
            assign(&mut form.pre_shared_key, text_at(peer, "preSharedKey"));
            assign(&mut form.endpoint, text_at(peer, "endpoint"));
            assign_list(&mut form.allowed_ips, list_at(peer, "allowedIPs"));
            assign(&mut form.keep_alive, text_at(peer, "keepAlive"));
            form
        })
        .collect()
}

/// Object elements of an array; non-object elements are skipped
fn objects_at<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

// ============================================================================
// Stream
// ============================================================================

/// Host header in any of its shapes: `host` string or list, or
/// `headers.Host` string or list
fn host_of(obj: &Map<String, Value>) -> Vec<String> {
    let host = list_at(obj, "host");
    if !host.is_empty() {
        return host;
    }
    object_at(obj, "headers")
        .map(|headers| list_of(headers.get("Host").or_else(|| headers.get("host"))))
        .unwrap_or_default()
}

fn header_type_of(obj: &Map<String, Value>) -> Option<String> {
    object_at(obj, "header").and_then(|header| text_at(header, "type"))
}

fn project_stream(form: &mut StreamForm, stream: &Map<String, Value>) {
    if let Some(network) = text_at(stream, "network") {
        form.network = Transport::from_wire(&network).unwrap_or_else(|| {
            warn!(network = %network, "Unknown transport, falling back to tcp");
            Transport::Tcp
        });
    }
    if let Some(security) = text_at(stream, "security") {
        form.security = Security::from_wire(&security).unwrap_or_else(|| {
            warn!(security = %security, "Unknown security layer, ignoring");
            Security::None
        });
    }

    let transport = object_at(stream, form.network.settings_key())
        .or_else(|| match form.network {
            Transport::Tcp => object_at(stream, "rawSettings"),
            _ => None,
        });
    if let Some(transport) = transport {
        project_transport(form, transport);
    }

    match form.security {
        Security::Tls => {
            if let Some(tls) = object_at(stream, "tlsSettings") {
                project_tls(form, tls);
            }
        }
        Security::Reality => {
            if let Some(reality) = object_at(stream, "realitySettings") {
                project_reality(form, reality);
            }
        }
        Security::None => {}
    }

    if let Some(sockopt) = object_at(stream, "sockopt") {
        assign(&mut form.dialer_proxy, text_at(sockopt, "dialerProxy"));
        assign_bool(&mut form.tcp_fast_open, bool_at(sockopt, "tcpFastOpen"));
        assign(&mut form.mark, text_at(sockopt, "mark"));
        assign_bool(
            &mut form.accept_proxy_protocol,
            bool_at(sockopt, "acceptProxyProtocol"),
        );
    }
}

fn project_transport(form: &mut StreamForm, t: &Map<String, Value>) {
    match form.network {
        Transport::Tcp => {
            let Some(header) = object_at(t, "header") else {
                return;
            };
            assign(&mut form.tcp_header_type, text_at(header, "type"));
            if let Some(request) = object_at(header, "request") {
                assign_list(&mut form.tcp_path, list_at(request, "path"));
                assign_list(&mut form.tcp_host, host_of(request));
            }
        }
        Transport::Kcp => {
            assign(&mut form.kcp_mtu, text_at(t, "mtu"));
            assign(&mut form.kcp_tti, text_at(t, "tti"));
            assign(&mut form.kcp_uplink_capacity, text_at(t, "uplinkCapacity"));
            assign(&mut form.kcp_downlink_capacity, text_at(t, "downlinkCapacity"));
            assign_bool(&mut form.kcp_congestion, bool_at(t, "congestion"));
            assign(&mut form.kcp_header_type, header_type_of(t));
            assign(&mut form.kcp_seed, text_at(t, "seed"));
        }
        Transport::Ws
        | Transport::HttpUpgrade
        | Transport::Http
        | Transport::Xhttp
        | Transport::SplitHttp => {
            assign(&mut form.path, text_at(t, "path"));
            assign_list(&mut form.host, host_of(t));
            assign(&mut form.xhttp_mode, text_at(t, "mode"));
        }
        Transport::Grpc => {
            assign(&mut form.grpc_service_name, text_at(t, "serviceName"));
            assign(&mut form.grpc_authority, text_at(t, "authority"));
            assign_bool(&mut form.grpc_multi_mode, bool_at(t, "multiMode"));
            assign(&mut form.grpc_idle_timeout, text_at(t, "idle_timeout"));
            assign(
                &mut form.grpc_health_check_timeout,
                text_at(t, "health_check_timeout"),
            );
            assign(
                &mut form.grpc_initial_windows_size,
                text_at(t, "initial_windows_size"),
            );
            assign_bool(
                &mut form.grpc_permit_without_stream,
                bool_at(t, "permit_without_stream"),
            );
        }
        Transport::Quic => {
            assign(&mut form.quic_security, text_at(t, "security"));
            assign(&mut form.quic_key, text_at(t, "key"));
            assign(&mut form.quic_header_type, header_type_of(t));
        }
    }
}

fn project_tls(form: &mut StreamForm, tls: &Map<String, Value>) {
    assign(&mut form.server_name, text_at(tls, "serverName"));
    assign_list(&mut form.alpn, list_at(tls, "alpn"));
    assign(&mut form.fingerprint, text_at(tls, "fingerprint"));
    assign_bool(&mut form.allow_insecure, bool_at(tls, "allowInsecure"));
    // The scalar name wins over the legacy list
    let verify = text_at(tls, "verifyPeerCertByName").or_else(|| {
        let legacy = list_at(tls, "verifyPeerCertInNames");
        (!legacy.is_empty()).then(|| join_list(&legacy))
    });
    assign(&mut form.verify_peer_cert_by_name, verify);
    assign(&mut form.ech_config_list, text_at(tls, "echConfigList"));
    assign_bool(&mut form.reject_unknown_sni, bool_at(tls, "rejectUnknownSni"));
    form.certificates = objects_at(tls, "certificates")
        .map(|cert| CertificateForm {
            certificate_file: text_at(cert, "certificateFile").unwrap_or_default(),
            key_file: text_at(cert, "keyFile").unwrap_or_default(),
        })
        .collect();
}

fn project_reality(form: &mut StreamForm, reality: &Map<String, Value>) {
    assign(&mut form.server_name, text_at(reality, "serverName"));
    assign(&mut form.reality_fingerprint, text_at(reality, "fingerprint"));
    assign(&mut form.public_key, text_at(reality, "publicKey"));
    assign(&mut form.short_id, text_at(reality, "shortId"));
    assign(&mut form.spider_x, text_at(reality, "spiderX"));
    assign(&mut form.mldsa65_verify, text_at(reality, "mldsa65Verify"));
    assign(
        &mut form.reality_target,
        text_at(reality, "target").or_else(|| text_at(reality, "dest")),
    );
    assign_list(&mut form.reality_server_names, list_at(reality, "serverNames"));
    assign(&mut form.private_key, text_at(reality, "privateKey"));
    assign_list(&mut form.short_ids, list_at(reality, "shortIds"));
    assign(&mut form.xver, text_at(reality, "xver"));
}

// ============================================================================
// Inbound
// ============================================================================

/// Projects an inbound onto a full form
pub fn project_inbound(value: &Value) -> InboundForm {
    let Some(root) = value.as_object() else {
        debug!("Inbound is not an object, using template");
        return InboundForm::default();
    };
    let empty = Map::new();
    let settings = object_at(root, "settings").unwrap_or(&empty);

    let mut form = InboundForm {
        protocol: protocol_of(root),
        ..Default::default()
    };
    assign(&mut form.tag, text_at(root, "tag"));
    assign(&mut form.listen, text_at(root, "listen"));
    assign(&mut form.port, text_at(root, "port"));

    form.clients = objects_at(settings, "clients")
        .map(|client| ClientForm {
            id: text_at(client, "id").unwrap_or_default(),
            password: text_at(client, "password").unwrap_or_default(),
            flow: text_at(client, "flow").unwrap_or_default(),
            email: text_at(client, "email").unwrap_or_default(),
        })
        .collect();
    assign(&mut form.decryption, text_at(settings, "decryption"));
    assign(&mut form.method, text_at(settings, "method"));
    assign(&mut form.password, text_at(settings, "password"));
    assign(&mut form.ss_network, text_at(settings, "network"));
    assign(&mut form.auth, text_at(settings, "auth"));
    assign_bool(&mut form.udp, bool_at(settings, "udp"));
    form.accounts = objects_at(settings, "accounts")
        .map(|account| AccountForm {
            user: text_at(account, "user").unwrap_or_default(),
            pass: text_at(account, "pass").unwrap_or_default(),
        })
        .collect();
    assign(&mut form.secret_key, text_at(settings, "secretKey"));
    assign(&mut form.wg_mtu, text_at(settings, "mtu"));
    form.peers = project_peers(settings);

    if let Some(stream) = object_at(root, "streamSettings") {
        project_stream(&mut form.stream, stream);
        form.extra.stream = unmanaged_keys(stream, STREAM_KEYS);
    }

    if let Some(sniffing) = object_at(root, "sniffing") {
        assign_bool(&mut form.sniffing_enabled, bool_at(sniffing, "enabled"));
        assign_list(&mut form.dest_override, list_at(sniffing, "destOverride"));
        assign_bool(&mut form.route_only, bool_at(sniffing, "routeOnly"));
        assign_bool(&mut form.metadata_only, bool_at(sniffing, "metadataOnly"));
    }

    form.extra.root = unmanaged_keys(root, INBOUND_KEYS);
    form.extra.settings = unmanaged_keys(settings, settings_keys(form.protocol, Direction::Inbound));
    keep_foreign(&mut form.extra, root);
    form
}
