//! Stream layer construction: transport, security, sockopt, mux, sniffing.

use tracing::debug;

use super::provenance::{block, list, required, Provenance};
use crate::catalog::{
    can_enable_reality, can_enable_tls, is_legal_transport, Direction, Protocol, Security,
    TcpHeader, Transport,
};
use crate::form::{Passthrough, StreamForm};
use crate::model::defaults;
use crate::model::stream::{
    Certificate, GrpcSettings, HeaderType, HttpHeaders, HttpRequestHeader, HttpSettings,
    KcpSettings, Mux, QuicSettings, RealitySettings, SecuritySettings, Sniffing, Sockopt,
    StreamSettings, TcpHeaderSettings, TcpSettings, TlsSettings, TransportSettings, WsSettings,
    XhttpSettings, STREAM_KEYS,
};
use crate::model::unmanaged_keys;
use crate::model::value::split_list;

/// Transport actually used: an illegal selection falls back to tcp
pub(crate) fn effective_network(protocol: Protocol, direction: Direction, network: Transport) -> Transport {
    if is_legal_transport(protocol, direction, network) {
        network
    } else {
        debug!(%protocol, %network, "Transport not available, using tcp");
        Transport::Tcp
    }
}

/// Builds `streamSettings`; `None` when nothing would be written
pub(crate) fn build_stream(
    form: &StreamForm,
    extra: &Passthrough,
    protocol: Protocol,
    direction: Direction,
    prov: &Provenance<'_>,
) -> Option<StreamSettings> {
    let network = effective_network(protocol, direction, form.network);
    let stream = StreamSettings {
        transport: build_transport(form, network, prov),
        security: build_security(form, protocol, direction, network, prov),
        explicit_network: prov.has("network"),
        explicit_security: prov.has("security"),
        raw_network_name: prov.text_is("network", "raw"),
        raw_settings_key: prov.has("rawSettings") && !prov.has("tcpSettings"),
        sockopt: build_sockopt(form, direction, &prov.child("sockopt")),
        extra: unmanaged_keys(&extra.stream, STREAM_KEYS),
    };
    block(stream, prov)
}

// ============================================================================
// Transports
// ============================================================================

fn build_transport(form: &StreamForm, network: Transport, prov: &Provenance<'_>) -> TransportSettings {
    let p = prov.child(network.settings_key());
    match network {
        Transport::Tcp => {
            let p = p.alongside(prov.child("rawSettings"));
            TransportSettings::Tcp(block(build_tcp(form, &p), &p))
        }
        Transport::Kcp => TransportSettings::Kcp(block(build_kcp(form, &p), &p)),
        Transport::Ws => TransportSettings::Ws(block(build_ws(form, &p), &p)),
        Transport::HttpUpgrade => TransportSettings::HttpUpgrade(block(build_ws(form, &p), &p)),
        Transport::Grpc => TransportSettings::Grpc(block(build_grpc(form, &p), &p)),
        Transport::Http => TransportSettings::Http(block(build_http(form, &p), &p)),
        Transport::Xhttp => TransportSettings::Xhttp(block(build_xhttp(form, &p), &p)),
        Transport::SplitHttp => TransportSettings::SplitHttp(block(build_xhttp(form, &p), &p)),
        Transport::Quic => TransportSettings::Quic(block(build_quic(form, &p), &p)),
    }
}

fn build_tcp(form: &StreamForm, p: &Provenance<'_>) -> TcpSettings {
    let header_p = p.child("header");
    let header = match TcpHeader::from_wire(&form.tcp_header_type) {
        TcpHeader::Http => {
            let request_p = header_p.child("request");
            let headers_p = request_p.child("headers");
            let request = HttpRequestHeader {
                path: request_p.list_with_default("path", &form.tcp_path, &[defaults::HTTP_PATH]),
                headers: block(
                    HttpHeaders {
                        host: list(&form.tcp_host),
                    },
                    &headers_p,
                ),
            };
            Some(TcpHeaderSettings {
                kind: Some("http".to_string()),
                request: block(request, &request_p),
            })
        }
        TcpHeader::None => block(
            TcpHeaderSettings {
                kind: header_p.text("type", defaults::HEADER_NONE, defaults::HEADER_NONE),
                request: None,
            },
            &header_p,
        ),
    };
    TcpSettings { header }
}

fn header_type(p: &Provenance<'_>, value: &str) -> Option<HeaderType> {
    let header_p = p.child("header");
    header_p
        .text("type", value, defaults::HEADER_NONE)
        .map(|kind| HeaderType { kind })
        .or_else(|| {
            header_p.exists().then(|| HeaderType {
                kind: defaults::HEADER_NONE.to_string(),
            })
        })
}

fn build_kcp(form: &StreamForm, p: &Provenance<'_>) -> KcpSettings {
    KcpSettings {
        mtu: p.number("mtu", &form.kcp_mtu, Some(defaults::KCP_MTU)),
        tti: p.number("tti", &form.kcp_tti, Some(defaults::KCP_TTI)),
        uplink_capacity: p.number(
            "uplinkCapacity",
            &form.kcp_uplink_capacity,
            Some(defaults::KCP_UPLINK_CAPACITY),
        ),
        downlink_capacity: p.number(
            "downlinkCapacity",
            &form.kcp_downlink_capacity,
            Some(defaults::KCP_DOWNLINK_CAPACITY),
        ),
        congestion: p.flag("congestion", form.kcp_congestion, false),
        header: header_type(p, &form.kcp_header_type),
        seed: p.text("seed", &form.kcp_seed, ""),
    }
}

fn build_ws(form: &StreamForm, p: &Provenance<'_>) -> WsSettings {
    WsSettings {
        path: p.text("path", &form.path, defaults::HTTP_PATH),
        host: p.text("host", &form.host, ""),
    }
}

fn build_grpc(form: &StreamForm, p: &Provenance<'_>) -> GrpcSettings {
    GrpcSettings {
        service_name: p.text("serviceName", &form.grpc_service_name, ""),
        authority: p.text("authority", &form.grpc_authority, ""),
        multi_mode: p.flag("multiMode", form.grpc_multi_mode, false),
        idle_timeout: p.number("idle_timeout", &form.grpc_idle_timeout, None),
        health_check_timeout: p.number("health_check_timeout", &form.grpc_health_check_timeout, None),
        initial_windows_size: p.number("initial_windows_size", &form.grpc_initial_windows_size, None),
        permit_without_stream: p.flag("permit_without_stream", form.grpc_permit_without_stream, false),
    }
}

fn build_http(form: &StreamForm, p: &Provenance<'_>) -> HttpSettings {
    HttpSettings {
        host: list(&form.host),
        path: p.text("path", &form.path, defaults::HTTP_PATH),
    }
}

fn build_xhttp(form: &StreamForm, p: &Provenance<'_>) -> XhttpSettings {
    XhttpSettings {
        host: p.text("host", &form.host, ""),
        path: p.text("path", &form.path, defaults::HTTP_PATH),
        mode: p.text("mode", &form.xhttp_mode, defaults::XHTTP_MODE),
    }
}

fn build_quic(form: &StreamForm, p: &Provenance<'_>) -> QuicSettings {
    QuicSettings {
        security: p.text("security", &form.quic_security, defaults::QUIC_SECURITY),
        key: p.text("key", &form.quic_key, ""),
        header: header_type(p, &form.quic_header_type),
    }
}

// ============================================================================
// Security
// ============================================================================

fn build_security(
    form: &StreamForm,
    protocol: Protocol,
    direction: Direction,
    network: Transport,
    prov: &Provenance<'_>,
) -> SecuritySettings {
    match form.security {
        Security::None => SecuritySettings::None,
        Security::Tls if can_enable_tls(protocol, network) => {
            let p = prov.child("tlsSettings");
            let tls = match direction {
                Direction::Outbound => build_tls_client(form, &p),
                Direction::Inbound => build_tls_server(form, &p),
            };
            SecuritySettings::Tls(block(tls, &p))
        }
        Security::Reality if can_enable_reality(protocol, network) => {
            let p = prov.child("realitySettings");
            let reality = match direction {
                Direction::Outbound => build_reality_client(form, &p),
                Direction::Inbound => build_reality_server(form, &p),
            };
            SecuritySettings::Reality(block(reality, &p))
        }
        refused => {
            debug!(%protocol, %network, security = %refused, "Security layer not available, dropping");
            SecuritySettings::None
        }
    }
}

fn build_tls_client(form: &StreamForm, p: &Provenance<'_>) -> TlsSettings {
    TlsSettings {
        server_name: p.text("serverName", &form.server_name, ""),
        alpn: list(&form.alpn),
        fingerprint: p.text("fingerprint", &form.fingerprint, ""),
        allow_insecure: p.flag("allowInsecure", form.allow_insecure, false),
        // The legacy list form is read on projection and rewritten as the scalar
        verify_peer_cert_by_name: p.text_any(
            &["verifyPeerCertByName", "verifyPeerCertInNames"],
            &form.verify_peer_cert_by_name,
            "",
        ),
        ech_config_list: p.text("echConfigList", &form.ech_config_list, ""),
        ..Default::default()
    }
}

fn build_tls_server(form: &StreamForm, p: &Provenance<'_>) -> TlsSettings {
    let certificates: Vec<Certificate> = form
        .certificates
        .iter()
        .map(|cert| Certificate {
            certificate_file: required(&cert.certificate_file),
            key_file: required(&cert.key_file),
        })
        .filter(|cert| *cert != Certificate::default())
        .collect();
    TlsSettings {
        server_name: p.text("serverName", &form.server_name, ""),
        alpn: list(&form.alpn),
        reject_unknown_sni: p.flag("rejectUnknownSni", form.reject_unknown_sni, false),
        certificates: (!certificates.is_empty()).then_some(certificates),
        ..Default::default()
    }
}

fn build_reality_client(form: &StreamForm, p: &Provenance<'_>) -> RealitySettings {
    RealitySettings {
        server_name: p.text("serverName", &form.server_name, ""),
        fingerprint: p.text(
            "fingerprint",
            &form.reality_fingerprint,
            defaults::REALITY_FINGERPRINT,
        ),
        public_key: required(&form.public_key),
        short_id: p.text("shortId", &form.short_id, ""),
        spider_x: p.text("spiderX", &form.spider_x, ""),
        mldsa65_verify: p.text("mldsa65Verify", &form.mldsa65_verify, ""),
        ..Default::default()
    }
}

fn build_reality_server(form: &StreamForm, p: &Provenance<'_>) -> RealitySettings {
    RealitySettings {
        target: p.text_any(&["target", "dest"], &form.reality_target, ""),
        server_names: list(&form.reality_server_names),
        private_key: required(&form.private_key),
        short_ids: list(&form.short_ids),
        xver: p.number("xver", &form.xver, Some(defaults::REALITY_XVER)),
        ..Default::default()
    }
}

// ============================================================================
// Sockopt, Mux, Sniffing
// ============================================================================

fn build_sockopt(form: &StreamForm, direction: Direction, p: &Provenance<'_>) -> Option<Sockopt> {
    let sockopt = Sockopt {
        dialer_proxy: p.text("dialerProxy", &form.dialer_proxy, ""),
        tcp_fast_open: p.flag("tcpFastOpen", form.tcp_fast_open, false),
        mark: p.number("mark", &form.mark, None),
        accept_proxy_protocol: match direction {
            Direction::Inbound => p.flag("acceptProxyProtocol", form.accept_proxy_protocol, false),
            Direction::Outbound => None,
        },
    };
    block(sockopt, p)
}

/// Mux block. Disabled mux is omitted unless the original wrote `enabled`.
pub(crate) fn build_mux(
    enabled: bool,
    concurrency: &str,
    xudp_concurrency: &str,
    xudp_proxy_udp443: &str,
    p: &Provenance<'_>,
) -> Option<Mux> {
    if !enabled {
        return p.has("enabled").then(Mux::default);
    }
    Some(Mux {
        enabled: true,
        concurrency: p.number("concurrency", concurrency, Some(defaults::MUX_CONCURRENCY)),
        xudp_concurrency: p.number(
            "xudpConcurrency",
            xudp_concurrency,
            Some(defaults::MUX_XUDP_CONCURRENCY),
        ),
        xudp_proxy_udp443: p.text(
            "xudpProxyUDP443",
            xudp_proxy_udp443,
            defaults::MUX_XUDP_PROXY_UDP443,
        ),
    })
}

/// Sniffing block, following the same disabled rule as mux
pub(crate) fn build_sniffing(
    enabled: bool,
    dest_override: &str,
    route_only: bool,
    metadata_only: bool,
    p: &Provenance<'_>,
) -> Option<Sniffing> {
    if !enabled {
        return p.has("enabled").then(Sniffing::default);
    }
    let dest_override = split_list(dest_override);
    Some(Sniffing {
        enabled: true,
        dest_override: (!dest_override.is_empty()).then_some(dest_override),
        route_only: p.flag("routeOnly", route_only, false),
        metadata_only: p.flag("metadataOnly", metadata_only, false),
    })
}
