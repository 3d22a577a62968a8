//! Query-string convention shared by vless://, trojan:// and ss:// links.
//!
//! `type`, `headerType`, `host`, `path`, `serviceName`, `authority`, `mode`,
//! `seed` describe the transport; `security`, `sni`, `alpn`, `fp`,
//! `allowInsecure`, `pbk`, `sid`, `spx`, `pqv`, `ech` the security layer.

use std::collections::HashMap;

use tracing::warn;
use url::form_urlencoded;

use crate::catalog::{Security, TcpHeader, Transport};
use crate::form::StreamForm;
use crate::model::defaults;

pub(crate) type Params = HashMap<String, String>;

fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn set(target: &mut String, value: Option<&str>) {
    if let Some(value) = value {
        *target = value.to_string();
    }
}

/// Applies transport and security parameters onto a stream form
pub(crate) fn apply_stream_params(form: &mut StreamForm, params: &Params) {
    if let Some(network) = param(params, "type") {
        form.network = Transport::from_wire(network).unwrap_or_else(|| {
            warn!(network, "Unknown link transport, using tcp");
            Transport::Tcp
        });
    }

    match form.network {
        Transport::Tcp => {
            set(&mut form.tcp_header_type, param(params, "headerType"));
            if TcpHeader::from_wire(&form.tcp_header_type) == TcpHeader::Http {
                set(&mut form.tcp_host, param(params, "host"));
                set(&mut form.tcp_path, param(params, "path"));
            }
        }
        Transport::Kcp => {
            set(&mut form.kcp_header_type, param(params, "headerType"));
            set(&mut form.kcp_seed, param(params, "seed").or_else(|| param(params, "path")));
        }
        Transport::Grpc => {
            set(&mut form.grpc_service_name, param(params, "serviceName"));
            set(&mut form.grpc_authority, param(params, "authority"));
            form.grpc_multi_mode = param(params, "mode") == Some("multi");
        }
        Transport::Quic => {
            set(&mut form.quic_security, param(params, "quicSecurity"));
            set(&mut form.quic_key, param(params, "key"));
            set(&mut form.quic_header_type, param(params, "headerType"));
        }
        Transport::Ws
        | Transport::HttpUpgrade
        | Transport::Http
        | Transport::Xhttp
        | Transport::SplitHttp => {
            set(&mut form.host, param(params, "host"));
            set(&mut form.path, param(params, "path"));
            set(&mut form.xhttp_mode, param(params, "mode"));
        }
    }

    if let Some(security) = param(params, "security") {
        form.security = Security::from_wire(security).unwrap_or_else(|| {
            warn!(security, "Unknown link security, ignoring");
            Security::None
        });
    }
    match form.security {
        Security::Tls => {
            set(&mut form.server_name, param(params, "sni"));
            set(&mut form.alpn, param(params, "alpn"));
            set(&mut form.fingerprint, param(params, "fp"));
            set(&mut form.ech_config_list, param(params, "ech"));
            form.allow_insecure = matches!(
                param(params, "allowInsecure").or_else(|| param(params, "insecure")),
                Some("1" | "true")
            );
        }
        Security::Reality => {
            set(&mut form.server_name, param(params, "sni"));
            set(&mut form.reality_fingerprint, param(params, "fp"));
            set(&mut form.public_key, param(params, "pbk"));
            set(&mut form.short_id, param(params, "sid"));
            set(&mut form.spider_x, param(params, "spx"));
            set(&mut form.mldsa65_verify, param(params, "pqv"));
        }
        Security::None => {}
    }
}

/// Query pairs describing a stream form; defaults are left out
pub(crate) fn stream_params(form: &StreamForm) -> Vec<(&'static str, String)> {
    let mut pairs = vec![("type", form.network.wire_name().to_string())];
    let mut push = |key: &'static str, value: &str, default: &str| {
        let value = value.trim();
        if !value.is_empty() && value != default {
            pairs.push((key, value.to_string()));
        }
    };

    match form.network {
        Transport::Tcp => {
            push("headerType", &form.tcp_header_type, defaults::HEADER_NONE);
            if TcpHeader::from_wire(&form.tcp_header_type) == TcpHeader::Http {
                push("host", &form.tcp_host, "");
                push("path", &form.tcp_path, defaults::HTTP_PATH);
            }
        }
        Transport::Kcp => {
            push("headerType", &form.kcp_header_type, defaults::HEADER_NONE);
            push("seed", &form.kcp_seed, "");
        }
        Transport::Grpc => {
            push("serviceName", &form.grpc_service_name, "");
            push("authority", &form.grpc_authority, "");
            if form.grpc_multi_mode {
                push("mode", "multi", "");
            }
        }
        Transport::Quic => {
            push("quicSecurity", &form.quic_security, defaults::QUIC_SECURITY);
            push("key", &form.quic_key, "");
            push("headerType", &form.quic_header_type, defaults::HEADER_NONE);
        }
        Transport::Ws | Transport::HttpUpgrade | Transport::Http => {
            push("host", &form.host, "");
            push("path", &form.path, defaults::HTTP_PATH);
        }
        Transport::Xhttp | Transport::SplitHttp => {
            push("host", &form.host, "");
            push("path", &form.path, defaults::HTTP_PATH);
            push("mode", &form.xhttp_mode, defaults::XHTTP_MODE);
        }
    }

    match form.security {
        Security::Tls => {
            push("security", "tls", "");
            push("sni", &form.server_name, "");
            push("alpn", &form.alpn, "");
            push("fp", &form.fingerprint, "");
            push("ech", &form.ech_config_list, "");
            if form.allow_insecure {
                push("allowInsecure", "1", "");
            }
        }
        Security::Reality => {
            push("security", "reality", "");
            push("sni", &form.server_name, "");
            // Clients need the fingerprint spelled out even at its default
            push("fp", &form.reality_fingerprint, "");
            push("pbk", &form.public_key, "");
            push("sid", &form.short_id, "");
            push("spx", &form.spider_x, "");
            push("pqv", &form.mldsa65_verify, "");
        }
        Security::None => {}
    }
    pairs
}

/// Renders query pairs as a percent-encoded query string
pub(crate) fn to_query(pairs: &[(&str, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
