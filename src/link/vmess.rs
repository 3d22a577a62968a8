//! VMess link codec
//!
//! VMess links carry a Base64 encoded JSON document in the v2rayN layout:
//! vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": "443", ... })

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::{Protocol, Security, TcpHeader, Transport};
use crate::form::OutboundForm;
use crate::model::defaults;
use crate::model::value::NumOrStr;

use super::LinkCodec;
use super::base64::{decode_base64_text, encode_standard};

// ============================================================================
// VMess Codec
// ============================================================================

/// Codec for VMess (vmess://) links
pub struct VmessCodec;

/// v2rayN share document
///
/// `host`, `path` and `type` change meaning with `net`: for gRPC `path` is
/// the service name, for mKCP `path` is the seed, for QUIC `host` is the
/// QUIC security and `path` its key.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct VmessJson {
    v: String,
    ps: String,
    add: String,
    port: Option<NumOrStr>,
    id: String,
    aid: Option<NumOrStr>,
    scy: String,
    net: String,
    #[serde(rename = "type")]
    header_type: String,
    host: String,
    path: String,
    tls: String,
    sni: String,
    alpn: String,
    fp: String,
}

impl LinkCodec for VmessCodec {
    fn scheme(&self) -> &str {
        "vmess"
    }

    fn protocol(&self) -> Protocol {
        Protocol::VMess
    }

    fn decode(&self, link: &str) -> Result<OutboundForm> {
        trace!("Decoding VMess link");
        let link = link.trim();
        let encoded = link
            .get(..8)
            .filter(|prefix| prefix.eq_ignore_ascii_case("vmess://"))
            .map(|_| &link[8..])
            .ok_or_else(|| anyhow!("Invalid VMess link: missing vmess:// prefix"))?;

        let decoded = decode_base64_text(encoded).context("Failed to decode VMess link")?;
        trace!("Decoded VMess JSON: {}", decoded);
        let json: VmessJson =
            serde_json::from_str(&decoded).context("Failed to parse VMess JSON")?;

        let address = json.add.trim();
        if address.is_empty() {
            bail!("VMess link missing address");
        }
        if json.id.trim().is_empty() {
            bail!("VMess link missing id");
        }
        let port: u16 = json
            .port
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| anyhow!("VMess link has an invalid port"))?;

        let mut form = OutboundForm::for_protocol(Protocol::VMess);
        form.tag = json.ps.trim().to_string();
        form.address = address.to_string();
        form.port = port.to_string();
        form.id = json.id.trim().to_string();
        if !json.scy.trim().is_empty() {
            form.vmess_security = json.scy.trim().to_string();
        }
        apply_transport(&mut form, &json);
        if json.tls.trim().eq_ignore_ascii_case("tls") {
            let stream = &mut form.stream;
            stream.security = Security::Tls;
            stream.server_name = json.sni.trim().to_string();
            stream.alpn = json.alpn.trim().to_string();
            stream.fingerprint = json.fp.trim().to_string();
        }
        Ok(form)
    }

    fn encode(&self, form: &OutboundForm) -> Result<String> {
        let (address, port) = (form.address.trim(), form.port.trim());
        if address.is_empty() || port.is_empty() {
            bail!("Outbound has no address/port to export");
        }
        let stream = &form.stream;
        let mut json = VmessJson {
            v: "2".to_string(),
            ps: form.tag.clone(),
            add: address.to_string(),
            port: Some(NumOrStr::Str(port.to_string())),
            id: form.id.trim().to_string(),
            aid: Some(NumOrStr::Str("0".to_string())),
            scy: form.vmess_security.trim().to_string(),
            net: stream.network.wire_name().to_string(),
            ..Default::default()
        };
        fill_transport(&mut json, form);
        if stream.security == Security::Tls {
            json.tls = "tls".to_string();
            json.sni = stream.server_name.trim().to_string();
            json.alpn = stream.alpn.trim().to_string();
            json.fp = stream.fingerprint.trim().to_string();
        }

        let text = serde_json::to_string(&json).context("Failed to serialize VMess JSON")?;
        Ok(format!("vmess://{}", encode_standard(&text)))
    }
}

fn keep(target: &mut String, value: &str) {
    if !value.trim().is_empty() {
        *target = value.trim().to_string();
    }
}

fn apply_transport(form: &mut OutboundForm, json: &VmessJson) {
    let stream = &mut form.stream;
    stream.network = match json.net.trim() {
        "" => Transport::Tcp,
        "websocket" => Transport::Ws,
        "h2" => Transport::Http,
        net => Transport::from_wire(net).unwrap_or(Transport::Tcp),
    };

    match stream.network {
        Transport::Tcp => {
            keep(&mut stream.tcp_header_type, &json.header_type);
            if TcpHeader::from_wire(&stream.tcp_header_type) == TcpHeader::Http {
                keep(&mut stream.tcp_host, &json.host);
                keep(&mut stream.tcp_path, &json.path);
            }
        }
        Transport::Kcp => {
            keep(&mut stream.kcp_header_type, &json.header_type);
            keep(&mut stream.kcp_seed, &json.path);
        }
        Transport::Grpc => {
            keep(&mut stream.grpc_service_name, &json.path);
            keep(&mut stream.grpc_authority, &json.host);
            stream.grpc_multi_mode = json.header_type.trim() == "multi";
        }
        Transport::Quic => {
            keep(&mut stream.quic_security, &json.host);
            keep(&mut stream.quic_key, &json.path);
            keep(&mut stream.quic_header_type, &json.header_type);
        }
        Transport::Xhttp | Transport::SplitHttp => {
            keep(&mut stream.host, &json.host);
            keep(&mut stream.path, &json.path);
            keep(&mut stream.xhttp_mode, &json.header_type);
        }
        Transport::Ws | Transport::HttpUpgrade | Transport::Http => {
            keep(&mut stream.host, &json.host);
            keep(&mut stream.path, &json.path);
        }
    }
}

fn fill_transport(json: &mut VmessJson, form: &OutboundForm) {
    let stream = &form.stream;
    let (header_type, host, path) = match stream.network {
        Transport::Tcp => {
            if TcpHeader::from_wire(&stream.tcp_header_type) == TcpHeader::Http {
                ("http", stream.tcp_host.as_str(), stream.tcp_path.as_str())
            } else {
                (defaults::HEADER_NONE, "", "")
            }
        }
        Transport::Kcp => (
            stream.kcp_header_type.as_str(),
            "",
            stream.kcp_seed.as_str(),
        ),
        Transport::Grpc => (
            if stream.grpc_multi_mode { "multi" } else { "gun" },
            stream.grpc_authority.as_str(),
            stream.grpc_service_name.as_str(),
        ),
        Transport::Quic => (
            stream.quic_header_type.as_str(),
            stream.quic_security.as_str(),
            stream.quic_key.as_str(),
        ),
        Transport::Xhttp | Transport::SplitHttp => (
            stream.xhttp_mode.as_str(),
            stream.host.as_str(),
            stream.path.as_str(),
        ),
        Transport::Ws | Transport::HttpUpgrade | Transport::Http => {
            ("", stream.host.as_str(), stream.path.as_str())
        }
    };
    json.header_type = header_type.trim().to_string();
    json.host = host.trim().to_string();
    json.path = path.trim().to_string();
}
