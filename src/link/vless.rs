//! VLESS link codec
//!
//! Format: vless://uuid@host:port?params#tag

use anyhow::{Result, anyhow, bail};
use tracing::trace;
use url::Url;

use crate::catalog::Protocol;
use crate::form::OutboundForm;
use crate::model::defaults;

use super::params::{Params, apply_stream_params, stream_params, to_query};
use super::{LinkCodec, decode_component, endpoint, fragment, host_port, tag_from};

// ============================================================================
// VLESS Codec
// ============================================================================

/// Codec for VLESS (vless://) links
pub struct VlessCodec;

impl LinkCodec for VlessCodec {
    fn scheme(&self) -> &str {
        "vless"
    }

    fn protocol(&self) -> Protocol {
        Protocol::VLess
    }

    fn decode(&self, link: &str) -> Result<OutboundForm> {
        trace!("Decoding VLESS link");
        let url = Url::parse(link).map_err(|e| anyhow!("Failed to parse VLESS link: {}", e))?;

        let id = decode_component(url.username());
        if id.is_empty() {
            bail!("VLESS link missing UUID");
        }
        let (address, port) = host_port(&url)?;
        let params: Params = url.query_pairs().into_owned().collect();

        let mut form = OutboundForm::for_protocol(Protocol::VLess);
        form.tag = tag_from(&url);
        form.address = address;
        form.port = port.to_string();
        form.id = id;
        if let Some(encryption) = params.get("encryption").filter(|e| !e.is_empty()) {
            form.encryption = encryption.clone();
        }
        if let Some(flow) = params.get("flow") {
            form.flow = flow.clone();
        }
        apply_stream_params(&mut form.stream, &params);
        Ok(form)
    }

    fn encode(&self, form: &OutboundForm) -> Result<String> {
        let (host, port) = endpoint(form)?;
        if form.id.trim().is_empty() {
            bail!("VLESS outbound has no id to export");
        }

        let mut pairs = vec![(
            "encryption",
            if form.encryption.trim().is_empty() {
                defaults::VLESS_ENCRYPTION.to_string()
            } else {
                form.encryption.trim().to_string()
            },
        )];
        if !form.flow.trim().is_empty() {
            pairs.push(("flow", form.flow.trim().to_string()));
        }
        pairs.extend(stream_params(&form.stream));

        Ok(format!(
            "vless://{}@{}:{}?{}{}",
            urlencoding::encode(form.id.trim()),
            host,
            port,
            to_query(&pairs),
            fragment(&form.tag)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Security, Transport};

    #[test]
    fn test_vless_basic() {
        let form = VlessCodec
            .decode("vless://uuid-here@example.com:443?security=tls&sni=example.com#test-node")
            .unwrap();
        assert_eq!(form.tag, "test-node");
        assert_eq!(form.address, "example.com");
        assert_eq!(form.port, "443");
        assert_eq!(form.id, "uuid-here");
        assert_eq!(form.encryption, "none");
        assert_eq!(form.stream.security, Security::Tls);
        assert_eq!(form.stream.server_name, "example.com");
    }

    #[test]
    fn test_vless_with_reality_and_flow() {
        let form = VlessCodec
            .decode("vless://uuid@example.com:443?security=reality&pbk=public-key&sid=short-id&fp=chrome&sni=example.com&flow=xtls-rprx-vision#reality-node")
            .unwrap();
        assert_eq!(form.flow, "xtls-rprx-vision");
        assert_eq!(form.stream.security, Security::Reality);
        assert_eq!(form.stream.public_key, "public-key");
        assert_eq!(form.stream.short_id, "short-id");
    }

    #[test]
    fn test_vless_with_websocket() {
        let form = VlessCodec
            .decode("vless://uuid@example.com:443?type=ws&path=%2Fws&host=ws.example.com&security=tls#ws-node")
            .unwrap();
        assert_eq!(form.stream.network, Transport::Ws);
        assert_eq!(form.stream.path, "/ws");
        assert_eq!(form.stream.host, "ws.example.com");
    }

    #[test]
    fn test_vless_ipv6_host() {
        let form = VlessCodec.decode("vless://uuid@[2001:db8::1]:443").unwrap();
        assert_eq!(form.address, "2001:db8::1");
        assert!(form.tag.is_empty());
    }

    #[test]
    fn test_vless_missing_uuid() {
        assert!(VlessCodec.decode("vless://@example.com:443").is_err());
    }

    #[test]
    fn test_vless_missing_port() {
        assert!(VlessCodec.decode("vless://uuid@example.com").is_err());
    }

    #[test]
    fn test_vless_encode() {
        let form = OutboundForm {
            tag: "my node".into(),
            address: "example.com".into(),
            port: "443".into(),
            id: "uuid".into(),
            flow: "xtls-rprx-vision".into(),
            ..Default::default()
        };
        assert_eq!(
            VlessCodec.encode(&form).unwrap(),
            "vless://uuid@example.com:443?encryption=none&flow=xtls-rprx-vision&type=tcp#my%20node"
        );
    }
}
