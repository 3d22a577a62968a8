//! WireGuard link codec
//!
//! Format: wireguard://secretKey@host:port?publickey=..&address=..&mtu=..
//! &reserved=..&presharedkey=..&keepalive=..&allowedips=..#tag
//! (`wg://` accepted as an alias)

use anyhow::{Result, anyhow, bail};
use tracing::trace;
use url::Url;

use crate::catalog::Protocol;
use crate::form::{OutboundForm, WireGuardPeerForm};

use super::params::{Params, to_query};
use super::{LinkCodec, decode_component, format_host, fragment, host_port, parse_host_port, tag_from};

/// Route everything through the tunnel when the link names no ranges
const DEFAULT_ALLOWED_IPS: &str = "0.0.0.0/0,::/0";

/// Codec for WireGuard (wireguard://, wg://) links
pub struct WireGuardCodec;

impl LinkCodec for WireGuardCodec {
    fn scheme(&self) -> &str {
        "wireguard"
    }

    fn aliases(&self) -> &[&str] {
        &["wg"]
    }

    fn protocol(&self) -> Protocol {
        Protocol::WireGuard
    }

    fn decode(&self, link: &str) -> Result<OutboundForm> {
        trace!("Decoding WireGuard link");
        let url =
            Url::parse(link).map_err(|e| anyhow!("Failed to parse WireGuard link: {}", e))?;

        let secret_key = decode_component(url.username());
        if secret_key.is_empty() {
            bail!("WireGuard link missing secret key");
        }
        let (host, port) = host_port(&url)?;
        let params: Params = url.query_pairs().into_owned().collect();
        let param = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let public_key =
            param("publickey").ok_or_else(|| anyhow!("WireGuard link missing publickey"))?;

        let mut form = OutboundForm::for_protocol(Protocol::WireGuard);
        form.tag = tag_from(&url);
        form.secret_key = secret_key;
        form.wg_address = param("address").unwrap_or_default();
        if let Some(mtu) = param("mtu") {
            form.wg_mtu = mtu;
        }
        form.reserved = param("reserved").unwrap_or_default();

        let mut peer = WireGuardPeerForm {
            public_key,
            pre_shared_key: param("presharedkey").unwrap_or_default(),
            endpoint: format!("{}:{}", format_host(&host), port),
            allowed_ips: param("allowedips").unwrap_or_else(|| DEFAULT_ALLOWED_IPS.to_string()),
            ..Default::default()
        };
        if let Some(keep_alive) = param("keepalive") {
            peer.keep_alive = keep_alive;
        }
        form.peers = vec![peer];
        Ok(form)
    }

    fn encode(&self, form: &OutboundForm) -> Result<String> {
        if form.secret_key.trim().is_empty() {
            bail!("WireGuard outbound has no secret key to export");
        }
        let peer = form
            .peers
            .first()
            .ok_or_else(|| anyhow!("WireGuard outbound has no peer to export"))?;
        let (host, port) = parse_host_port(peer.endpoint.trim())?;

        let mut pairs = vec![("publickey", peer.public_key.trim().to_string())];
        let mut push = |key: &'static str, value: &str| {
            if !value.trim().is_empty() {
                pairs.push((key, value.trim().to_string()));
            }
        };
        push("address", &form.wg_address);
        push("mtu", &form.wg_mtu);
        push("reserved", &form.reserved);
        push("presharedkey", &peer.pre_shared_key);
        push("keepalive", &peer.keep_alive);
        push("allowedips", &peer.allowed_ips);

        Ok(format!(
            "wireguard://{}@{}:{}?{}{}",
            urlencoding::encode(form.secret_key.trim()),
            format_host(&host),
            port,
            to_query(&pairs),
            fragment(&form.tag)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wireguard_basic() {
        let form = WireGuardCodec
            .decode("wireguard://c2VjcmV0%2Bkey%3D@1.2.3.4:51820?publickey=cHVibGlj&address=10.0.0.2%2F32&mtu=1280&reserved=1,2,3#wg-node")
            .unwrap();
        assert_eq!(form.protocol, Protocol::WireGuard);
        assert_eq!(form.tag, "wg-node");
        assert_eq!(form.secret_key, "c2VjcmV0+key=");
        assert_eq!(form.wg_address, "10.0.0.2/32");
        assert_eq!(form.wg_mtu, "1280");
        assert_eq!(form.reserved, "1,2,3");
        assert_eq!(form.peers.len(), 1);
        assert_eq!(form.peers[0].public_key, "cHVibGlj");
        assert_eq!(form.peers[0].endpoint, "1.2.3.4:51820");
        assert_eq!(form.peers[0].allowed_ips, DEFAULT_ALLOWED_IPS);
    }

    #[test]
    fn test_wireguard_alias_and_ipv6_endpoint() {
        let form = WireGuardCodec
            .decode("wg://key@[2001:db8::1]:51820?publickey=pk&keepalive=25")
            .unwrap();
        assert_eq!(form.peers[0].endpoint, "[2001:db8::1]:51820");
        assert_eq!(form.peers[0].keep_alive, "25");
        assert!(form.tag.is_empty());
    }

    #[test]
    fn test_wireguard_missing_fields() {
        assert!(WireGuardCodec.decode("wireguard://@1.2.3.4:51820?publickey=pk").is_err());
        assert!(WireGuardCodec.decode("wireguard://key@1.2.3.4:51820").is_err());
    }

    #[test]
    fn test_wireguard_encode() {
        let mut form = OutboundForm::for_protocol(Protocol::WireGuard);
        form.tag = "wg".into();
        form.secret_key = "sk=".into();
        form.wg_address = "10.0.0.2/32".into();
        form.wg_mtu = String::new();
        form.peers = vec![WireGuardPeerForm {
            public_key: "pk".into(),
            endpoint: "1.2.3.4:51820".into(),
            keep_alive: String::new(),
            ..Default::default()
        }];
        assert_eq!(
            WireGuardCodec.encode(&form).unwrap(),
            "wireguard://sk%3D@1.2.3.4:51820?publickey=pk&address=10.0.0.2%2F32#wg"
        );
    }

    #[test]
    fn test_wireguard_encode_requires_peer() {
        let mut form = OutboundForm::for_protocol(Protocol::WireGuard);
        form.secret_key = "sk".into();
        assert!(WireGuardCodec.encode(&form).is_err());
    }
}
