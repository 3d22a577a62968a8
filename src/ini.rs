//! WireGuard INI codec
//!
//! Reads the `[Interface]` / `[Peer]` text exported by WireGuard clients.
//! Section and key names are case-insensitive, `#` and `;` start comments,
//! and repeated `Address` / `AllowedIPs` lines accumulate.

use tracing::{debug, trace};

use crate::builder::build_outbound;
use crate::catalog::Protocol;
use crate::form::{OutboundForm, WireGuardPeerForm};
use crate::link::Decoded;
use crate::model::Outbound;

/// Tag given to outbounds decoded from INI text
pub const INI_TAG: &str = "wireguard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Interface,
    Peer,
    Other,
}

fn append(target: &mut String, value: &str) {
    for item in value.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        if !target.is_empty() {
            target.push(',');
        }
        target.push_str(item);
    }
}

/// Decodes WireGuard INI text into a canonical outbound
///
/// Text without an `[Interface]` section carrying a `PrivateKey` is not
/// INI as far as this codec is concerned and yields `NoMatch`.
pub fn decode_ini(text: &str) -> Decoded<Outbound> {
    let mut form = OutboundForm::for_protocol(Protocol::WireGuard);
    form.tag = INI_TAG.to_string();

    let mut section = Section::Other;
    let mut seen_interface = false;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = match name.trim().to_ascii_lowercase().as_str() {
                "interface" => {
                    seen_interface = true;
                    Section::Interface
                }
                "peer" => {
                    form.peers.push(WireGuardPeerForm::default());
                    Section::Peer
                }
                other => {
                    debug!(section = other, "Skipping unknown INI section");
                    Section::Other
                }
            };
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            trace!(line = line_no + 1, "Skipping INI line without '='");
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match (section, key.as_str()) {
            (Section::Interface, "privatekey") => form.secret_key = value.to_string(),
            (Section::Interface, "address") => append(&mut form.wg_address, value),
            (Section::Interface, "mtu") => form.wg_mtu = value.to_string(),
            (Section::Interface, "reserved") => form.reserved = value.to_string(),
            (Section::Peer, key) => {
                let Some(peer) = form.peers.last_mut() else {
                    continue;
                };
                match key {
                    "publickey" => peer.public_key = value.to_string(),
                    "presharedkey" => peer.pre_shared_key = value.to_string(),
                    "allowedips" => append(&mut peer.allowed_ips, value),
                    "endpoint" => peer.endpoint = value.to_string(),
                    "persistentkeepalive" => peer.keep_alive = value.to_string(),
                    _ => trace!(key, "Ignoring INI peer key"),
                }
            }
            (_, key) => trace!(key, "Ignoring INI key"),
        }
    }

    if !seen_interface {
        return Decoded::no_match("No [Interface] section");
    }
    if form.secret_key.is_empty() {
        return Decoded::no_match("[Interface] section has no PrivateKey");
    }

    debug!("Decoded WireGuard INI with {} peer(s)", form.peers.len());
    Decoded::Match(build_outbound(&form, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::settings::OutboundSettings;

    const SAMPLE: &str = "\
[Interface]
PrivateKey = AAAAprivate=
Address = 10.0.0.2/32
DNS = 1.1.1.1

[Peer]
PublicKey = BBBBpublic=
AllowedIPs = 0.0.0.0/0, ::/0
Endpoint = 1.2.3.4:51820
";

    #[test]
    fn test_decode_ini_basic() {
        let Decoded::Match(outbound) = decode_ini(SAMPLE) else {
            panic!("Expected INI match");
        };
        assert_eq!(outbound.tag, "wireguard");
        assert!(outbound.stream.is_none());

        if let OutboundSettings::WireGuard(wg) = &outbound.settings {
            assert_eq!(wg.secret_key.as_deref(), Some("AAAAprivate="));
            assert_eq!(wg.address, Some(vec!["10.0.0.2/32".to_string()]));
            assert_eq!(wg.mtu, None);
            assert_eq!(wg.workers, None);
            let peers = wg.peers.as_ref().unwrap();
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].public_key.as_deref(), Some("BBBBpublic="));
            assert_eq!(peers[0].endpoint.as_deref(), Some("1.2.3.4:51820"));
            assert_eq!(
                peers[0].allowed_ips,
                Some(vec!["0.0.0.0/0".to_string(), "::/0".to_string()])
            );
        } else {
            panic!("Expected WireGuard settings");
        }
    }

    #[test]
    fn test_decode_ini_case_insensitive_with_comments() {
        let text = "; exported\n[interface]\nprivatekey=key\naddress=10.0.0.2/32\naddress=fd00::2/128\nmtu=1280\n# peers\n[PEER]\npublickey=pk\nendpoint=h:1\npersistentkeepalive=25\n";
        let Decoded::Match(outbound) = decode_ini(text) else {
            panic!("Expected INI match");
        };
        if let OutboundSettings::WireGuard(wg) = &outbound.settings {
            assert_eq!(
                wg.address,
                Some(vec!["10.0.0.2/32".to_string(), "fd00::2/128".to_string()])
            );
            assert_eq!(wg.mtu, Some(1280.into()));
            assert_eq!(wg.peers.as_ref().unwrap()[0].keep_alive, Some(25.into()));
        } else {
            panic!("Expected WireGuard settings");
        }
    }

    #[test]
    fn test_decode_ini_no_interface() {
        assert!(!decode_ini("[Peer]\nPublicKey = x").is_match());
        assert!(!decode_ini("vless://id@h:443").is_match());
    }

    #[test]
    fn test_decode_ini_missing_private_key() {
        let decoded = decode_ini("[Interface]\nAddress = 10.0.0.2/32");
        if let Decoded::NoMatch { reason } = decoded {
            assert!(reason.contains("PrivateKey"));
        } else {
            panic!("Expected NoMatch");
        }
    }
}
