//! Shadowsocks link codec
//!
//! Decodes both link layouts found in the wild:
//! - SIP002: ss://BASE64URL(method:password)@host:port[/?params]#tag
//! - SIP002 with plain userinfo: ss://method:password@host:port#tag
//! - Legacy: ss://BASE64(method:password@host:port)#tag
//!
//! Encoding always produces SIP002 with a Base64url userinfo.

use anyhow::{Context, Result, anyhow};
use tracing::{trace, warn};
use url::form_urlencoded;

use crate::catalog::Protocol;
use crate::form::OutboundForm;

use super::base64::{decode_base64, encode_url_safe};
use super::params::{Params, apply_stream_params, stream_params, to_query};
use super::{LinkCodec, endpoint, fragment, parse_host_port};

/// Codec for Shadowsocks (ss://) links
pub struct ShadowsocksCodec;

impl LinkCodec for ShadowsocksCodec {
    fn scheme(&self) -> &str {
        "ss"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Shadowsocks
    }

    fn decode(&self, link: &str) -> Result<OutboundForm> {
        let link = link.trim();
        trace!("Decoding Shadowsocks link");

        let without_scheme = link
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("ss://"))
            .map(|_| &link[5..])
            .ok_or_else(|| anyhow!("Invalid Shadowsocks link: missing ss:// prefix"))?;

        let (main_part, tag) = match without_scheme.rfind('#') {
            Some(pos) => {
                let raw = &without_scheme[pos + 1..];
                let tag = urlencoding::decode(raw)
                    .unwrap_or_else(|_| raw.into())
                    .into_owned();
                (&without_scheme[..pos], tag)
            }
            None => (without_scheme, String::new()),
        };

        let mut form = if let Some(at_pos) = main_part.rfind('@') {
            trace!("Decoding as SIP002 (found @ separator)");
            decode_sip002(main_part, at_pos)?
        } else {
            trace!("Decoding as legacy Base64 layout");
            decode_legacy(main_part)?
        };
        form.tag = tag;
        Ok(form)
    }

    fn encode(&self, form: &OutboundForm) -> Result<String> {
        let (host, port) = endpoint(form)?;
        let userinfo = encode_url_safe(&format!("{}:{}", form.method.trim(), form.password));
        Ok(format!(
            "ss://{}@{}:{}?{}{}",
            userinfo,
            host,
            port,
            to_query(&stream_params(&form.stream)),
            fragment(&form.tag)
        ))
    }
}

fn shadowsocks_form(address: String, port: u16, method: String, password: String) -> OutboundForm {
    let mut form = OutboundForm::for_protocol(Protocol::Shadowsocks);
    form.address = address;
    form.port = port.to_string();
    if !method.trim().is_empty() {
        form.method = method.trim().to_string();
    }
    form.password = password;
    form
}

/// BASE64URL(method:password)@host:port or method:password@host:port,
/// optionally followed by `/?params`
fn decode_sip002(main_part: &str, at_pos: usize) -> Result<OutboundForm> {
    let userinfo = &main_part[..at_pos];
    let hostport_and_query = &main_part[at_pos + 1..];

    let (hostport_raw, query) = match hostport_and_query.find('?') {
        Some(q_pos) => (
            &hostport_and_query[..q_pos],
            &hostport_and_query[q_pos + 1..],
        ),
        None => (hostport_and_query, ""),
    };
    let (address, port) = parse_host_port(hostport_raw.trim_end_matches('/'))?;
    let (method, password) = parse_userinfo(userinfo)?;

    let params: Params = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    if let Some(plugin) = params.get("plugin").filter(|p| !p.is_empty()) {
        warn!(plugin = %plugin, "SIP003 plugins have no outbound equivalent, ignoring");
    }

    let mut form = shadowsocks_form(address, port, method, password);
    apply_stream_params(&mut form.stream, &params);
    Ok(form)
}

/// BASE64(method:password@host:port)
fn decode_legacy(main_part: &str) -> Result<OutboundForm> {
    let decoded = decode_base64(main_part)
        .and_then(|b| String::from_utf8(b).context("Invalid UTF-8 in Shadowsocks link"))
        .context("Failed to decode legacy Shadowsocks link")?;

    let at_pos = decoded
        .rfind('@')
        .ok_or_else(|| anyhow!("Invalid legacy Shadowsocks layout: missing @"))?;
    let (address, port) = parse_host_port(&decoded[at_pos + 1..])?;
    let (method, password) = split_method(&decoded[..at_pos])?;
    Ok(shadowsocks_form(address, port, method, password))
}

/// Userinfo is Base64(method:password) or percent-encoded method:password
fn parse_userinfo(userinfo: &str) -> Result<(String, String)> {
    if let Ok(decoded) = decode_base64(userinfo)
        && let Ok(text) = String::from_utf8(decoded)
        && text.contains(':')
    {
        return split_method(&text);
    }

    let decoded = urlencoding::decode(userinfo)
        .unwrap_or_else(|_| userinfo.into())
        .into_owned();
    split_method(&decoded)
}

fn split_method(userinfo: &str) -> Result<(String, String)> {
    let (method, password) = userinfo
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid Shadowsocks userinfo: missing method:password separator"))?;
    Ok((method.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Security, Transport};
    use crate::link::base64::encode_standard;

    #[test]
    fn test_shadowsocks_sip002_base64() {
        let form = ShadowsocksCodec
            .decode("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388#my-ss")
            .unwrap();
        assert_eq!(form.protocol, Protocol::Shadowsocks);
        assert_eq!(form.tag, "my-ss");
        assert_eq!(form.address, "example.com");
        assert_eq!(form.port, "8388");
        assert_eq!(form.method, "aes-256-gcm");
        assert_eq!(form.password, "password");
    }

    #[test]
    fn test_shadowsocks_sip002_plain_userinfo() {
        let form = ShadowsocksCodec
            .decode("ss://2022-blake3-aes-128-gcm:c2VjcmV0%3D@[2001:db8::1]:443")
            .unwrap();
        assert_eq!(form.method, "2022-blake3-aes-128-gcm");
        assert_eq!(form.password, "c2VjcmV0=");
        assert_eq!(form.address, "2001:db8::1");
        assert!(form.tag.is_empty());
    }

    #[test]
    fn test_shadowsocks_plugin_is_ignored() {
        let form = ShadowsocksCodec
            .decode("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388/?plugin=obfs-local%3Bobfs%3Dhttp#t")
            .unwrap();
        assert_eq!(form.method, "aes-256-gcm");
        assert_eq!(form.stream.network, Transport::Tcp);
    }

    #[test]
    fn test_shadowsocks_stream_params() {
        let form = ShadowsocksCodec
            .decode("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:443?type=ws&path=%2Fss&security=tls&sni=example.com#t")
            .unwrap();
        assert_eq!(form.stream.network, Transport::Ws);
        assert_eq!(form.stream.path, "/ss");
        assert_eq!(form.stream.security, Security::Tls);
    }

    #[test]
    fn test_shadowsocks_legacy() {
        let link = format!(
            "ss://{}#legacy",
            encode_standard("chacha20-ietf-poly1305:pass@1.2.3.4:8388")
        );
        let form = ShadowsocksCodec.decode(&link).unwrap();
        assert_eq!(form.tag, "legacy");
        assert_eq!(form.address, "1.2.3.4");
        assert_eq!(form.method, "chacha20-ietf-poly1305");
        assert_eq!(form.password, "pass");
    }

    #[test]
    fn test_shadowsocks_invalid() {
        assert!(ShadowsocksCodec.decode("ss://").is_err());
        assert!(ShadowsocksCodec.decode("ss://bm9jb2xvbg@example.com:8388").is_err());
        assert!(ShadowsocksCodec.decode("ss://YWVzOnB3@example.com").is_err());
    }

    #[test]
    fn test_shadowsocks_encode() {
        let mut form = OutboundForm::for_protocol(Protocol::Shadowsocks);
        form.tag = "ss".into();
        form.address = "example.com".into();
        form.port = "8388".into();
        form.method = "aes-256-gcm".into();
        form.password = "password".into();
        assert_eq!(
            ShadowsocksCodec.encode(&form).unwrap(),
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388?type=tcp#ss"
        );
    }
}
