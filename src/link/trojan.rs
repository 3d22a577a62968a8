//! Trojan link codec
//!
//! Format: trojan://password@host:port?params#tag

use anyhow::{Result, anyhow, bail};
use tracing::trace;
use url::Url;

use crate::catalog::Protocol;
use crate::form::OutboundForm;

use super::params::{Params, apply_stream_params, stream_params, to_query};
use super::{LinkCodec, decode_component, endpoint, fragment, host_port, tag_from};

/// Codec for Trojan (trojan://) links
pub struct TrojanCodec;

impl LinkCodec for TrojanCodec {
    fn scheme(&self) -> &str {
        "trojan"
    }

    fn protocol(&self) -> Protocol {
        Protocol::Trojan
    }

    fn decode(&self, link: &str) -> Result<OutboundForm> {
        trace!("Decoding Trojan link");
        let url = Url::parse(link).map_err(|e| anyhow!("Failed to parse Trojan link: {}", e))?;

        let password = decode_component(url.username());
        if password.is_empty() {
            bail!("Trojan link missing password");
        }
        let (address, port) = host_port(&url)?;
        let params: Params = url.query_pairs().into_owned().collect();

        let mut form = OutboundForm::for_protocol(Protocol::Trojan);
        form.tag = tag_from(&url);
        form.address = address;
        form.port = port.to_string();
        form.password = password;
        apply_stream_params(&mut form.stream, &params);
        Ok(form)
    }

    fn encode(&self, form: &OutboundForm) -> Result<String> {
        let (host, port) = endpoint(form)?;
        if form.password.is_empty() {
            bail!("Trojan outbound has no password to export");
        }
        Ok(format!(
            "trojan://{}@{}:{}?{}{}",
            urlencoding::encode(&form.password),
            host,
            port,
            to_query(&stream_params(&form.stream)),
            fragment(&form.tag)
        ))
    }
}
