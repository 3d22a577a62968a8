//! Text import pipeline
//!
//! Pasted text is offered to each importer in turn (share links, then
//! WireGuard INI, then JSON). The first importer that matches wins; if none
//! does, the text is an invalid configuration.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder::{build_inbound, build_outbound};
use crate::error::CodecError;
use crate::fingerprint::{Fingerprinter, unique_tags};
use crate::ini::decode_ini;
use crate::link::base64::decode_base64_text;
use crate::link::detection::{TextFormat, detect_text_format, is_json_like, is_link_list};
use crate::link::{Decoded, LinkRegistry, parse_host_port};
use crate::options::CodecOptions;
use crate::projector::{project_inbound, project_outbound};

// ============================================================================
// Normalization
// ============================================================================

/// Re-canonicalizes an outbound: project, then rebuild against itself
pub fn normalize_outbound(value: &Value) -> Result<Value, CodecError> {
    let form = project_outbound(value);
    Ok(build_outbound(&form, Some(value)).to_value()?)
}

/// Re-canonicalizes an inbound: project, then rebuild against itself
pub fn normalize_inbound(value: &Value) -> Result<Value, CodecError> {
    let form = project_inbound(value);
    Ok(build_inbound(&form, Some(value)).to_value()?)
}

// ============================================================================
// Importer Trait
// ============================================================================

/// One textual format the pipeline understands
pub trait Importer: Send + Sync {
    fn name(&self) -> &str;

    /// `NoMatch` hands the text to the next importer; `Err` stops the pipeline
    fn import(&self, text: &str) -> Result<Decoded<Vec<Value>>, CodecError>;
}

/// Share links, one per line, optionally wrapped as a Base64 body
pub struct LinkImporter {
    registry: LinkRegistry,
}

impl Default for LinkImporter {
    fn default() -> Self {
        Self {
            registry: LinkRegistry::with_builtin_codecs(),
        }
    }
}

impl Importer for LinkImporter {
    fn name(&self) -> &str {
        "links"
    }

    fn import(&self, text: &str) -> Result<Decoded<Vec<Value>>, CodecError> {
        let content = match detect_text_format(text) {
            TextFormat::LinkList => text.to_string(),
            TextFormat::Base64LinkList => decode_base64_text(text)?,
            other => return Ok(Decoded::no_match(format!("{} is not a link list", other))),
        };
        if !is_link_list(&content) {
            return Ok(Decoded::no_match("No share links found"));
        }

        let outbounds = self.registry.decode_list_lossy(&content);
        if outbounds.is_empty() {
            return Ok(Decoded::no_match("No share link could be decoded"));
        }
        let values = outbounds
            .iter()
            .map(|outbound| {
                let mut value = outbound.to_value()?;
                name_after_endpoint(&mut value);
                Ok(value)
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Decoded::Match(values))
    }
}

/// Tags an untagged imported outbound `host:port`
fn name_after_endpoint(value: &mut Value) {
    if value.get("tag").is_some() {
        return;
    }
    let form = project_outbound(value);
    let (address, port) = match form.peers.first() {
        Some(peer) => parse_host_port(&peer.endpoint)
            .map(|(host, port)| (host, port.to_string()))
            .unwrap_or_else(|_| (peer.endpoint.clone(), String::new())),
        None => (form.address, form.port),
    };
    let tag = match (address.is_empty(), port.is_empty()) {
        (true, _) => form.protocol.to_string(),
        (false, true) => address,
        (false, false) => format!("{}:{}", address, port),
    };
    if let Some(map) = value.as_object_mut() {
        map.insert("tag".to_string(), Value::String(tag));
    }
}

/// WireGuard `[Interface]` / `[Peer]` text
pub struct IniImporter;

impl Importer for IniImporter {
    fn name(&self) -> &str {
        "ini"
    }

    fn import(&self, text: &str) -> Result<Decoded<Vec<Value>>, CodecError> {
        match decode_ini(text) {
            Decoded::Match(outbound) => Ok(Decoded::Match(vec![outbound.to_value()?])),
            Decoded::NoMatch { reason } => Ok(Decoded::NoMatch { reason }),
        }
    }
}

/// A JSON entity, an array of entities, or a document with `outbounds`
/// and/or `inbounds` arrays
pub struct JsonImporter;

impl JsonImporter {
    fn entities(
        items: &[Value],
        normalize: fn(&Value) -> Result<Value, CodecError>,
        out: &mut Vec<Value>,
    ) -> Result<(), CodecError> {
        for (i, item) in items.iter().enumerate() {
            if item.get("protocol").and_then(Value::as_str).is_none() {
                warn!("Skipping JSON entry {}: no protocol", i);
                continue;
            }
            out.push(normalize(item)?);
        }
        Ok(())
    }
}

impl Importer for JsonImporter {
    fn name(&self) -> &str {
        "json"
    }

    fn import(&self, text: &str) -> Result<Decoded<Vec<Value>>, CodecError> {
        if !is_json_like(text) {
            return Ok(Decoded::no_match("Not JSON"));
        }
        let document: Value = serde_json::from_str(text)?;

        let mut values = Vec::new();
        match &document {
            Value::Array(items) => Self::entities(items, normalize_outbound, &mut values)?,
            Value::Object(map) if map.contains_key("outbounds") || map.contains_key("inbounds") => {
                if let Some(Value::Array(items)) = map.get("outbounds") {
                    Self::entities(items, normalize_outbound, &mut values)?;
                }
                if let Some(Value::Array(items)) = map.get("inbounds") {
                    Self::entities(items, normalize_inbound, &mut values)?;
                }
            }
            Value::Object(_) => {
                Self::entities(std::slice::from_ref(&document), normalize_outbound, &mut values)?
            }
            _ => {}
        }

        if values.is_empty() {
            return Ok(Decoded::no_match("JSON holds no entity with a protocol"));
        }
        Ok(Decoded::Match(values))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ordered list of importers plus post-processing options
pub struct ImportPipeline {
    importers: Vec<Box<dyn Importer>>,
    options: CodecOptions,
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl ImportPipeline {
    /// Creates a pipeline with the built-in importers in their fixed order
    pub fn new(options: CodecOptions) -> Self {
        Self {
            importers: vec![
                Box::new(LinkImporter::default()),
                Box::new(IniImporter),
                Box::new(JsonImporter),
            ],
            options,
        }
    }

    /// Imports pasted text into canonical entities
    pub fn import(&self, text: &str) -> Result<Vec<Value>, CodecError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CodecError::InvalidConfiguration("input is empty".to_string()));
        }

        let mut reasons = Vec::new();
        for importer in &self.importers {
            match importer.import(text)? {
                Decoded::Match(values) => {
                    info!(
                        "Imported {} entities with the {} importer",
                        values.len(),
                        importer.name()
                    );
                    return Ok(self.post_process(values));
                }
                Decoded::NoMatch { reason } => {
                    debug!("{} importer: {}", importer.name(), reason);
                    reasons.push(format!("{}: {}", importer.name(), reason));
                }
            }
        }
        Err(CodecError::InvalidConfiguration(reasons.join("; ")))
    }

    fn post_process(&self, values: Vec<Value>) -> Vec<Value> {
        let mut values = if self.options.dedupe_imports {
            Fingerprinter::from_options(&self.options).dedupe(values)
        } else {
            values
        };
        if self.options.unique_tags {
            unique_tags(&mut values);
        }
        values
    }
}
