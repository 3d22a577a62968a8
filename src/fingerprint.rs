//! Entity fingerprints
//!
//! Two entities that differ only in tag or key order are the same
//! connection. The fingerprint hashes a canonical text of the entity:
//! top-level `tag` removed, object keys sorted at every depth, compact JSON.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::options::CodecOptions;

/// Hash function behind a fingerprint
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintDigest {
    /// SHA-256, hex, truncated to the configured length
    #[default]
    Sha256,
    /// 32-bit FNV-1a, 8 hex chars
    Fnv1a,
}

// ============================================================================
// Canonical Text
// ============================================================================

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key.clone(), sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Tag-free, key-sorted compact JSON of an entity
pub fn canonical_text(entity: &Value) -> String {
    let mut canonical = sorted(entity);
    if let Value::Object(map) = &mut canonical {
        map.remove("tag");
    }
    canonical.to_string()
}

// ============================================================================
// Digests
// ============================================================================

pub fn fnv1a_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes fingerprints with one digest configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprinter {
    digest: FingerprintDigest,
    length: usize,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::from_options(&CodecOptions::default())
    }
}

impl Fingerprinter {
    pub fn new(digest: FingerprintDigest, length: usize) -> Self {
        Self {
            digest,
            length: length.clamp(1, 64),
        }
    }

    pub fn from_options(options: &CodecOptions) -> Self {
        Self::new(options.fingerprint_digest, options.fingerprint_length)
    }

    /// Fingerprint of one entity
    pub fn fingerprint(&self, entity: &Value) -> String {
        let text = canonical_text(entity);
        match self.digest {
            FingerprintDigest::Sha256 => {
                let mut hex = sha256_hex(text.as_bytes());
                hex.truncate(self.length);
                hex
            }
            FingerprintDigest::Fnv1a => format!("{:08x}", fnv1a_hash(text.as_bytes())),
        }
    }

    /// Keeps the first entity per fingerprint, preserving order
    pub fn dedupe(&self, entities: Vec<Value>) -> Vec<Value> {
        let total = entities.len();
        let mut seen = HashSet::new();
        let kept: Vec<Value> = entities
            .into_iter()
            .filter(|entity| seen.insert(self.fingerprint(entity)))
            .collect();
        debug!("Dedupe kept {} of {} entities", kept.len(), total);
        kept
    }
}

/// Suffixes repeated tags with `-2`, `-3`, ... so every tag is unique
///
/// Suffixed names that are already taken are skipped. Entities without a
/// string tag are left alone.
pub fn unique_tags(entities: &mut [Value]) {
    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();

    for entity in entities.iter_mut() {
        let Some(map) = entity.as_object_mut() else {
            continue;
        };
        let Some(tag) = map.get("tag").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };

        if taken.insert(tag.clone()) {
            continue;
        }
        let counter = counters.entry(tag.clone()).or_insert(1);
        let renamed = loop {
            *counter += 1;
            let candidate = format!("{}-{}", tag, counter);
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        debug!("Renaming duplicate tag '{}' to '{}'", tag, renamed);
        taken.insert(renamed.clone());
        map.insert("tag".to_string(), Value::String(renamed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_ignores_tag_and_key_order() {
        let a = json!({"tag": "a", "protocol": "vless", "settings": {"address": "h", "port": 443}});
        let b = json!({"settings": {"port": 443, "address": "h"}, "protocol": "vless", "tag": "b"});
        let fp = Fingerprinter::default();
        assert_eq!(fp.fingerprint(&a), fp.fingerprint(&b));
        assert_eq!(fp.fingerprint(&a).len(), 16);
    }

    #[test]
    fn test_fingerprint_differs_on_content() {
        let fp = Fingerprinter::default();
        let a = json!({"protocol": "vless", "settings": {"port": 443}});
        let b = json!({"protocol": "vless", "settings": {"port": 444}});
        assert_ne!(fp.fingerprint(&a), fp.fingerprint(&b));
    }

    #[test]
    fn test_nested_tag_is_kept() {
        let fp = Fingerprinter::default();
        let a = json!({"settings": {"tag": "x"}});
        let b = json!({"settings": {"tag": "y"}});
        assert_ne!(fp.fingerprint(&a), fp.fingerprint(&b));
    }

    #[test]
    fn test_canonical_text() {
        let text = canonical_text(&json!({"tag": "t", "b": 1, "a": {"d": [2, {"f": 1, "e": 0}], "c": null}}));
        assert_eq!(text, r#"{"a":{"c":null,"d":[2,{"e":0,"f":1}]},"b":1}"#);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_length() {
        let entity = json!({"protocol": "freedom"});
        let full = Fingerprinter::new(FingerprintDigest::Sha256, 64).fingerprint(&entity);
        let short = Fingerprinter::new(FingerprintDigest::Sha256, 8).fingerprint(&entity);
        assert_eq!(full.len(), 64);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn test_fnv1a() {
        assert_eq!(fnv1a_hash(b""), 0x811c9dc5);
        assert_eq!(fnv1a_hash(b"a"), 0xe40c292c);
        let fp = Fingerprinter::new(FingerprintDigest::Fnv1a, 16).fingerprint(&json!({}));
        assert_eq!(fp.len(), 8);
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let fp = Fingerprinter::default();
        let entities = vec![
            json!({"tag": "first", "protocol": "freedom"}),
            json!({"tag": "second", "protocol": "freedom"}),
            json!({"tag": "third", "protocol": "blackhole"}),
        ];
        let kept = fp.dedupe(entities);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0]["tag"], "first");
        assert_eq!(kept[1]["tag"], "third");
    }

    #[test]
    fn test_unique_tags() {
        let mut entities = vec![
            json!({"tag": "node"}),
            json!({"tag": "node"}),
            json!({"tag": "node-2"}),
            json!({"tag": "node"}),
            json!({"protocol": "freedom"}),
        ];
        unique_tags(&mut entities);
        let tags: Vec<_> = entities.iter().map(|e| e.get("tag").cloned()).collect();
        assert_eq!(
            tags,
            vec![
                Some(json!("node")),
                Some(json!("node-2")),
                Some(json!("node-2-2")),
                Some(json!("node-3")),
                None,
            ]
        );
    }
}
