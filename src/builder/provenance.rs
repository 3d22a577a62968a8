//! Path-based provenance over the entity being edited.
//!
//! A `Provenance` points at zero or more nodes of the original raw JSON. It
//! is descended alongside the model being built, and every defaulted field
//! asks it whether the same key was present in the original. The answer is
//! a three-way `FieldPresence`, not a value comparison: a default written
//! explicitly by the user survives a save, an implicit one never appears.

use serde_json::Value;

use crate::model::value::{coerce_number, split_list, NumOrStr};

/// How a defaulted field relates to its default and to the original entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPresence {
    /// Equal to the default and absent from the original: omitted
    AbsentByDefault,
    /// Equal to the default but written in the original: kept
    ExplicitDefault,
    /// Differs from the default: always emitted
    NonDefault,
}

impl FieldPresence {
    pub fn classify<T: PartialEq + ?Sized>(value: &T, default: &T, present: bool) -> Self {
        if value != default {
            FieldPresence::NonDefault
        } else if present {
            FieldPresence::ExplicitDefault
        } else {
            FieldPresence::AbsentByDefault
        }
    }

    pub fn emits(self) -> bool {
        self != FieldPresence::AbsentByDefault
    }
}

/// Cursor into the original entity.
///
/// Usually one node; a few legacy layouts (e.g. `vnext[0].users[0]` next to
/// flat settings) put several candidate nodes side by side.
#[derive(Clone, Debug, Default)]
pub struct Provenance<'a> {
    nodes: Vec<&'a Value>,
}

impl<'a> Provenance<'a> {
    pub fn new(original: Option<&'a Value>) -> Self {
        Self {
            nodes: original.into_iter().collect(),
        }
    }

    /// Descends into `key` of every object node
    pub fn child(&self, key: &str) -> Provenance<'a> {
        Provenance {
            nodes: self.nodes.iter().filter_map(|node| node.get(key)).collect(),
        }
    }

    /// Descends into element `index` of every array node
    pub fn index(&self, index: usize) -> Provenance<'a> {
        Provenance {
            nodes: self
                .nodes
                .iter()
                .filter_map(|node| node.get(index))
                .collect(),
        }
    }

    /// Adds the nodes of `other` as further candidates
    pub fn alongside(mut self, other: Provenance<'a>) -> Provenance<'a> {
        self.nodes.extend(other.nodes);
        self
    }

    /// Whether this path exists in the original at all
    pub fn exists(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Whether any node carries `key`
    pub fn has(&self, key: &str) -> bool {
        self.nodes.iter().any(|node| node.get(key).is_some())
    }

    /// Whether any node holds the string `expected` under `key`, ignoring case
    pub fn text_is(&self, key: &str, expected: &str) -> bool {
        self.nodes.iter().any(|node| {
            node.get(key)
                .and_then(Value::as_str)
                .is_some_and(|text| text.trim().eq_ignore_ascii_case(expected))
        })
    }

    /// Whether any node carries one of `keys` (a key and its legacy names)
    pub fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has(key))
    }

    pub fn presence<T: PartialEq + ?Sized>(&self, keys: &[&str], value: &T, default: &T) -> FieldPresence {
        FieldPresence::classify(value, default, self.has_any(keys))
    }

    // ------------------------------------------------------------------------
    // Defaulted field emitters
    // ------------------------------------------------------------------------

    /// Defaulted text field. A cleared field with a non-empty default is
    /// omitted rather than written as `""`.
    pub fn text(&self, key: &str, value: &str, default: &str) -> Option<String> {
        self.text_any(&[key], value, default)
    }

    /// Defaulted text field with legacy key names
    pub fn text_any(&self, keys: &[&str], value: &str, default: &str) -> Option<String> {
        let value = value.trim();
        match self.presence(keys, value, default) {
            FieldPresence::NonDefault if value.is_empty() => None,
            FieldPresence::AbsentByDefault => None,
            _ => Some(value.to_string()),
        }
    }

    /// Defaulted boolean field
    pub fn flag(&self, key: &str, value: bool, default: bool) -> Option<bool> {
        self.presence(&[key], &value, &default)
            .emits()
            .then_some(value)
    }

    /// Numeric field. Without a default it behaves like a required field;
    /// malformed input is omitted either way.
    pub fn number(&self, key: &str, raw: &str, default: Option<i64>) -> Option<NumOrStr> {
        let coerced = coerce_number(raw)?;
        match default {
            Some(default) if coerced == NumOrStr::Num(default) => {
                self.has(key).then_some(coerced)
            }
            _ => Some(coerced),
        }
    }

    /// Defaulted list field whose default is `[first]`; empty lists are omitted
    pub fn list_with_default(&self, key: &str, raw: &str, default: &[&str]) -> Option<Vec<String>> {
        let items = split_list(raw);
        if items.is_empty() {
            return None;
        }
        let is_default = items.iter().map(String::as_str).eq(default.iter().copied());
        (!is_default || self.has(key)).then_some(items)
    }
}

/// List field with an empty default; an empty result is omitted
pub fn list(raw: &str) -> Option<Vec<String>> {
    let items = split_list(raw);
    (!items.is_empty()).then_some(items)
}

/// Required text field: emitted whenever non-empty
pub fn required(raw: &str) -> Option<String> {
    crate::model::value::non_empty(raw)
}

/// A sub-object is emitted when it carries anything or the original had it
pub fn block<T: Default + PartialEq>(value: T, provenance: &Provenance<'_>) -> Option<T> {
    (value != T::default() || provenance.exists()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_three_ways() {
        assert_eq!(
            FieldPresence::classify("auto", "auto", false),
            FieldPresence::AbsentByDefault
        );
        assert_eq!(
            FieldPresence::classify("auto", "auto", true),
            FieldPresence::ExplicitDefault
        );
        assert_eq!(
            FieldPresence::classify("none", "auto", false),
            FieldPresence::NonDefault
        );
    }

    #[test]
    fn test_text_is_ignores_case() {
        let original = json!({"network": " RAW "});
        let root = Provenance::new(Some(&original));
        assert!(root.text_is("network", "raw"));
        assert!(!root.text_is("network", "tcp"));
        assert!(!Provenance::new(None).text_is("network", "raw"));
    }

    #[test]
    fn test_child_and_index_descend() {
        let original = json!({"settings": {"peers": [{"keepAlive": 0}]}});
        let root = Provenance::new(Some(&original));
        let peer = root.child("settings").child("peers").index(0);
        assert!(peer.has("keepAlive"));
        assert!(!root.child("settings").child("peers").index(1).exists());
        assert!(!Provenance::new(None).child("settings").exists());
    }

    #[test]
    fn test_text_keeps_explicit_default() {
        let original = json!({"allowInsecure": false, "fingerprint": ""});
        let tls = Provenance::new(Some(&original));
        assert_eq!(tls.text("fingerprint", "", ""), Some(String::new()));
        assert_eq!(tls.text("serverName", "", ""), None);
        assert_eq!(tls.flag("allowInsecure", false, false), Some(false));
        assert_eq!(tls.flag("rejectUnknownSni", false, false), None);
    }

    #[test]
    fn test_text_cleared_field_omitted() {
        let fresh = Provenance::new(None);
        assert_eq!(fresh.text("security", "", "auto"), None);
        assert_eq!(fresh.text("security", "zero", "auto"), Some("zero".into()));
    }

    #[test]
    fn test_legacy_key_counts_as_provenance() {
        let original = json!({"verifyPeerCertInNames": ["a.com"]});
        let tls = Provenance::new(Some(&original));
        assert_eq!(
            tls.text_any(&["verifyPeerCertByName", "verifyPeerCertInNames"], "", ""),
            Some(String::new())
        );
    }

    #[test]
    fn test_number_default_suppressed() {
        let fresh = Provenance::new(None);
        assert_eq!(fresh.number("mtu", "1420", Some(1420)), None);
        assert_eq!(fresh.number("mtu", "1280", Some(1420)), Some(NumOrStr::Num(1280)));
        assert_eq!(fresh.number("port", "abc", None), None);

        let original = json!({"mtu": 1420});
        let edited = Provenance::new(Some(&original));
        assert_eq!(edited.number("mtu", "1420", Some(1420)), Some(NumOrStr::Num(1420)));
    }

    #[test]
    fn test_alongside_merges_candidates() {
        let flat = json!({"address": "a"});
        let legacy = json!({"users": [{"security": "auto"}]});
        let merged = Provenance::new(Some(&flat))
            .alongside(Provenance::new(Some(&legacy)).child("users").index(0));
        assert!(merged.has("address"));
        assert!(merged.has("security"));
    }

    #[test]
    fn test_list_with_default() {
        let fresh = Provenance::new(None);
        assert_eq!(fresh.list_with_default("path", "/", &["/"]), None);
        assert_eq!(
            fresh.list_with_default("path", "/a,/b", &["/"]),
            Some(vec!["/a".to_string(), "/b".to_string()])
        );
        assert_eq!(list(" , "), None);
    }
}
