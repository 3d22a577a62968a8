//! Codec options
//!
//! Loaded from a TOML file; every field is optional:
//!
//! ```toml
//! pretty = true
//! fingerprint_digest = "sha256"   # or "fnv1a"
//! fingerprint_length = 16
//! dedupe_imports = false
//! unique_tags = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CodecError;
use crate::fingerprint::FingerprintDigest;

/// Shortest and longest accepted SHA-256 fingerprint, in hex chars
pub const FINGERPRINT_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 8..=64;

/// Options shared by the CLI and library callers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CodecOptions {
    /// Pretty-print JSON output
    pub pretty: bool,

    /// Digest used for entity fingerprints
    pub fingerprint_digest: FingerprintDigest,

    /// Hex chars kept from a SHA-256 fingerprint. FNV-1a always yields 8.
    pub fingerprint_length: usize,

    /// Drop imported entities whose fingerprint was already seen
    pub dedupe_imports: bool,

    /// Suffix duplicate tags (`-2`, `-3`, ...) after import
    pub unique_tags: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            fingerprint_digest: FingerprintDigest::default(),
            fingerprint_length: 16,
            dedupe_imports: false,
            unique_tags: true,
        }
    }
}

impl CodecOptions {
    /// Parse options from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, CodecError> {
        let options: CodecOptions = toml::from_str(content)
            .map_err(|e| CodecError::Options(format!("Failed to parse options TOML: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file, `~` expanded; no path means defaults
    pub async fn load(path: Option<&str>) -> Result<Self, CodecError> {
        let Some(path) = path else {
            debug!("No options file given, using defaults");
            return Ok(Self::default());
        };
        let expanded = expand_tilde(path);
        debug!("Loading codec options from: {}", expanded);
        let content = tokio::fs::read_to_string(Path::new(&expanded)).await?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), CodecError> {
        if !FINGERPRINT_LENGTH_RANGE.contains(&self.fingerprint_length) {
            return Err(CodecError::Options(format!(
                "fingerprint_length must be between {} and {}, got {}",
                FINGERPRINT_LENGTH_RANGE.start(),
                FINGERPRINT_LENGTH_RANGE.end(),
                self.fingerprint_length
            )));
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = CodecOptions::default();
        assert!(options.pretty);
        assert_eq!(options.fingerprint_digest, FingerprintDigest::Sha256);
        assert_eq!(options.fingerprint_length, 16);
        assert!(!options.dedupe_imports);
        assert!(options.unique_tags);
    }

    #[test]
    fn test_from_toml_partial() {
        let options = CodecOptions::from_toml("pretty = false\nfingerprint_digest = \"fnv1a\"").unwrap();
        assert!(!options.pretty);
        assert_eq!(options.fingerprint_digest, FingerprintDigest::Fnv1a);
        assert_eq!(options.fingerprint_length, 16);
    }

    #[test]
    fn test_from_toml_rejects_length_out_of_range() {
        assert!(matches!(
            CodecOptions::from_toml("fingerprint_length = 4"),
            Err(CodecError::Options(_))
        ));
        assert!(CodecOptions::from_toml("fingerprint_length = 65").is_err());
        assert!(CodecOptions::from_toml("fingerprint_length = 64").is_ok());
    }

    #[test]
    fn test_from_toml_rejects_unknown_digest() {
        assert!(CodecOptions::from_toml("fingerprint_digest = \"md5\"").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "dedupe_imports = true\nfingerprint_length = 32").unwrap();

        let options = CodecOptions::load(file.path().to_str()).await.unwrap();
        assert!(options.dedupe_imports);
        assert_eq!(options.fingerprint_length, 32);
    }

    #[tokio::test]
    async fn test_load_without_path_uses_defaults() {
        let options = CodecOptions::load(None).await.unwrap();
        assert_eq!(options, CodecOptions::default());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = CodecOptions::load(Some("/nonexistent/proxyform.toml")).await.unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/etc/proxyform.toml"), "/etc/proxyform.toml");
        assert_eq!(expand_tilde("rel/~x"), "rel/~x");
    }
}
