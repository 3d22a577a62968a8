//! Text format detection
//!
//! Classifies pasted text as a link list, a Base64 subscription body,
//! WireGuard INI, or JSON, so the import pipeline can log what it saw and
//! unwrap Base64 bodies before handing lines to the link registry.

use tracing::debug;

use super::base64::decode_base64_text;

/// Link schemes recognised as share links
const LINK_SCHEMES: &[&str] = &[
    "vless://",
    "vmess://",
    "trojan://",
    "ss://",
    "socks://",
    "socks5://",
    "http://",
    "wireguard://",
    "wg://",
];

// ============================================================================
// Text Format Detection
// ============================================================================

/// Detected format of pasted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// One share link per line
    LinkList,
    /// Base64 encoded link list (subscription body)
    Base64LinkList,
    /// WireGuard `[Interface]` / `[Peer]` text
    Ini,
    /// JSON object or array
    Json,
    Unknown,
}

impl std::fmt::Display for TextFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextFormat::LinkList => write!(f, "Link list"),
            TextFormat::Base64LinkList => write!(f, "Base64 link list"),
            TextFormat::Ini => write!(f, "WireGuard INI"),
            TextFormat::Json => write!(f, "JSON"),
            TextFormat::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Detects the format of pasted text
pub fn detect_text_format(content: &str) -> TextFormat {
    let trimmed = content.trim();
    let preview: String = trimmed.chars().take(100).collect();
    debug!(
        "Detecting text format, content length: {} bytes, preview: {:?}...",
        content.len(),
        preview
    );

    let format = if is_json_like(trimmed) {
        TextFormat::Json
    } else if is_link_list(trimmed) {
        TextFormat::LinkList
    } else if is_ini(trimmed) {
        TextFormat::Ini
    } else if is_base64_content(trimmed) {
        TextFormat::Base64LinkList
    } else {
        TextFormat::Unknown
    };
    debug!("Detected {} format", format);
    format
}

/// Starts like a JSON object or array
pub fn is_json_like(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Contains a `[Interface]` section header
pub fn is_ini(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("[interface]"))
}

/// First meaningful line is a share link
pub fn is_link_list(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .is_some_and(is_share_link)
}

/// Checks if a string looks like a share link
pub fn is_share_link(s: &str) -> bool {
    let lowered = s.trim().to_ascii_lowercase();
    LINK_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme))
}

/// Checks if content is a Base64 body that decodes to share links
pub fn is_base64_content(content: &str) -> bool {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() < 4 {
        return false;
    }

    let is_valid_base64 = cleaned.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '-' || c == '_'
    });
    if !is_valid_base64 {
        return false;
    }

    decode_base64_text(&cleaned).is_ok_and(|decoded| decoded.lines().any(is_share_link))
}
