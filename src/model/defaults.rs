//! Documented default values.
//!
//! A defaulted field equal to its value here is suppressed when building a
//! fresh entity. These are read-only tables; the form templates, the settings
//! templates and the builder all read from this one place.

// Outbound settings
pub const VMESS_SECURITY: &str = "auto";
pub const VLESS_ENCRYPTION: &str = "none";
pub const SHADOWSOCKS_METHOD: &str = "chacha20-ietf-poly1305";
pub const FREEDOM_DOMAIN_STRATEGY: &str = "AsIs";
pub const BLACKHOLE_RESPONSE: &str = "none";
pub const DNS_NON_IP_QUERY: &str = "drop";

// WireGuard
pub const WIREGUARD_MTU: i64 = 1420;
pub const WIREGUARD_WORKERS: i64 = 2;
pub const WIREGUARD_DOMAIN_STRATEGY: &str = "ForceIP";
pub const WIREGUARD_KEEP_ALIVE: i64 = 0;

// Inbound settings
pub const SHADOWSOCKS_INBOUND_NETWORK: &str = "tcp,udp";
pub const SOCKS_AUTH: &str = "noauth";

// Transports
pub const HEADER_NONE: &str = "none";
pub const HTTP_PATH: &str = "/";
pub const KCP_MTU: i64 = 1350;
pub const KCP_TTI: i64 = 50;
pub const KCP_UPLINK_CAPACITY: i64 = 5;
pub const KCP_DOWNLINK_CAPACITY: i64 = 20;
pub const XHTTP_MODE: &str = "auto";
pub const QUIC_SECURITY: &str = "none";

// Security layers
pub const REALITY_FINGERPRINT: &str = "chrome";
pub const REALITY_XVER: i64 = 0;

// Mux
pub const MUX_CONCURRENCY: i64 = 8;
pub const MUX_XUDP_CONCURRENCY: i64 = 16;
pub const MUX_XUDP_PROXY_UDP443: &str = "reject";
