//! Named address ranges and endpoint bundles.
//!
//! These are additive: selecting a preset appends its entries to whatever
//! was configured explicitly.

/// IPv4 and IPv6 loopback.
pub const LOOPBACK_RANGES: &[&str] = &["127.0.0.0/8", "::1/128"];

/// RFC 1918 blocks plus IPv6 unique-local (RFC 4193) and the deprecated
/// site-local block (RFC 3879).
pub const PRIVATE_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "fc00::/7",
    "fec0::/10",
];

/// Read-only XML status endpoints of the controller.
pub const XML_ENDPOINTS: &[&str] = &[
    "/cgi-bin/datalog.xml",
    "/cgi-bin/outlog.xml",
    "/cgi-bin/status.xml",
];

/// Read-only JSON status endpoints of the controller.
pub const JSON_ENDPOINTS: &[&str] = &[
    "/cgi-bin/datalog.json",
    "/cgi-bin/outlog.json",
    "/cgi-bin/status.json",
];
