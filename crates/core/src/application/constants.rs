// Capture pipeline constants (No magic values)

/// Longest stderr excerpt or line sample copied into a diagnostic event
pub const MAX_EXCERPT_CHARS: usize = 500;

/// Reply deadline for the single gateway probe packet (seconds)
pub const PING_DEADLINE_SECS: u32 = 2;

/// Link-query output marker for an administratively/operationally down interface
pub const IFACE_DOWN_MARKER: &str = "state DOWN";

/// Address-query output marker for a bound IPv4 address
pub const INET_MARKER: &str = "inet ";

/// Platform link/address/route query tool
pub const IP_TOOL: &str = "ip";

/// Gateway probe tool
pub const PING_TOOL: &str = "ping";
