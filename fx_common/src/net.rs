//! Shared networking constants and stream framing used by client and server.

/// TCP port for commands and quote streams.
pub const DEFAULT_PORT: u16 = 8080;

/// Prefix of every quote frame on a subscribed connection.
pub const FRAME_PREFIX: &[u8] = b"data: ";

/// Terminator of every quote frame.
pub const FRAME_SUFFIX: &[u8] = b"\n\n";

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// Wrap a serialized payload as a `data: ...\n\n` frame.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_PREFIX.len() + payload.len() + FRAME_SUFFIX.len());
    out.extend_from_slice(FRAME_PREFIX);
    out.extend_from_slice(payload);
    out.extend_from_slice(FRAME_SUFFIX);
    out
}

/// Extract the payload from one line of a quote stream.
///
/// Returns `None` for the blank separator line and anything that is not a data line.
pub fn unframe(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix("data: ")
        .filter(|payload| !payload.is_empty())
}
