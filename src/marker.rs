//! Boundary marker codec
//!
//! Every data block is bracketed by a fixed-width start and end marker.
//! Markers are a corruption heuristic only: a scanner that finds a start
//! marker without its matching end marker (or a wiped pattern where a
//! marker should be) knows the region is not a live block. They carry no
//! checksum and say nothing about the payload itself.

/// Width of each boundary marker in bytes.
pub const MARKER_LEN: usize = 8;

/// Pattern written at the start of every live block.
pub const MARKER_START: [u8; MARKER_LEN] = *b"<<<<<<<<";

/// Pattern written at the end of every live block.
pub const MARKER_END: [u8; MARKER_LEN] = *b">>>>>>>>";

/// Pattern overwriting both markers of a freed or rolled-back block.
pub const MARKER_WIPE: [u8; MARKER_LEN] = *b"00000000";

/// Combined length of the two markers bracketing a block.
pub const MARKER_OVERHEAD: u64 = (2 * MARKER_LEN) as u64;

/// Payload bytes a block of `block_len` total bytes can hold.
pub fn payload_len(block_len: u64) -> u64 {
    block_len.saturating_sub(MARKER_OVERHEAD)
}

/// True if a block of `block_len` bytes can hold both markers and at
/// least one payload byte.
pub fn holds_payload(block_len: u64) -> bool {
    block_len > MARKER_OVERHEAD
}

/// Decode an 8-byte region as a start marker.
pub fn is_start(bytes: &[u8]) -> bool {
    bytes == MARKER_START
}

/// Decode an 8-byte region as an end marker.
pub fn is_end(bytes: &[u8]) -> bool {
    bytes == MARKER_END
}

/// Decode an 8-byte region as the wiped pattern.
pub fn is_wiped(bytes: &[u8]) -> bool {
    bytes == MARKER_WIPE
}
