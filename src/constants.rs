//! Constants and configuration for the routing-table core.

/// Longest stride a single level may consume. The fringe-index extractor
/// decodes one stride from at most four bytes.
pub const MAX_STRIDE: u8 = 24;

/// Longest supported address, in bits (IPv6).
pub const MAX_ADDR_BITS: u8 = 128;

/// Bytes needed for the longest supported address.
pub const MAX_ADDR_BYTES: usize = 16;

/// Default stride plan for 32-bit (IPv4) tables.
pub const IPV4_STRIDES: [u8; 3] = [16, 8, 8];

/// Default stride plan for 128-bit (IPv6) tables.
pub const IPV6_STRIDES: [u8; 15] = [16, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8];
