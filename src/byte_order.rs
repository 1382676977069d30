//! Network byte-order helpers for length prefixes.
//!
//! Clippy expectations stay scoped to these conversion points so codecs can
//! use them without repeating lint annotations.

/// Encode a `u32` length prefix in network byte order.
///
/// # Examples
///
/// ```
/// use wiresock::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x0000_0102), [0, 0, 1, 2]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Decode a `u32` length prefix from network byte order.
///
/// # Examples
///
/// ```
/// use wiresock::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0, 0, 1, 2]), 0x0102);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}
