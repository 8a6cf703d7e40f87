/// One's complement of the 8-bit sum of `data`, as used by the MAC block protocol.
///
/// The chip computes it over the two address bytes followed by the payload; the
/// checksum and length bytes themselves are never part of the sum. An empty
/// input has no checksum and yields 0.
///
/// ```rust
/// # use bq35100::checksum;
/// assert_eq!(checksum(&[]), 0x00);
/// assert_eq!(checksum(&[0x00]), 0xFF);
/// assert_eq!(checksum(&[0x00, 0x40, 0x01]), 0xBE);
/// assert_eq!(checksum(&[0x80, 0x7F]), 0x00);
/// ```
pub fn checksum(data: &[u8]) -> u8 {
    if data.is_empty() {
        return 0;
    }

    let sum = data.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));

    0xFF - sum
}
