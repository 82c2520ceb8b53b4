/// Residual left by `crc16` over a block followed by its complemented checksum.
pub(crate) const CRC_RESIDUAL_OK: u16 = 0xf0b8;

/// CRC-16 (ISO 13239) as computed by the key over frames and responses.
pub(crate) fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            let carry = crc & 1;
            crc >>= 1;
            if carry != 0 {
                crc ^= 0x8408;
            }
        }
    }
    crc
}
