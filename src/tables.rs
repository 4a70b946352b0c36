//! Lookup tables shared by every frame the printer understands.
//!
//! Both tables are computed at compile time.

/// CRC-8/CCITT (poly 0x07, init 0x00, no reflection, no final xor) of each single byte.
pub const CRC8: [u8; 256] = build_crc8();

/// Bit reversal of each byte, `MIRROR[0x80] == 0x01`.
pub const MIRROR: [u8; 256] = build_mirror();

const fn build_crc8() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn build_mirror() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut out = 0u8;
        let mut bit = 0;
        while bit < 8 {
            if i & (1 << bit) != 0 {
                out |= 0x80 >> bit;
            }
            bit += 1;
        }
        table[i] = out;
        i += 1;
    }
    table
}

/// CRC-8/CCITT over `data`.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| CRC8[(crc ^ b) as usize])
}

/// CRC-8/CCITT over `buf[start..start + count]`.
///
/// Panics if the range is outside `buf`.
pub fn checksum(buf: &[u8], start: usize, count: usize) -> u8 {
    crc8(&buf[start..start + count])
}

#[inline]
pub fn mirror(b: u8) -> u8 {
    MIRROR[b as usize]
}
