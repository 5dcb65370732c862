//! CRC-32 (IEEE polynomial 0xEDB88320)
//!
//! Used to assign spec files to shards so that a file always lands in the
//! same shard regardless of what else is in the suite.

const TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-32 checksum of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = TABLE[idx] ^ (crc >> 8);
    }
    !crc
}

/// Zero-padded lowercase hex string of a 32-bit value
pub fn to_hex_string(value: u32) -> String {
    format!("{:08x}", value)
}
