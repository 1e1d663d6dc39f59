//! Hash Slot Algorithm - CRC16 mod 16384
//!
//! Bit-exact with the server: CRC16/XMODEM (polynomial 0x1021, initial
//! value 0) over the key or its hash tag.

use super::types::TOTAL_SLOTS;

const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
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

/// CRC16/XMODEM checksum
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        let idx = ((crc >> 8) ^ u16::from(byte)) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[idx];
    }
    crc
}

/// Hash tag of a key
///
/// The tag is the text between the first `{` and the first `}` after it,
/// and only counts when non-empty. `foo{}{bar}` therefore has no tag and
/// `foo{{bar}}` has the tag `{bar`.
fn extract_hash_tag(key: &[u8]) -> Option<&[u8]> {
    let start = key.iter().position(|&b| b == b'{')?;
    let len = key[start + 1..].iter().position(|&b| b == b'}')?;
    if len == 0 {
        return None;
    }
    Some(&key[start + 1..start + 1 + len])
}

/// Calculate the hash slot of a key (0-16383)
///
/// # Example
/// ```
/// use slotwise_router::cluster::hash_slot;
///
/// assert_eq!(hash_slot("foo"), 12182);
///
/// // Hash tags pin related keys to one slot
/// assert_eq!(hash_slot("{user1000}.following"), hash_slot("{user1000}.followers"));
/// ```
pub fn hash_slot(key: impl AsRef<[u8]>) -> u16 {
    let key = key.as_ref();
    let hash_key = extract_hash_tag(key).unwrap_or(key);
    crc16(hash_key) % TOTAL_SLOTS
}
