//! Protocol constants and checksum helpers

use crate::types::ChecksumType;

/// Timing and retry defaults
pub mod timing {
    /// Failed attempts tolerated by one transaction
    pub const DEFAULT_RETRY_BUDGET: u32 = 3;
    /// Per-read timeout (ms)
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
}

/// Calculate the checksum of `data`
///
/// Single-byte variants are returned in the low byte.
pub fn calculate_checksum(data: &[u8], checksum_type: ChecksumType) -> u16 {
    match checksum_type {
        ChecksumType::Sum8 { seed } => data.iter().fold(seed, |acc, &b| acc.wrapping_add(b)) as u16,
        ChecksumType::Xor8 { seed } => data.iter().fold(seed, |acc, &b| acc ^ b) as u16,
        ChecksumType::Complement8 => {
            let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            (255 - sum) as u16
        }
        ChecksumType::Sum16Le { seed } => data
            .iter()
            .fold(seed, |acc, &b| acc.wrapping_add(b as u16)),
    }
}

/// Write `value` into `out` in the checksum's wire representation
///
/// `out` must be exactly `checksum_type.width()` bytes.
pub fn write_checksum(out: &mut [u8], value: u16, checksum_type: ChecksumType) {
    match checksum_type {
        ChecksumType::Sum16Le { .. } => out.copy_from_slice(&value.to_le_bytes()),
        _ => out[0] = value as u8,
    }
}

/// Read a checksum stored by [`write_checksum`]
pub fn read_checksum(bytes: &[u8], checksum_type: ChecksumType) -> u16 {
    match checksum_type {
        ChecksumType::Sum16Le { .. } => u16::from_le_bytes([bytes[0], bytes[1]]),
        _ => bytes[0] as u16,
    }
}
