//! Payload masking for client-originated frames (RFC 6455 §5.3).

use crate::error::{Error, Result};

/// Byte-by-byte XOR masking: `data[i] ^= mask[i % 4]`.
///
/// Masking is its own inverse, so the same call unmasks.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time masking, equivalent to [`apply_mask`].
///
/// Processes 4-byte chunks as `u32` and falls back to byte XOR for the tail.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_u32;
        chunk.copy_from_slice(&val.to_ne_bytes());
    }
    for (byte, m) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= m;
    }
}

/// Draw a fresh masking key from the operating system's CSPRNG.
///
/// # Errors
///
/// Returns [`Error::Io`] if the OS random source is unavailable. Client
/// frames are never sent unmasked, so there is no fallback key.
pub fn random_mask() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key).map_err(|e| Error::Io {
        kind: std::io::ErrorKind::Other,
        message: format!("random source unavailable: {e}"),
    })?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_reversible() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let original = b"Hello, WebSocket!".to_vec();
        let mut data = original.clone();

        apply_mask(&mut data, mask);
        assert_ne!(data, original);

        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_masking_example_from_rfc() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();

        apply_mask(&mut data, mask);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_masking_empty() {
        let mut data: Vec<u8> = vec![];
        apply_mask_fast(&mut data, [0x12, 0x34, 0x56, 0x78]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_masking_cycles_every_four_bytes() {
        let mask = [0x11, 0x22, 0x33, 0x44];
        let mut data = vec![0x00; 9];
        apply_mask(&mut data, mask);
        assert_eq!(
            data,
            vec![0x11, 0x22, 0x33, 0x44, 0x11, 0x22, 0x33, 0x44, 0x11]
        );
    }

    #[test]
    fn test_masking_fast_equivalent() {
        let mask = [0xab, 0xcd, 0xef, 0x12];
        for len in 0..37 {
            let original: Vec<u8> = (0..len as u8).collect();
            let mut slow = original.clone();
            let mut fast = original.clone();

            apply_mask(&mut slow, mask);
            apply_mask_fast(&mut fast, mask);

            assert_eq!(slow, fast, "mismatch at len {len}");
        }
    }

    #[test]
    fn test_random_masks_differ() {
        let keys: Vec<_> = (0..8).map(|_| random_mask().unwrap()).collect();
        assert!(keys.windows(2).any(|w| w[0] != w[1]));
    }
}
