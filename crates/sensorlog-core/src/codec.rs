//! Reading codec: integer readings as left-aligned, NUL-padded ASCII blocks.

use crate::error::DecodeError;
use crate::types::{Block, BLOCK_LEN};

/// Encode a reading as its ASCII decimal form, left-aligned and zero-padded.
///
/// Every `i64` fits: the longest form is 20 bytes.
pub fn encode(value: i64) -> Block {
    let digits = value.to_string();
    let mut block = [0u8; BLOCK_LEN];
    block[..digits.len()].copy_from_slice(digits.as_bytes());
    block
}

/// Decode a plaintext block back into a reading.
///
/// Trailing NUL bytes are padding and are trimmed before parsing. Anything
/// else that is not a signed decimal integer is an error.
pub fn decode(block: &Block) -> Result<i64, DecodeError> {
    let len = block
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    if len == 0 {
        return Err(DecodeError::Empty);
    }
    let text = std::str::from_utf8(&block[..len]).map_err(|_| DecodeError::NotUtf8)?;
    text.parse::<i64>()
        .map_err(|_| DecodeError::NotNumeric(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let block = encode(-42);
        assert_eq!(&block[..3], b"-42");
        assert!(block[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_extremes() {
        for v in [0, 1, -1, 600, i64::MAX, i64::MIN] {
            assert_eq!(decode(&encode(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_decode_all_zero_is_error() {
        assert_eq!(decode(&[0u8; 32]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let mut block = [0u8; 32];
        block[..4].copy_from_slice(b"12ab");
        assert!(matches!(decode(&block), Err(DecodeError::NotNumeric(_))));

        // ciphertext-looking bytes are never read as zero
        let noise = [0xA5u8; 32];
        assert!(decode(&noise).is_err());
    }

    #[test]
    fn test_decode_interior_nul_is_error() {
        let mut block = [0u8; 32];
        block[0] = b'1';
        block[2] = b'2';
        assert!(decode(&block).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_inverts_encode(v in any::<i64>()) {
                prop_assert_eq!(decode(&encode(v)).unwrap(), v);
            }
        }
    }
}
