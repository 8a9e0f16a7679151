//! Base64 and hex helpers with uniform error mapping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{CryptoError, Result};

/// Encode bytes with the standard base64 alphabet.
pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a standard-alphabet base64 string.
pub fn b64_decode(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| CryptoError::Decode(format!("base64: {e}")))
}

/// Encode bytes as lowercase hex.
pub fn hex_encode(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string.
pub fn hex_decode(encoded: &str) -> Result<Vec<u8>> {
    hex::decode(encoded).map_err(|e| CryptoError::Decode(format!("hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b64_roundtrip() {
        let data = vec![0u8, 1, 2, 253, 254, 255];
        assert_eq!(b64_decode(&b64_encode(&data)).expect("decode"), data);
    }

    #[test]
    fn test_b64_invalid_rejected() {
        assert!(b64_decode("not base64 !!").is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        let data = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(hex_encode(&data), "deadbeef");
        assert_eq!(hex_decode("deadbeef").expect("decode"), data);
    }

    #[test]
    fn test_hex_invalid_rejected() {
        assert!(hex_decode("zz").is_err());
    }
}
