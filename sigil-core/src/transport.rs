//! Transport encoding for binary protocol fields
//!
//! Every binary value crossing the protocol boundary (challenge, credential
//! id, client-data JSON, attestation/assertion objects, signature,
//! authenticator data) travels as base64url without padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{CeremonyError, Result};

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an unpadded base64url string.
pub fn decode(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| CeremonyError::MalformedEncoding(format!("base64url: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let bytes = b"credential-handle-0001";
        let encoded = encode(bytes);
        assert!(!encoded.contains('='));
        assert_eq!(decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn rejects_invalid_input() {
        let result = decode("not base64url!");
        assert!(matches!(result, Err(CeremonyError::MalformedEncoding(_))));
    }

    #[test]
    fn thirty_two_bytes_encode_to_43_chars() {
        assert_eq!(encode(&[0u8; 32]).len(), 43);
    }
}
