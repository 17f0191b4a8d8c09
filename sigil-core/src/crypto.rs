//! Challenge generation and ES256 signature verification

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CeremonyError, Result};
use crate::transport;

/// Number of random bytes in a ceremony challenge.
pub const CHALLENGE_BYTES: usize = 32;

/// Generate a fresh random challenge, encoded as unpadded base64url
/// (32 bytes, 43 characters).
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    transport::encode(&bytes)
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verify a DER-encoded ECDSA/P-256/SHA-256 signature over `message`.
pub fn verify_es256(key: &VerifyingKey, message: &[u8], signature_der: &[u8]) -> Result<()> {
    let signature = Signature::from_der(signature_der)
        .map_err(|_| CeremonyError::SignatureVerificationFailed)?;

    key.verify(message, &signature)
        .map_err(|_| CeremonyError::SignatureVerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer, SigningKey};

    #[test]
    fn challenges_are_43_chars_and_unique() {
        let a = generate_challenge();
        let b = generate_challenge();
        assert_eq!(a.len(), 43);
        assert_eq!(transport::decode(&a).unwrap().len(), CHALLENGE_BYTES);
        assert_ne!(a, b);
    }

    #[test]
    fn verifies_a_valid_signature() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let message = b"authenticator data || client data hash";
        let signature: Signature = signing_key.sign(message);

        let key = VerifyingKey::from(&signing_key);
        assert!(verify_es256(&key, message, signature.to_der().as_bytes()).is_ok());
    }

    #[test]
    fn rejects_a_tampered_message() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let message = b"original message".to_vec();
        let signature: Signature = signing_key.sign(&message);

        let mut tampered = message.clone();
        tampered[0] ^= 0x01;

        let key = VerifyingKey::from(&signing_key);
        let result = verify_es256(&key, &tampered, signature.to_der().as_bytes());
        assert!(matches!(
            result,
            Err(CeremonyError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn rejects_garbage_der() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let key = VerifyingKey::from(&signing_key);
        let result = verify_es256(&key, b"message", &[0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            result,
            Err(CeremonyError::SignatureVerificationFailed)
        ));
    }
}
