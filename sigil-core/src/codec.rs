//! Binary codec for attestation objects and authenticator data
//!
//! Attestation objects are CBOR maps; authenticator data is a fixed-layout
//! byte structure embedded inside them. Both arrive from the network and are
//! parsed as adversarial input: every length field is bounds-checked against
//! the remaining buffer before it is used.

use ciborium::Value;

use crate::error::{CeremonyError, Result};

/// User-present flag (UP).
pub const FLAG_USER_PRESENT: u8 = 0x01;
/// User-verified flag (UV).
pub const FLAG_USER_VERIFIED: u8 = 0x04;
/// Attested-credential-data-included flag (AT).
pub const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

const AUTH_DATA_MIN_LEN: usize = 37;
const AAGUID_LEN: usize = 16;
const CRED_ID_LEN_OFFSET: usize = AUTH_DATA_MIN_LEN + AAGUID_LEN;

/// Decode a CBOR byte string into a generic value tree.
///
/// ciborium reads from the slice and cannot over-allocate from a declared
/// length, so truncated and type-mismatched input surface here as decode
/// errors.
pub fn decode_cbor(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes).map_err(|e| CeremonyError::MalformedEncoding(e.to_string()))
}

/// Look up an integer label in a decoded CBOR map.
pub(crate) fn map_get_int<'a>(entries: &'a [(Value, Value)], label: i64) -> Option<&'a Value> {
    entries.iter().find_map(|(key, value)| match key {
        Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(value),
        _ => None,
    })
}

/// Look up a text label in a decoded CBOR map.
pub(crate) fn map_get_text<'a>(entries: &'a [(Value, Value)], label: &str) -> Option<&'a Value> {
    entries.iter().find_map(|(key, value)| match key {
        Value::Text(t) if t == label => Some(value),
        _ => None,
    })
}

/// Top-level attestation object returned by a client during registration.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    /// Attestation statement format ("none", "packed", ...)
    pub fmt: String,
    /// Raw authenticator data bytes
    pub auth_data: Vec<u8>,
    /// Attestation statement, format-specific
    pub att_stmt: Value,
}

impl AttestationObject {
    /// Decode the CBOR attestation object and pull out its three fields.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value = decode_cbor(bytes)?;
        let entries = value.as_map().ok_or_else(|| {
            CeremonyError::MalformedEncoding("attestation object is not a map".to_string())
        })?;

        let fmt = map_get_text(entries, "fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| {
                CeremonyError::MalformedEncoding("attestation object missing fmt".to_string())
            })?
            .to_string();

        let auth_data = map_get_text(entries, "authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                CeremonyError::MalformedEncoding("attestation object missing authData".to_string())
            })?
            .clone();

        let att_stmt = map_get_text(entries, "attStmt").cloned().ok_or_else(|| {
            CeremonyError::MalformedEncoding("attestation object missing attStmt".to_string())
        })?;

        Ok(Self {
            fmt,
            auth_data,
            att_stmt,
        })
    }
}

/// Attested credential data, present when the AT flag is set.
#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// CBOR-encoded COSE key, everything after the credential id
    pub cose_key: Vec<u8>,
}

/// Fixed-layout authenticator data structure.
///
/// Layout: `rpIdHash (32) || flags (1) || signCount (4, big-endian)`,
/// followed by attested credential data when the AT flag is set:
/// `aaguid (16) || credentialIdLength (2, big-endian) || credentialId ||
/// credentialPublicKey`.
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredential>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < AUTH_DATA_MIN_LEN {
            return Err(CeremonyError::TruncatedAuthenticatorData(format!(
                "{} bytes, need at least {}",
                bytes.len(),
                AUTH_DATA_MIN_LEN
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            Some(Self::parse_attested_credential(bytes)?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredential> {
        if bytes.len() < CRED_ID_LEN_OFFSET + 2 {
            return Err(CeremonyError::TruncatedAuthenticatorData(
                "attested credential section shorter than aaguid + length".to_string(),
            ));
        }

        let mut aaguid = [0u8; 16];
        aaguid.copy_from_slice(&bytes[AUTH_DATA_MIN_LEN..CRED_ID_LEN_OFFSET]);

        let id_len =
            u16::from_be_bytes([bytes[CRED_ID_LEN_OFFSET], bytes[CRED_ID_LEN_OFFSET + 1]]) as usize;
        let id_start = CRED_ID_LEN_OFFSET + 2;

        if bytes.len() < id_start + id_len {
            return Err(CeremonyError::TruncatedAuthenticatorData(format!(
                "credential id length {} exceeds remaining {} bytes",
                id_len,
                bytes.len() - id_start
            )));
        }

        Ok(AttestedCredential {
            aaguid,
            credential_id: bytes[id_start..id_start + id_len].to_vec(),
            cose_key: bytes[id_start + id_len..].to_vec(),
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_data_bytes(flags: u8, sign_count: u32, tail: &[u8]) -> Vec<u8> {
        let mut out = vec![0xaa; 32];
        out.push(flags);
        out.extend_from_slice(&sign_count.to_be_bytes());
        out.extend_from_slice(tail);
        out
    }

    #[test]
    fn parses_the_37_byte_assertion_form() {
        let bytes = auth_data_bytes(FLAG_USER_PRESENT, 7, &[]);
        let parsed = AuthenticatorData::parse(&bytes).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xaa; 32]);
        assert_eq!(parsed.sign_count, 7);
        assert!(parsed.user_present());
        assert!(!parsed.user_verified());
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn parses_attested_credential_data() {
        let mut tail = vec![0x11; 16]; // aaguid
        tail.extend_from_slice(&4u16.to_be_bytes());
        tail.extend_from_slice(b"cred");
        tail.extend_from_slice(&[0xa0]); // empty CBOR map as key placeholder

        let bytes = auth_data_bytes(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL, 0, &tail);
        let parsed = AuthenticatorData::parse(&bytes).unwrap();
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.aaguid, [0x11; 16]);
        assert_eq!(attested.credential_id, b"cred");
        assert_eq!(attested.cose_key, [0xa0]);
    }

    #[test]
    fn rejects_fewer_than_37_bytes() {
        let result = AuthenticatorData::parse(&[0u8; 36]);
        assert!(matches!(
            result,
            Err(CeremonyError::TruncatedAuthenticatorData(_))
        ));
    }

    #[test]
    fn rejects_credential_id_length_past_end_of_buffer() {
        let mut tail = vec![0x11; 16];
        tail.extend_from_slice(&1000u16.to_be_bytes());
        tail.extend_from_slice(b"short");

        let bytes = auth_data_bytes(FLAG_ATTESTED_CREDENTIAL, 0, &tail);
        let result = AuthenticatorData::parse(&bytes);
        assert!(matches!(
            result,
            Err(CeremonyError::TruncatedAuthenticatorData(_))
        ));
    }

    #[test]
    fn rejects_truncated_cbor() {
        // 0xa2 declares a two-entry map that never arrives
        let result = decode_cbor(&[0xa2, 0x63]);
        assert!(matches!(result, Err(CeremonyError::MalformedEncoding(_))));
    }

    #[test]
    fn attestation_object_requires_all_fields() {
        let value = Value::Map(vec![(
            Value::Text("fmt".to_string()),
            Value::Text("none".to_string()),
        )]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        let result = AttestationObject::parse(&bytes);
        assert!(matches!(result, Err(CeremonyError::MalformedEncoding(_))));
    }

    #[test]
    fn attestation_object_round_trip() {
        let value = Value::Map(vec![
            (
                Value::Text("fmt".to_string()),
                Value::Text("none".to_string()),
            ),
            (Value::Text("attStmt".to_string()), Value::Map(vec![])),
            (
                Value::Text("authData".to_string()),
                Value::Bytes(vec![1, 2, 3]),
            ),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        let parsed = AttestationObject::parse(&bytes).unwrap();
        assert_eq!(parsed.fmt, "none");
        assert_eq!(parsed.auth_data, vec![1, 2, 3]);
    }
}
