//! COSE key material conversion
//!
//! Converts a decoded COSE EC2 map into a P-256 verifying key. Only ES256
//! (ECDSA over P-256 with SHA-256) is supported; any other key type, curve,
//! or algorithm advertised by an authenticator is rejected explicitly rather
//! than mis-parsed.

use ciborium::Value;
use p256::ecdsa::VerifyingKey;
use p256::elliptic_curve::generic_array::GenericArray;
use p256::EncodedPoint;

use crate::codec::map_get_int;
use crate::error::{CeremonyError, Result};

// COSE key labels (RFC 9052)
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_EC2: i128 = 2;
const ALG_ES256: i128 = -7;
const CRV_P256: i128 = 1;

const COORDINATE_LEN: usize = 32;

fn require_label(entries: &[(Value, Value)], label: i64, expected: i128, name: &str) -> Result<()> {
    let actual = map_get_int(entries, label)
        .and_then(Value::as_integer)
        .map(i128::from)
        .ok_or_else(|| {
            CeremonyError::UnsupportedKeyType(format!("COSE key missing {}", name))
        })?;

    if actual != expected {
        return Err(CeremonyError::UnsupportedKeyType(format!(
            "{} is {}, only {} is supported",
            name, actual, expected
        )));
    }
    Ok(())
}

fn coordinate<'a>(entries: &'a [(Value, Value)], label: i64, name: &str) -> Result<&'a [u8]> {
    let bytes = map_get_int(entries, label)
        .and_then(Value::as_bytes)
        .ok_or_else(|| {
            CeremonyError::UnsupportedKeyType(format!("COSE key missing {} coordinate", name))
        })?;

    if bytes.len() != COORDINATE_LEN {
        return Err(CeremonyError::UnsupportedKeyType(format!(
            "{} coordinate is {} bytes, expected {}",
            name,
            bytes.len(),
            COORDINATE_LEN
        )));
    }
    Ok(bytes)
}

/// Convert a decoded COSE EC2 map into a verifying key.
///
/// Checks kty (2, EC2), alg (-7, ES256) and crv (1, P-256), then rebuilds
/// the uncompressed point `0x04 || x || y` and validates it against the
/// curve.
pub fn verifying_key_from_cose(value: &Value) -> Result<VerifyingKey> {
    let entries = value.as_map().ok_or_else(|| {
        CeremonyError::UnsupportedKeyType("COSE key is not a map".to_string())
    })?;

    require_label(entries, LABEL_KTY, KTY_EC2, "kty")?;
    require_label(entries, LABEL_ALG, ALG_ES256, "alg")?;
    require_label(entries, LABEL_CRV, CRV_P256, "crv")?;

    let x = coordinate(entries, LABEL_X, "x")?;
    let y = coordinate(entries, LABEL_Y, "y")?;

    let point = EncodedPoint::from_affine_coordinates(
        GenericArray::from_slice(x),
        GenericArray::from_slice(y),
        false,
    );

    VerifyingKey::from_encoded_point(&point).map_err(|_| {
        CeremonyError::UnsupportedKeyType("coordinates are not a valid P-256 point".to_string())
    })
}

/// Serialize a verifying key as a SEC1 uncompressed point (65 bytes).
pub fn public_key_sec1(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(false).as_bytes().to_vec()
}

/// Rebuild a verifying key from stored SEC1 bytes.
pub fn verifying_key_from_sec1(bytes: &[u8]) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|_| {
        CeremonyError::UnsupportedKeyType("stored public key is not a valid P-256 point".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;

    fn cose_map(kty: i64, alg: i64, crv: i64, x: Vec<u8>, y: Vec<u8>) -> Value {
        Value::Map(vec![
            (Value::Integer(LABEL_KTY.into()), Value::Integer(kty.into())),
            (Value::Integer(LABEL_ALG.into()), Value::Integer(alg.into())),
            (Value::Integer(LABEL_CRV.into()), Value::Integer(crv.into())),
            (Value::Integer(LABEL_X.into()), Value::Bytes(x)),
            (Value::Integer(LABEL_Y.into()), Value::Bytes(y)),
        ])
    }

    fn cose_map_for(key: &VerifyingKey) -> Value {
        let point = key.to_encoded_point(false);
        cose_map(
            2,
            -7,
            1,
            point.x().unwrap().to_vec(),
            point.y().unwrap().to_vec(),
        )
    }

    #[test]
    fn converts_a_valid_es256_key() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let expected = VerifyingKey::from(&signing_key);

        let converted = verifying_key_from_cose(&cose_map_for(&expected)).unwrap();
        assert_eq!(converted, expected);
    }

    #[test]
    fn sec1_round_trip() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let key = VerifyingKey::from(&signing_key);

        let sec1 = public_key_sec1(&key);
        assert_eq!(sec1.len(), 65);
        assert_eq!(sec1[0], 0x04);
        assert_eq!(verifying_key_from_sec1(&sec1).unwrap(), key);
    }

    #[test]
    fn rejects_non_es256_algorithm() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let point = VerifyingKey::from(&signing_key).to_encoded_point(false);

        // -257 is RS256; advertised RSA keys must fail, not mis-parse
        let value = cose_map(
            2,
            -257,
            1,
            point.x().unwrap().to_vec(),
            point.y().unwrap().to_vec(),
        );
        let result = verifying_key_from_cose(&value);
        assert!(matches!(result, Err(CeremonyError::UnsupportedKeyType(_))));
    }

    #[test]
    fn rejects_wrong_key_type_and_curve() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let point = VerifyingKey::from(&signing_key).to_encoded_point(false);
        let x = point.x().unwrap().to_vec();
        let y = point.y().unwrap().to_vec();

        // kty 1 is OKP (Ed25519 family)
        let okp = cose_map(1, -7, 1, x.clone(), y.clone());
        assert!(matches!(
            verifying_key_from_cose(&okp),
            Err(CeremonyError::UnsupportedKeyType(_))
        ));

        // crv 2 is P-384
        let p384 = cose_map(2, -7, 2, x, y);
        assert!(matches!(
            verifying_key_from_cose(&p384),
            Err(CeremonyError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn rejects_short_coordinates() {
        let value = cose_map(2, -7, 1, vec![1u8; 16], vec![2u8; 32]);
        assert!(matches!(
            verifying_key_from_cose(&value),
            Err(CeremonyError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn rejects_coordinates_off_the_curve() {
        let value = cose_map(2, -7, 1, vec![1u8; 32], vec![2u8; 32]);
        assert!(matches!(
            verifying_key_from_cose(&value),
            Err(CeremonyError::UnsupportedKeyType(_))
        ));
    }
}
