//! Ceremony data model and wire-facing option/response types
//!
//! Option and response structs serialize with camelCase field names so the
//! caller can forward them verbatim to a client-side credential API.

use serde::{Deserialize, Serialize};

/// COSE algorithm identifier for ECDSA/P-256/SHA-256.
pub const COSE_ALG_ES256: i32 = -7;

/// Identity record supplied by the caller's user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable identifier
    pub id: String,
    /// Login handle
    pub name: String,
    /// Human-readable display name
    pub display_name: String,
}

impl Subject {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

/// A registered public-key credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential handle, base64url-encoded (unique within a subject)
    pub id: String,
    /// SEC1 uncompressed P-256 point (65 bytes)
    pub public_key: Vec<u8>,
    /// Monotonic counter reported by the authenticator
    pub signature_counter: u32,
}

/// Which ceremony a pending challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeremonyKind {
    Register,
    Login,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyKind::Register => "register",
            CeremonyKind::Login => "login",
        }
    }
}

/// Relying-party descriptor sent in registration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyDescriptor {
    pub id: String,
    pub name: String,
}

/// User descriptor sent in registration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDescriptor {
    /// Subject identifier, base64url-encoded
    pub id: String,
    pub name: String,
    pub display_name: String,
}

/// Supported credential algorithm advertised to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i32,
}

impl PubKeyCredParam {
    /// The one supported algorithm: ES256.
    pub fn es256() -> Self {
        Self {
            kind: "public-key".to_string(),
            alg: COSE_ALG_ES256,
        }
    }
}

/// Options returned by `start_registration`, forwarded to
/// `navigator.credentials.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RelyingPartyDescriptor,
    pub user: UserDescriptor,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds the client should wait for the authenticator
    pub timeout: u64,
}

/// Reference to an already-registered credential the client may assert with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    /// Credential id, base64url-encoded
    pub id: String,
}

/// Options returned by `start_authentication`, forwarded to
/// `navigator.credentials.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub timeout: u64,
}

/// Client response completing a registration ceremony.
///
/// All fields are base64url-encoded binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Credential id as reported by the client
    pub id: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
}

/// Client response completing an authentication ceremony.
///
/// All fields are base64url-encoded binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    /// Credential id as reported by the client
    pub id: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
}

/// Client-data blob embedded in every response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    #[serde(default)]
    pub origin: Option<String>,
}

/// Successful registration result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOutcome {
    pub subject: Subject,
    pub credential_id: String,
    pub signature_counter: u32,
}

/// Successful authentication result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOutcome {
    pub subject: Subject,
    pub credential_id: String,
    pub signature_counter: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_options_serialize_camel_case() {
        let options = RegistrationOptions {
            challenge: "abc".to_string(),
            rp: RelyingPartyDescriptor {
                id: "localhost".to_string(),
                name: "sigil".to_string(),
            },
            user: UserDescriptor {
                id: "dTE".to_string(),
                name: "u1".to_string(),
                display_name: "User One".to_string(),
            },
            pub_key_cred_params: vec![PubKeyCredParam::es256()],
            timeout: 60_000,
        };

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["pubKeyCredParams"][0]["alg"], -7);
        assert_eq!(json["pubKeyCredParams"][0]["type"], "public-key");
        assert_eq!(json["user"]["displayName"], "User One");
    }

    #[test]
    fn client_data_deserializes_wire_fields() {
        let data: CollectedClientData = serde_json::from_str(
            r#"{"type":"webauthn.create","challenge":"xyz","origin":"https://example.com"}"#,
        )
        .unwrap();
        assert_eq!(data.kind, "webauthn.create");
        assert_eq!(data.challenge, "xyz");
        assert_eq!(data.origin.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn client_data_origin_is_optional() {
        let data: CollectedClientData =
            serde_json::from_str(r#"{"type":"webauthn.get","challenge":"xyz"}"#).unwrap();
        assert!(data.origin.is_none());
    }
}
