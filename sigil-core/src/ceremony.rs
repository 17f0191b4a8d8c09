//! Registration and authentication ceremonies
//!
//! The manager issues one-time challenges keyed by the subject's identity
//! attribute, builds the option objects the caller forwards to the client
//! credential API, and validates the binary responses that come back.
//!
//! Per (subject, ceremony) the state machine is Idle -> Challenged on
//! `start_*`, then Challenged -> consumed on `finish_*` (success or terminal
//! failure) or back to Idle via TTL expiry. Idle is the only re-entrant
//! state: a second `start_*` call overwrites the prior challenge (last
//! challenge wins).

use ciborium::Value;
use p256::ecdsa::VerifyingKey;

use crate::codec::{self, AttestationObject, AuthenticatorData};
use crate::config::RelyingParty;
use crate::cose;
use crate::crypto;
use crate::error::{CeremonyError, Result};
use crate::store::{ChallengeStore, CredentialRepository, PendingCeremony};
use crate::transport;
use crate::types::{
    AuthenticationOptions, AuthenticationOutcome, AuthenticationResponse, CeremonyKind,
    CollectedClientData, Credential, CredentialDescriptor, PubKeyCredParam, RegistrationOptions,
    RegistrationOutcome, RegistrationResponse, RelyingPartyDescriptor, Subject, UserDescriptor,
    COSE_ALG_ES256,
};

const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";
const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";

/// Orchestrates passkey registration and authentication ceremonies.
pub struct CeremonyManager {
    config: RelyingParty,
    challenges: ChallengeStore,
    credentials: CredentialRepository,
}

impl CeremonyManager {
    pub fn new(
        config: RelyingParty,
        challenges: ChallengeStore,
        credentials: CredentialRepository,
    ) -> Self {
        Self {
            config,
            challenges,
            credentials,
        }
    }

    /// Manager with in-process stores, for development and tests.
    pub fn in_memory(config: RelyingParty) -> Self {
        Self::new(
            config,
            ChallengeStore::in_memory(),
            CredentialRepository::in_memory(),
        )
    }

    /// Configuration and stores from environment variables.
    pub async fn from_env() -> Result<Self> {
        let config = RelyingParty::from_env()?;
        let challenges = ChallengeStore::from_env().await?;
        let credentials = CredentialRepository::from_env().await?;
        Ok(Self::new(config, challenges, credentials))
    }

    pub fn config(&self) -> &RelyingParty {
        &self.config
    }

    /// The credential repository, exposed so callers can seed it from their
    /// own user store or inspect registered credentials.
    pub fn credentials(&self) -> &CredentialRepository {
        &self.credentials
    }

    /// The challenge store, exposed for maintenance sweeps.
    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    fn subject_key<'a>(&self, subject: &'a Subject) -> &'a str {
        self.config.identity_attribute.key_of(subject)
    }

    /// Issue a registration challenge for `subject` and return the options
    /// to forward to `navigator.credentials.create`.
    pub async fn start_registration(&self, subject: &Subject) -> Result<RegistrationOptions> {
        let challenge = crypto::generate_challenge();
        let subject_key = self.subject_key(subject);

        self.challenges
            .put(
                subject_key,
                PendingCeremony {
                    kind: CeremonyKind::Register,
                    challenge: challenge.clone(),
                },
                self.config.challenge_ttl,
            )
            .await?;

        tracing::debug!(subject = %subject_key, "registration challenge issued");

        Ok(RegistrationOptions {
            challenge,
            rp: RelyingPartyDescriptor {
                id: self.config.id.clone(),
                name: self.config.name.clone(),
            },
            user: UserDescriptor {
                id: transport::encode(subject.id.as_bytes()),
                name: subject.name.clone(),
                display_name: subject.display_name.clone(),
            },
            pub_key_cred_params: vec![PubKeyCredParam::es256()],
            timeout: self.config.timeout.as_millis() as u64,
        })
    }

    /// Issue an authentication challenge for `subject` and return the options
    /// to forward to `navigator.credentials.get`.
    pub async fn start_authentication(&self, subject: &Subject) -> Result<AuthenticationOptions> {
        let challenge = crypto::generate_challenge();
        let subject_key = self.subject_key(subject);

        self.challenges
            .put(
                subject_key,
                PendingCeremony {
                    kind: CeremonyKind::Login,
                    challenge: challenge.clone(),
                },
                self.config.challenge_ttl,
            )
            .await?;

        let allow_credentials = self
            .credentials
            .list(subject_key)
            .await?
            .into_iter()
            .map(|credential| CredentialDescriptor {
                kind: "public-key".to_string(),
                id: credential.id,
            })
            .collect();

        tracing::debug!(subject = %subject_key, "authentication challenge issued");

        Ok(AuthenticationOptions {
            challenge,
            allow_credentials,
            timeout: self.config.timeout.as_millis() as u64,
        })
    }

    /// Validate a registration response and record the new credential.
    pub async fn finish_registration(
        &self,
        subject: &Subject,
        response: &RegistrationResponse,
    ) -> Result<RegistrationOutcome> {
        let subject_key = self.subject_key(subject);

        let client_data_bytes = transport::decode(&response.client_data_json)?;
        let client_data = self.parse_client_data(&client_data_bytes, CLIENT_DATA_TYPE_CREATE)?;

        self.consume_challenge(subject_key, CeremonyKind::Register, &client_data.challenge)
            .await?;

        let attestation_bytes = transport::decode(&response.attestation_object)?;
        let attestation = AttestationObject::parse(&attestation_bytes)?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        self.verify_authenticator(&auth_data)?;

        let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
            CeremonyError::MalformedEncoding(
                "registration response carries no attested credential data".to_string(),
            )
        })?;

        let cose_key = codec::decode_cbor(&attested.cose_key)?;
        let verifying_key = cose::verifying_key_from_cose(&cose_key)?;

        self.verify_attestation_statement(
            &attestation,
            &client_data_bytes,
            &verifying_key,
        )?;

        let credential_id = transport::encode(&attested.credential_id);
        self.credentials
            .append(
                subject_key,
                Credential {
                    id: credential_id.clone(),
                    public_key: cose::public_key_sec1(&verifying_key),
                    signature_counter: auth_data.sign_count,
                },
            )
            .await?;

        tracing::info!(
            subject = %subject_key,
            credential_id = %credential_id,
            sign_count = auth_data.sign_count,
            "registration completed"
        );

        Ok(RegistrationOutcome {
            subject: subject.clone(),
            credential_id,
            signature_counter: auth_data.sign_count,
        })
    }

    /// Validate an authentication response against the subject's stored
    /// credential.
    pub async fn finish_authentication(
        &self,
        subject: &Subject,
        response: &AuthenticationResponse,
    ) -> Result<AuthenticationOutcome> {
        let subject_key = self.subject_key(subject);

        let client_data_bytes = transport::decode(&response.client_data_json)?;
        let client_data = self.parse_client_data(&client_data_bytes, CLIENT_DATA_TYPE_GET)?;

        self.consume_challenge(subject_key, CeremonyKind::Login, &client_data.challenge)
            .await?;

        // Re-encode so lookup is insensitive to how the client padded the id
        let credential_id = transport::encode(&transport::decode(&response.id)?);
        let credential = self
            .credentials
            .find(subject_key, &credential_id)
            .await?
            .ok_or_else(|| CeremonyError::UnknownCredential(credential_id.clone()))?;

        let auth_data_bytes = transport::decode(&response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        self.verify_authenticator(&auth_data)?;

        let verifying_key = cose::verifying_key_from_sec1(&credential.public_key)?;
        let signature = transport::decode(&response.signature)?;
        let message = signed_message(&auth_data_bytes, &client_data_bytes);
        crypto::verify_es256(&verifying_key, &message, &signature)?;

        // Strictly-greater counter rule: an equal or lower value means the
        // authenticator may have been cloned, and the ceremony fails.
        if auth_data.sign_count <= credential.signature_counter {
            tracing::warn!(
                subject = %subject_key,
                credential_id = %credential_id,
                stored = credential.signature_counter,
                reported = auth_data.sign_count,
                "signature counter did not advance"
            );
            return Err(CeremonyError::SuspiciousSignatureCounter {
                stored: credential.signature_counter,
                reported: auth_data.sign_count,
            });
        }

        self.credentials
            .update_counter(subject_key, &credential_id, auth_data.sign_count)
            .await?;

        tracing::info!(
            subject = %subject_key,
            credential_id = %credential_id,
            sign_count = auth_data.sign_count,
            "authentication completed"
        );

        Ok(AuthenticationOutcome {
            subject: subject.clone(),
            credential_id,
            signature_counter: auth_data.sign_count,
        })
    }

    fn parse_client_data(
        &self,
        client_data_bytes: &[u8],
        expected_type: &str,
    ) -> Result<CollectedClientData> {
        let client_data: CollectedClientData = serde_json::from_slice(client_data_bytes)
            .map_err(|e| CeremonyError::MalformedEncoding(format!("client data JSON: {}", e)))?;

        // A response minted for the other ceremony kind cannot consume this
        // challenge.
        if client_data.kind != expected_type {
            return Err(CeremonyError::ChallengeMismatch);
        }

        if let Some(expected_origin) = &self.config.origin {
            let actual = client_data.origin.clone().unwrap_or_default();
            if &actual != expected_origin {
                return Err(CeremonyError::OriginMismatch {
                    expected: expected_origin.clone(),
                    actual,
                });
            }
        }

        Ok(client_data)
    }

    async fn consume_challenge(
        &self,
        subject_key: &str,
        kind: CeremonyKind,
        challenge: &str,
    ) -> Result<()> {
        let consumed = self
            .challenges
            .take_if_matches(subject_key, kind, challenge)
            .await?;

        if !consumed {
            tracing::debug!(subject = %subject_key, kind = kind.as_str(), "challenge mismatch");
            return Err(CeremonyError::ChallengeMismatch);
        }
        Ok(())
    }

    fn verify_authenticator(&self, auth_data: &AuthenticatorData) -> Result<()> {
        let expected_hash = crypto::sha256(self.config.id.as_bytes());
        if auth_data.rp_id_hash != expected_hash {
            return Err(CeremonyError::RelyingPartyMismatch);
        }
        if !auth_data.user_present() {
            return Err(CeremonyError::UserNotPresent);
        }
        if self.config.require_user_verification && !auth_data.user_verified() {
            return Err(CeremonyError::UserVerificationRequired);
        }
        Ok(())
    }

    /// Check the attestation statement. `none` is accepted as-is; `packed`
    /// without a certificate chain is verified as self-attestation with the
    /// newly registered key; every other format is rejected explicitly.
    fn verify_attestation_statement(
        &self,
        attestation: &AttestationObject,
        client_data_bytes: &[u8],
        key: &VerifyingKey,
    ) -> Result<()> {
        match attestation.fmt.as_str() {
            "none" => Ok(()),
            "packed" => self.verify_packed_statement(attestation, client_data_bytes, key),
            other => Err(CeremonyError::UnsupportedAttestationFormat(
                other.to_string(),
            )),
        }
    }

    fn verify_packed_statement(
        &self,
        attestation: &AttestationObject,
        client_data_bytes: &[u8],
        key: &VerifyingKey,
    ) -> Result<()> {
        let entries = attestation.att_stmt.as_map().ok_or_else(|| {
            CeremonyError::MalformedEncoding("packed attStmt is not a map".to_string())
        })?;

        if codec::map_get_text(entries, "x5c").is_some() {
            return Err(CeremonyError::UnsupportedAttestationFormat(
                "packed with certificate chain".to_string(),
            ));
        }

        let alg = codec::map_get_text(entries, "alg")
            .and_then(Value::as_integer)
            .map(i128::from)
            .ok_or_else(|| {
                CeremonyError::MalformedEncoding("packed attStmt missing alg".to_string())
            })?;
        if alg != i128::from(COSE_ALG_ES256) {
            return Err(CeremonyError::UnsupportedKeyType(format!(
                "packed attestation alg {}",
                alg
            )));
        }

        let signature = codec::map_get_text(entries, "sig")
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                CeremonyError::MalformedEncoding("packed attStmt missing sig".to_string())
            })?;

        let message = signed_message(&attestation.auth_data, client_data_bytes);
        crypto::verify_es256(key, &message, signature)
    }
}

impl std::fmt::Debug for CeremonyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyManager")
            .field("rp_id", &self.config.id)
            .field("challenges", &self.challenges)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// The byte string clients sign: `authenticatorData || SHA-256(clientDataJSON)`.
fn signed_message(auth_data: &[u8], client_data_bytes: &[u8]) -> Vec<u8> {
    let mut message = auth_data.to_vec();
    message.extend_from_slice(&crypto::sha256(client_data_bytes));
    message
}
