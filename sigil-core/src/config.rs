//! Relying-party configuration

use std::time::Duration;

use crate::error::{CeremonyError, Result};
use crate::types::Subject;

/// Which subject field keys challenge and credential storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityAttribute {
    #[default]
    Id,
    Name,
}

impl IdentityAttribute {
    /// Resolve the storage key for `subject`.
    pub fn key_of<'a>(&self, subject: &'a Subject) -> &'a str {
        match self {
            IdentityAttribute::Id => &subject.id,
            IdentityAttribute::Name => &subject.name,
        }
    }
}

/// Relying-party identity and ceremony policy.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    /// Human-readable name shown by the client credential API
    pub name: String,
    /// Relying-party id; its SHA-256 hash must match the one reported in
    /// authenticator data
    pub id: String,
    /// When set, client-data `origin` must match exactly
    pub origin: Option<String>,
    /// Subject field used to key challenge and credential storage
    pub identity_attribute: IdentityAttribute,
    /// How long an issued challenge stays valid
    pub challenge_ttl: Duration,
    /// Client-side authenticator timeout
    pub timeout: Duration,
    /// Require the user-verified flag on authenticator data
    pub require_user_verification: bool,
}

impl Default for RelyingParty {
    fn default() -> Self {
        Self {
            name: "sigil".to_string(),
            id: "localhost".to_string(),
            origin: None,
            identity_attribute: IdentityAttribute::Id,
            challenge_ttl: Duration::from_secs(120),
            timeout: Duration::from_secs(60),
            require_user_verification: false,
        }
    }
}

impl RelyingParty {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Pin the expected client-data origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_identity_attribute(mut self, attribute: IdentityAttribute) -> Self {
        self.identity_attribute = attribute;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_verification(mut self, required: bool) -> Self {
        self.require_user_verification = required;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SIGIL_RP_NAME` - Relying-party display name (default: "sigil")
    /// - `SIGIL_RP_ID` - Relying-party id (default: "localhost")
    /// - `SIGIL_RP_ORIGIN` - Expected client-data origin (default: unset)
    /// - `SIGIL_CHALLENGE_TTL` - Challenge lifetime, e.g. "2m" or "30s"
    /// - `SIGIL_TIMEOUT` - Client authenticator timeout, same format
    /// - `SIGIL_REQUIRE_UV` - "1"/"true" to require user verification
    pub fn from_env() -> Result<Self> {
        let mut rp = Self::default();

        if let Ok(name) = std::env::var("SIGIL_RP_NAME") {
            rp.name = name;
        }
        if let Ok(id) = std::env::var("SIGIL_RP_ID") {
            rp.id = id;
        }
        if let Ok(origin) = std::env::var("SIGIL_RP_ORIGIN") {
            rp.origin = Some(origin);
        }
        if let Ok(ttl) = std::env::var("SIGIL_CHALLENGE_TTL") {
            rp.challenge_ttl = parse_ttl(&ttl)?;
        }
        if let Ok(timeout) = std::env::var("SIGIL_TIMEOUT") {
            rp.timeout = parse_ttl(&timeout)?;
        }
        if let Ok(uv) = std::env::var("SIGIL_REQUIRE_UV") {
            rp.require_user_verification = matches!(uv.as_str(), "1" | "true");
        }

        Ok(rp)
    }
}

/// Parse a duration string of the form `"<n>m"` (minutes) or `"<n>s"`
/// (seconds).
pub fn parse_ttl(value: &str) -> Result<Duration> {
    if value.len() < 2 {
        return Err(CeremonyError::InvalidTtl(format!(
            "{:?} is too short",
            value
        )));
    }

    let (number, unit) = value.split_at(value.len() - 1);
    let count: u64 = number
        .parse()
        .map_err(|_| CeremonyError::InvalidTtl(format!("{:?} is not a number", number)))?;

    match unit {
        "m" => Ok(Duration::from_secs(count * 60)),
        "s" => Ok(Duration::from_secs(count)),
        _ => Err(CeremonyError::InvalidTtl(
            "TTL must end with 's' or 'm'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_and_seconds() {
        assert_eq!(parse_ttl("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_ttl("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_ttl("90s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_bad_ttl_strings() {
        assert!(matches!(parse_ttl("2h"), Err(CeremonyError::InvalidTtl(_))));
        assert!(matches!(parse_ttl("m"), Err(CeremonyError::InvalidTtl(_))));
        assert!(matches!(
            parse_ttl("abcm"),
            Err(CeremonyError::InvalidTtl(_))
        ));
    }

    #[test]
    fn identity_attribute_selects_subject_field() {
        let subject = Subject::new("u1", "alice", "Alice");
        assert_eq!(IdentityAttribute::Id.key_of(&subject), "u1");
        assert_eq!(IdentityAttribute::Name.key_of(&subject), "alice");
    }

    #[test]
    fn defaults_match_protocol_expectations() {
        let rp = RelyingParty::default();
        assert_eq!(rp.challenge_ttl, Duration::from_secs(120));
        assert_eq!(rp.timeout, Duration::from_secs(60));
        assert!(!rp.require_user_verification);
        assert!(rp.origin.is_none());
    }
}
