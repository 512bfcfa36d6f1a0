use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// The two credential types that are auto-creatable and movable during a
/// `local` merge resolution: guest progress on them should never be stranded.
pub const LOCAL_CREDENTIALS: [&str; 2] = ["anonymous", "dev"];

lazy_static! {
    static ref CREDENTIAL_TYPE_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]*$").unwrap();
    static ref TOKEN_NAME_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").unwrap();
}

/// A credential is a tagged `(type, username)` pair. The textual
/// `"type:username"` form is kept only at the storage and protocol
/// boundaries — everywhere else the pair travels intact.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Credential {
    pub credential_type: String,
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialParseError {
    #[error("credential is missing a ':' separator: {0}")]
    MissingSeparator(String),
    #[error("credential type '{0}' is not a valid identifier")]
    InvalidType(String),
}

impl Credential {
    pub fn new(credential_type: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            username: username.into(),
        }
    }

    /// Parses `"type:username"`, keeping only the first `:` — embedded
    /// colons in `username` (e.g. a Steam ticket) are preserved verbatim.
    pub fn parse(raw: &str) -> Result<Self, CredentialParseError> {
        let (credential_type, username) = raw
            .split_once(':')
            .ok_or_else(|| CredentialParseError::MissingSeparator(raw.to_string()))?;
        if !CREDENTIAL_TYPE_RE.is_match(credential_type) {
            return Err(CredentialParseError::InvalidType(credential_type.to_string()));
        }
        Ok(Self::new(credential_type, username))
    }

    pub fn is_local(&self) -> bool {
        LOCAL_CREDENTIALS.contains(&self.credential_type.as_str())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.credential_type, self.username)
    }
}

/// `scopes` arguments are comma-separated lists of scope labels.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Identifier syntax required of the `as` (token-name / system) argument.
pub fn validate_token_name(name: &str) -> bool {
    TOKEN_NAME_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_credential() {
        let c = Credential::parse("google:12345").unwrap();
        assert_eq!(c.credential_type, "google");
        assert_eq!(c.username, "12345");
    }

    #[test]
    fn keeps_embedded_colons_in_username() {
        let c = Credential::parse("steam:ticket:abc:def").unwrap();
        assert_eq!(c.credential_type, "steam");
        assert_eq!(c.username, "ticket:abc:def");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(Credential::parse("nocoloninhere").is_err());
    }

    #[test]
    fn local_credentials_are_flagged() {
        assert!(Credential::new("anonymous", "x").is_local());
        assert!(Credential::new("dev", "x").is_local());
        assert!(!Credential::new("google", "x").is_local());
    }

    #[test]
    fn token_name_validation() {
        assert!(validate_token_name("www"));
        assert!(validate_token_name("def"));
        assert!(!validate_token_name("123abc"));
        assert!(!validate_token_name("has space"));
    }

    #[test]
    fn scope_parsing_trims_and_dedupes() {
        let scopes = parse_scopes("profile, profile ,auth_non_unique");
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains("profile"));
        assert!(scopes.contains("auth_non_unique"));
    }
}
