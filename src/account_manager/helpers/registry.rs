use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Environment passed back to authenticators (caller IP, user agent, ...).
/// Opaque to the account service itself.
pub type AuthEnv = HashMap<String, String>;
pub type AuthArgs = HashMap<String, String>;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct AuthenticatorError {
    pub code: String,
    pub message: String,
}

impl AuthenticatorError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Verified output of a credential check: a `(type, username)` pair plus
/// whatever the authenticator wants to hand further down the pipeline.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub credential_type: String,
    pub username: String,
    pub response: Option<AuthResponse>,
}

#[derive(Debug, Clone)]
pub struct AuthResponse {
    /// Raw provider payload, forwarded to `SocialBridge::import_social`.
    pub data: serde_json::Value,
    /// Whether the caller asked to import social connections for this login
    /// (`import_profile != "false"`, already resolved by the caller).
    pub import_social: bool,
}

/// A single credential-type verifier. Real OAuth/OpenID flows live outside
/// this crate; this trait is the seam they plug into.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn credential_type(&self) -> &str;

    /// Whether a successful login on this credential type implies a social
    /// graph/profile worth importing.
    fn social_profile(&self) -> bool {
        false
    }

    async fn authorize(
        &self,
        gamespace: &str,
        args: &AuthArgs,
        env: &AuthEnv,
    ) -> Result<AuthResult, AuthenticatorError>;
}

/// Lookup table from credential type to its `Authenticator`.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
}

impl AuthenticatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, authenticator: Arc<dyn Authenticator>) -> &mut Self {
        self.authenticators
            .insert(authenticator.credential_type().to_string(), authenticator);
        self
    }

    pub fn get(&self, credential_type: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.get(credential_type).cloned()
    }
}

/// Reference authenticator for the `anonymous` local credential type: any
/// caller-supplied username is accepted outright. Used by tests/demos; a
/// production deployment is expected to still register it since guest play
/// is part of the local-credential contract, but may harden it further.
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    fn credential_type(&self) -> &str {
        "anonymous"
    }

    async fn authorize(
        &self,
        _gamespace: &str,
        args: &AuthArgs,
        _env: &AuthEnv,
    ) -> Result<AuthResult, AuthenticatorError> {
        let username = args
            .get("username")
            .cloned()
            .ok_or_else(|| AuthenticatorError::new("missing_username", "username is required"))?;
        Ok(AuthResult {
            credential_type: "anonymous".to_string(),
            username,
            response: None,
        })
    }
}

/// Reference authenticator for the `dev` local credential type: identical
/// shape to `anonymous`, kept distinct so the two local types can be
/// exercised independently in tests of the `local` merge path.
pub struct DevAuthenticator;

#[async_trait]
impl Authenticator for DevAuthenticator {
    fn credential_type(&self) -> &str {
        "dev"
    }

    async fn authorize(
        &self,
        _gamespace: &str,
        args: &AuthArgs,
        _env: &AuthEnv,
    ) -> Result<AuthResult, AuthenticatorError> {
        let username = args
            .get("username")
            .cloned()
            .ok_or_else(|| AuthenticatorError::new("missing_username", "username is required"))?;
        Ok(AuthResult {
            credential_type: "dev".to_string(),
            username,
            response: None,
        })
    }
}
