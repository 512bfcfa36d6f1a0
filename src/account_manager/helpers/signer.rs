use chrono::{DateTime, NaiveDateTime, Utc};
use jwt_simple::prelude::*;
use secp256k1::{Keypair, Secp256k1, SecretKey};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid signing key material: {0}")]
    InvalidKey(String),
    #[error("token signature verification failed: {0}")]
    InvalidToken(String),
    #[error("token has expired")]
    Expired,
}

/// Claims an `AccessToken` carries beyond its scope list. `account` is
/// absent for resolve tokens (they bind to a credential, not an account).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub gamespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_tag: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AccessTokenCustomClaims {
    scopes: Vec<String>,
    #[serde(flatten)]
    claims: TokenClaims,
}

pub struct MintedToken {
    pub token: String,
    pub uuid: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// The credential the token was minted for ("type:username").
    pub subject: String,
    pub scopes: BTreeSet<String>,
    pub gamespace: String,
    pub account: Option<String>,
    pub uuid: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies signed `AccessToken`s. The merge state machine treats
/// this purely as a trait: a production deployment supplies its own
/// implementation backed by whatever signing infrastructure it runs.
pub trait TokenSigner: Send + Sync {
    fn mint(
        &self,
        scopes: &[String],
        claims: TokenClaims,
        subject: &str,
        ttl: chrono::Duration,
    ) -> Result<MintedToken, SignerError>;

    fn verify(&self, token: &str) -> Result<VerifiedToken, SignerError>;
}

/// Reference ES256K-signed implementation, grounded in the same
/// jwt-simple + secp256k1 pairing the rest of the house uses for access
/// tokens.
pub struct Es256kTokenSigner {
    key_pair: ES256kKeyPair,
}

impl Es256kTokenSigner {
    pub fn from_hex_secret(hex_secret: &str) -> Result<Self, SignerError> {
        let bytes =
            hex::decode(hex_secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        let key_pair = ES256kKeyPair::from_bytes(&keypair.secret_bytes())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { key_pair })
    }
}

impl TokenSigner for Es256kTokenSigner {
    fn mint(
        &self,
        scopes: &[String],
        claims: TokenClaims,
        subject: &str,
        ttl: chrono::Duration,
    ) -> Result<MintedToken, SignerError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let duration = Duration::from_secs(ttl.num_seconds().max(1) as u64);
        let jwt_claims = Claims::with_custom_claims(
            AccessTokenCustomClaims {
                scopes: scopes.to_vec(),
                claims,
            },
            duration,
        )
        .with_subject(subject)
        .with_jwt_id(uuid.clone());

        let expires_at = Utc::now() + ttl;
        let token = self
            .key_pair
            .sign(jwt_claims)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        Ok(MintedToken {
            token,
            uuid,
            expires_at,
            scopes: scopes.to_vec(),
        })
    }

    fn verify(&self, token: &str) -> Result<VerifiedToken, SignerError> {
        let public_key = self.key_pair.public_key();
        let claims = public_key
            .verify_token::<AccessTokenCustomClaims>(token, None)
            .map_err(|e| SignerError::InvalidToken(e.to_string()))?;

        let subject = claims
            .subject
            .ok_or_else(|| SignerError::InvalidToken("missing subject".to_string()))?;
        let uuid = claims
            .jwt_id
            .ok_or_else(|| SignerError::InvalidToken("missing jti".to_string()))?;
        let expires_at = claims
            .expires_at
            .ok_or_else(|| SignerError::InvalidToken("missing exp".to_string()))?;
        #[allow(deprecated)]
        let expires_at =
            DateTime::<Utc>::from_utc(NaiveDateTime::from_timestamp(expires_at.as_secs() as i64, 0), Utc);
        if expires_at < Utc::now() {
            return Err(SignerError::Expired);
        }

        Ok(VerifiedToken {
            subject,
            scopes: claims.custom.scopes.into_iter().collect(),
            gamespace: claims.custom.claims.gamespace,
            account: claims.custom.claims.account,
            uuid,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Es256kTokenSigner {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
        Es256kTokenSigner::from_hex_secret(&hex::encode(secret_key.secret_bytes())).unwrap()
    }

    #[test]
    fn mints_and_verifies_round_trip() {
        let token_signer = signer();
        let minted = token_signer
            .mint(
                &["profile".to_string()],
                TokenClaims {
                    account: Some("2".to_string()),
                    gamespace: "7".to_string(),
                    issuer_tag: Some("login".to_string()),
                },
                "anonymous:u1",
                chrono::Duration::hours(2),
            )
            .unwrap();

        let verified = token_signer.verify(&minted.token).unwrap();
        assert_eq!(verified.subject, "anonymous:u1");
        assert_eq!(verified.account, Some("2".to_string()));
        assert_eq!(verified.gamespace, "7");
        assert!(verified.scopes.contains("profile"));
        assert_eq!(verified.uuid, minted.uuid);
    }

    #[test]
    fn rejects_tampered_token() {
        let token_signer = signer();
        let minted = token_signer
            .mint(
                &[],
                TokenClaims {
                    account: None,
                    gamespace: "7".to_string(),
                    issuer_tag: None,
                },
                "google:gg",
                chrono::Duration::minutes(10),
            )
            .unwrap();
        let other = signer();
        assert!(other.verify(&minted.token).is_err());
    }
}
