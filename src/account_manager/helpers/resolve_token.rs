use crate::account_manager::helpers::signer::{SignerError, TokenClaims, TokenSigner};
use thiserror::Error;

pub const RESOLVE_CONFLICT_SCOPE: &str = "resolve_conflict";

#[derive(Debug, Error)]
pub enum ResolveTokenError {
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("resolve token is missing the '{RESOLVE_CONFLICT_SCOPE}' scope")]
    MissingScope,
}

/// The credential and gamespace a resolve token authorizes a single
/// `resolve_conflict` call against. Carries no account — see §4.5.
#[derive(Debug, Clone)]
pub struct ResolveTokenContext {
    pub credential: String,
    pub gamespace: String,
}

pub fn mint_resolve_token(
    signer: &dyn TokenSigner,
    credential: &str,
    gamespace: &str,
    ttl: chrono::Duration,
) -> Result<String, SignerError> {
    let minted = signer.mint(
        &[RESOLVE_CONFLICT_SCOPE.to_string()],
        TokenClaims {
            account: None,
            gamespace: gamespace.to_string(),
            issuer_tag: None,
        },
        credential,
        ttl,
    )?;
    Ok(minted.token)
}

/// Verification is signature + scope + expiry only: the credential and
/// gamespace come from the token itself, never from the request body.
pub fn verify_resolve_token(
    signer: &dyn TokenSigner,
    token: &str,
) -> Result<ResolveTokenContext, ResolveTokenError> {
    let verified = signer.verify(token)?;
    if !verified.scopes.contains(RESOLVE_CONFLICT_SCOPE) {
        return Err(ResolveTokenError::MissingScope);
    }
    Ok(ResolveTokenContext {
        credential: verified.subject,
        gamespace: verified.gamespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_manager::helpers::signer::Es256kTokenSigner;
    use secp256k1::Secp256k1;

    fn signer() -> Es256kTokenSigner {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
        Es256kTokenSigner::from_hex_secret(&hex::encode(secret_key.secret_bytes())).unwrap()
    }

    #[test]
    fn mints_and_verifies_a_resolve_token() {
        let signer = signer();
        let token =
            mint_resolve_token(&signer, "google:gg", "7", chrono::Duration::minutes(10)).unwrap();
        let ctx = verify_resolve_token(&signer, &token).unwrap();
        assert_eq!(ctx.credential, "google:gg");
        assert_eq!(ctx.gamespace, "7");
    }

    #[test]
    fn an_ordinary_access_token_has_no_resolve_scope() {
        let signer = signer();
        let minted = signer
            .mint(
                &["profile".to_string()],
                TokenClaims {
                    account: Some("2".to_string()),
                    gamespace: "7".to_string(),
                    issuer_tag: Some("login".to_string()),
                },
                "google:gg",
                chrono::Duration::hours(1),
            )
            .unwrap();
        let err = verify_resolve_token(&signer, &minted.token).unwrap_err();
        assert!(matches!(err, ResolveTokenError::MissingScope));
    }
}
