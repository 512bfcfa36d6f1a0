use crate::common::env::{env_int, env_str};
use anyhow::{bail, Result};

/// Process-wide configuration for the identity core. Built once at startup
/// from the environment and handed to `AccountService` by value.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    /// Hex-encoded secp256k1 private key used by the reference `TokenSigner`.
    pub signing_key_hex: String,
    /// Value stamped into minted tokens as the issuing service tag.
    pub issuer: String,
    pub access_token_ttl_secs: i64,
    pub resolve_token_ttl_secs: i64,
}

pub fn env_to_cfg() -> Result<ServiceConfig> {
    let database_url = match env_str("IDENTITY_DATABASE_URL") {
        Some(url) => url,
        None => bail!("IDENTITY_DATABASE_URL must be set"),
    };
    let signing_key_hex = match env_str("IDENTITY_JWT_KEY_HEX") {
        Some(key) => key,
        None => bail!("IDENTITY_JWT_KEY_HEX must be set"),
    };
    let issuer = env_str("IDENTITY_ISSUER").unwrap_or_else(|| "login".to_string());
    let access_token_ttl_secs = env_int("IDENTITY_ACCESS_TOKEN_TTL_SECS").unwrap_or(7200) as i64;
    let resolve_token_ttl_secs = env_int("IDENTITY_RESOLVE_TOKEN_TTL_SECS").unwrap_or(600) as i64;

    Ok(ServiceConfig {
        database_url,
        signing_key_hex,
        issuer,
        access_token_ttl_secs,
        resolve_token_ttl_secs,
    })
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
