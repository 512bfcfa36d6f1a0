use crate::account_manager::helpers::account::parse_account_id;
use crate::schema::account_credentials::dsl as CredSchema;
use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("no account is linked to credential '{0}'")]
    CredentialNotFound(String),
}

/// Persists credential⇄account links. The mapping is physically many-to-many
/// so the service can *detect* a conflict (two accounts claiming the same
/// credential) rather than silently picking one.
pub struct CredentialStore;

impl CredentialStore {
    /// Idempotent insert of the link.
    pub fn attach(conn: &mut PgConnection, credential: &str, account: &str) -> Result<()> {
        let account_id = parse_account_id(account)?;
        diesel::insert_into(CredSchema::account_credentials)
            .values((
                CredSchema::credential.eq(credential),
                CredSchema::account_id.eq(account_id),
            ))
            .on_conflict((CredSchema::credential, CredSchema::account_id))
            .do_nothing()
            .execute(conn)
            .context("failed to attach credential")?;
        Ok(())
    }

    /// Removes the link; a no-op if it was already absent.
    pub fn detach(conn: &mut PgConnection, credential: &str, account: &str) -> Result<()> {
        let account_id = parse_account_id(account)?;
        diesel::delete(
            CredSchema::account_credentials
                .filter(CredSchema::credential.eq(credential))
                .filter(CredSchema::account_id.eq(account_id)),
        )
        .execute(conn)
        .context("failed to detach credential")?;
        Ok(())
    }

    /// All accounts linked to `credential`, row-locked so a concurrent
    /// authorization of the same previously-unknown credential can't also
    /// create a fresh account underneath us.
    pub fn list_accounts(conn: &mut PgConnection, credential: &str) -> Result<Vec<String>> {
        let ids: Vec<i64> = CredSchema::account_credentials
            .filter(CredSchema::credential.eq(credential))
            .select(CredSchema::account_id)
            .for_update()
            .load(conn)
            .context("failed to list accounts for credential")?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    /// Credentials attached to `account`, optionally restricted to the given
    /// set of credential types (matched against the `"type:"` prefix).
    pub fn list_account_credentials(
        conn: &mut PgConnection,
        account: &str,
        type_filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<String>> {
        let account_id = parse_account_id(account)?;
        let creds: Vec<String> = CredSchema::account_credentials
            .filter(CredSchema::account_id.eq(account_id))
            .select(CredSchema::credential)
            .for_update()
            .load(conn)
            .context("failed to list account credentials")?;

        Ok(match type_filter {
            None => creds,
            Some(types) => creds
                .into_iter()
                .filter(|c| {
                    c.split_once(':')
                        .map(|(t, _)| types.contains(t))
                        .unwrap_or(false)
                })
                .collect(),
        })
    }

    /// The single account linked to `credential`, or `CredentialNotFound`.
    /// Callers that need to detect a many-accounts conflict should use
    /// `list_accounts` instead.
    pub fn get_account(conn: &mut PgConnection, credential: &str) -> Result<String> {
        let mut accounts = Self::list_accounts(conn, credential)?;
        match accounts.len() {
            0 => Err(CredentialStoreError::CredentialNotFound(credential.to_string()).into()),
            _ => Ok(accounts.remove(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_credential_type_prefix() {
        let creds = vec![
            "google:1".to_string(),
            "anonymous:2".to_string(),
            "dev:3".to_string(),
        ];
        let types: BTreeSet<String> = ["anonymous".to_string(), "dev".to_string()].into();
        let filtered: Vec<_> = creds
            .into_iter()
            .filter(|c| {
                c.split_once(':')
                    .map(|(t, _)| types.contains(t))
                    .unwrap_or(false)
            })
            .collect();
        assert_eq!(filtered, vec!["anonymous:2", "dev:3"]);
    }
}
