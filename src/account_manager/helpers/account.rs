use crate::common::json_merge::deep_merge;
use crate::schema::accounts::dsl as AccountsSchema;
use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;

/// Create, read, update and delete account rows. The `account_info` column is
/// an opaque JSON blob the service never interprets; callers only ever patch
/// it with a deep merge (see `update_info`).
pub struct AccountStore;

impl AccountStore {
    /// Inserts a row with empty JSON info and returns the new id as a string.
    pub fn create_account(conn: &mut PgConnection) -> Result<String> {
        let id: i64 = diesel::insert_into(AccountsSchema::accounts)
            .values(AccountsSchema::account_info.eq(Value::Object(Default::default())))
            .returning(AccountsSchema::account_id)
            .get_result(conn)
            .context("failed to create account")?;
        Ok(id.to_string())
    }

    pub fn exists(conn: &mut PgConnection, account: &str) -> Result<bool> {
        let account_id = parse_account_id(account)?;
        let found: Option<i64> = AccountsSchema::accounts
            .filter(AccountsSchema::account_id.eq(account_id))
            .select(AccountsSchema::account_id)
            .first(conn)
            .optional()
            .context("failed to check account existence")?;
        Ok(found.is_some())
    }

    pub fn get_info(conn: &mut PgConnection, account: &str) -> Result<Option<Value>> {
        let account_id = parse_account_id(account)?;
        let info: Option<Value> = AccountsSchema::accounts
            .filter(AccountsSchema::account_id.eq(account_id))
            .select(AccountsSchema::account_info)
            .first(conn)
            .optional()
            .context("failed to load account info")?;
        Ok(info)
    }

    /// Deep-merges `patch` into the account's existing `account_info`.
    /// `patch` must be a JSON object.
    pub fn update_info(conn: &mut PgConnection, account: &str, patch: &Value) -> Result<()> {
        if !patch.is_object() {
            anyhow::bail!("account info patch must be a JSON object");
        }
        let account_id = parse_account_id(account)?;
        let mut current = Self::get_info(conn, account)?.unwrap_or_else(|| Value::Object(Default::default()));
        deep_merge(&mut current, patch);

        diesel::update(AccountsSchema::accounts.filter(AccountsSchema::account_id.eq(account_id)))
            .set(AccountsSchema::account_info.eq(current))
            .execute(conn)
            .context("failed to update account info")?;
        Ok(())
    }

    /// Removes the account row. Caller must have already detached every
    /// credential pointing to it.
    pub fn delete(conn: &mut PgConnection, account: &str) -> Result<()> {
        let account_id = parse_account_id(account)?;
        diesel::delete(AccountsSchema::accounts.filter(AccountsSchema::account_id.eq(account_id)))
            .execute(conn)
            .context("failed to delete account")?;
        Ok(())
    }

    /// Batched cascade delete triggered by an external account-deletion
    /// event. `gamespace_only` short-circuits because this core owns no
    /// per-gamespace data.
    pub fn accounts_deleted(
        conn: &mut PgConnection,
        accounts: &[String],
        gamespace_only: bool,
    ) -> Result<()> {
        if gamespace_only || accounts.is_empty() {
            return Ok(());
        }
        use crate::schema::account_credentials::dsl as CredSchema;
        let account_ids: Vec<i64> = accounts
            .iter()
            .map(|a| parse_account_id(a))
            .collect::<Result<_>>()?;

        diesel::delete(CredSchema::account_credentials.filter(CredSchema::account_id.eq_any(&account_ids)))
            .execute(conn)
            .context("failed to cascade-delete credentials")?;
        diesel::delete(AccountsSchema::accounts.filter(AccountsSchema::account_id.eq_any(&account_ids)))
            .execute(conn)
            .context("failed to cascade-delete accounts")?;
        Ok(())
    }
}

pub fn parse_account_id(account: &str) -> Result<i64> {
    account
        .parse::<i64>()
        .with_context(|| format!("account id '{account}' is not a positive integer"))
}
