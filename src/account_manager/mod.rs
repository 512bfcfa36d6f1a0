//! Orchestrates `authorize`, `attach_account` and `resolve_conflict`, which
//! all share one tail: `proceed_authentication`. The hard part is
//! `merge_accounts`, the case-analysis state machine that decides whether an
//! incoming credential is new, belongs to the target account already, or
//! needs to relink (possibly after a human resolves a conflict).
//!
//! `authorize(args, env)`:
//!   1. parse `scopes`, `gamespace`/`gamespace_id`, optional `attach_to`.
//!   2. look up the authenticator for `credential`; `unknown_credential` if absent.
//!   3. resolve the gamespace id; `no_such_gamespace` if absent.
//!   4. run the authenticator; authenticator errors become `AuthenticationError(403, ..)`.
//!   5. if the authenticator is social and `import_profile != "false"`, fire `SocialBridge::import_social`.
//!   6. compose `"{type}:{username}"`.
//!   7. select an account: via `merge_accounts` if `attach_to` is present, else by credential lookup
//!      (0 accounts → create; 1 → use it; >1 → `multiple_accounts_attached`).
//!   8. tail into `proceed_authentication`.
//!
//! `attach_account(args, env)`: validates `access_token` and `attach_to` (distinct error kinds),
//! requires matching gamespace claims, then runs `merge_accounts` with `resolve = None`.
//!
//! `resolve_conflict(args, env)`: `method = multiple_accounts_attached` detaches every
//! other account holding the credential and keeps `resolve_with`; `method = merge_required`
//! re-enters `merge_accounts` with the chosen `resolve_with`.
//!
//! `merge_accounts` case table (`same` = existing credential of `credential_mine`'s type already
//! on `account_attach`; `accounts_mine` = accounts currently linked to `credential_mine`):
//!
//! | same | len(accounts_mine) | action |
//! |---|---|---|
//! | = credential_mine | — | no-op, return `account_attach` |
//! | present, different | 0 | new account, move `credential_attach` onto it |
//! | present, different | 1 | move `credential_attach` onto `accounts_mine[0]` |
//! | present, different | >1 | `multiple_accounts_attached` |
//! | absent | 0 | attach `credential_mine` to `account_attach` |
//! | absent | 1, resolve=None | `merge_required` |
//! | absent | 1, resolve=not_mine | move `credential_mine` onto `account_attach` |
//! | absent | 1, resolve=local | move `credential_mine` and local credentials onto `account_attach` |
//! | absent | 1, resolve=remote | move `credential_attach` onto `account_mine` |
//! | absent | >1 | `multiple_accounts_attached` |

use crate::account_manager::helpers::account::AccountStore;
use crate::account_manager::helpers::credential_store::CredentialStore;
use crate::account_manager::helpers::gamespace::{GamespaceCatalog, ScopeResolver};
use crate::account_manager::helpers::registry::{Authenticator, AuthenticatorRegistry};
use crate::account_manager::helpers::resolve_token::{
    mint_resolve_token, verify_resolve_token, ResolveTokenContext,
};
use crate::account_manager::helpers::signer::{TokenClaims, TokenSigner};
use crate::account_manager::helpers::social::SocialBridge;
use crate::account_manager::helpers::token_store::TokenStore;
use crate::config::ServiceConfig;
use crate::credential::{parse_scopes, validate_token_name, Credential, LOCAL_CREDENTIALS};
use crate::db::DbConn;
use crate::errors::{AccountError, AuthenticationError, ServiceError};
use crate::models::{AccountSummary, AuthResult, MergeRequiredAccounts, ResultId};
use diesel::pg::PgConnection;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub mod helpers;

/// Which side of a pending conflict the caller wants to keep, per
/// `resolve_conflict(method = "merge_required", resolve_with = ...)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeResolution {
    Local,
    Remote,
    NotMine,
}

impl MergeResolution {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "not_mine" => Ok(Self::NotMine),
            other => Err(AuthenticationError::new(
                400,
                ResultId::UnknownMergeOption,
                format!("unknown merge option: {other}"),
            )
            .into()),
        }
    }
}

enum MergeDecision {
    Account(String),
    MergeRequired {
        local: String,
        local_credential: String,
        remote: String,
    },
    MultipleAccountsAttached {
        accounts: Vec<String>,
    },
}

/// Dependency set the merge state machine is built from. Injected once at
/// construction; there is no ambient process-wide state.
pub struct AccountService {
    db: DbConn,
    config: ServiceConfig,
    authenticators: AuthenticatorRegistry,
    token_store: Arc<dyn TokenStore>,
    signer: Arc<dyn TokenSigner>,
    gamespaces: Arc<dyn GamespaceCatalog>,
    access: Arc<dyn ScopeResolver>,
    social: Arc<dyn SocialBridge>,
}

impl AccountService {
    pub fn new(
        db: DbConn,
        config: ServiceConfig,
        authenticators: AuthenticatorRegistry,
        token_store: Arc<dyn TokenStore>,
        signer: Arc<dyn TokenSigner>,
        gamespaces: Arc<dyn GamespaceCatalog>,
        access: Arc<dyn ScopeResolver>,
        social: Arc<dyn SocialBridge>,
    ) -> Self {
        Self {
            db,
            config,
            authenticators,
            token_store,
            signer,
            gamespaces,
            access,
            social,
        }
    }

    fn resolve_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.resolve_token_ttl_secs)
    }

    fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.access_token_ttl_secs)
    }

    async fn gamespace_id(&self, args: &HashMap<String, String>) -> Result<String, ServiceError> {
        if let Some(id) = args.get("gamespace_id") {
            return Ok(id.clone());
        }
        let name = args
            .get("gamespace")
            .ok_or_else(|| AuthenticationError::missing_argument("gamespace"))?;
        self.gamespaces
            .find_gamespace(name)
            .await
            .map_err(|e| AuthenticationError::new(404, ResultId::NoSuchGamespace, e.to_string()).into())
    }

    /// §4.4.1 — verifies a credential proof and lands on an authenticated account.
    #[tracing::instrument(skip(self, args, env))]
    pub async fn authorize(
        &self,
        args: &HashMap<String, String>,
        env: &HashMap<String, String>,
    ) -> Result<AuthResult, ServiceError> {
        let credential_type = args
            .get("credential")
            .ok_or_else(|| AuthenticationError::missing_argument("credential"))?;
        let scopes_raw = args
            .get("scopes")
            .ok_or_else(|| AuthenticationError::missing_argument("scopes"))?;
        let requested_scopes = parse_scopes(scopes_raw);
        let gamespace_id = self.gamespace_id(args).await?;

        let authenticator = self.authenticators.get(credential_type).ok_or_else(|| {
            AuthenticationError::new(
                400,
                ResultId::UnknownCredential,
                format!("no authenticator registered for '{credential_type}'"),
            )
        })?;

        let auth_result = authenticator
            .authorize(&gamespace_id, args, env)
            .await
            .map_err(|e| {
                AuthenticationError::new(403, ResultId::UnknownCredential, e.message.clone())
                    .with_error_code(e.code)
            })?;

        if authenticator.social_profile() {
            let import_profile = args.get("import_profile").map(|v| v != "false").unwrap_or(true);
            if import_profile {
                if let Some(response) = &auth_result.response {
                    match self
                        .social
                        .import_social(
                            &gamespace_id,
                            credential_type,
                            &auth_result.username,
                            &response.data,
                        )
                        .await
                    {
                        Ok(()) => {}
                        Err(e @ crate::account_manager::helpers::social::SocialBridgeError::Remote { .. }) => {
                            tracing::error!(error = %e, "import_social failed with a protocol-level error");
                            return Err(AuthenticationError::new(
                                502,
                                ResultId::FailedToImportSocial,
                                e.to_string(),
                            )
                            .into());
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "import_social failed to reach the social service, continuing");
                        }
                    }
                }
            }
        }

        let credential_mine = Credential::new(auth_result.credential_type.clone(), auth_result.username.clone());
        let credential_mine_str = credential_mine.to_string();

        let (decision, multiple_accounts_code) = if let Some(attach_to_raw) = args.get("attach_to") {
            let attach_to = self.signer.verify(attach_to_raw).map_err(|_| {
                AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token is invalid")
            })?;
            let account_attach = attach_to
                .account
                .clone()
                .ok_or_else(|| AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token carries no account"))?;
            let decision = self
                .merge_accounts(account_attach, attach_to.subject, credential_mine.clone(), None)
                .await?;
            (decision, 409)
        } else {
            let credential_for_tx = credential_mine_str.clone();
            let decision = self
                .db
                .transaction(move |conn| select_account_for_new_credential(conn, &credential_for_tx))
                .await?;
            (decision, 300)
        };

        self.settle_decision(decision, &gamespace_id, &credential_mine, &requested_scopes, args, env, authenticator, multiple_accounts_code)
            .await
    }

    /// §4.4.2 — merges the credential carried by a fresh `access_token` onto the account named by `attach_to`.
    #[tracing::instrument(skip(self, args, env))]
    pub async fn attach_account(
        &self,
        args: &HashMap<String, String>,
        env: &HashMap<String, String>,
    ) -> Result<AuthResult, ServiceError> {
        let access_token_raw = args
            .get("access_token")
            .ok_or_else(|| AuthenticationError::missing_argument("access_token"))?;
        let attach_to_raw = args
            .get("attach_to")
            .ok_or_else(|| AuthenticationError::missing_argument("attach_to"))?;
        let scopes_raw = args
            .get("scopes")
            .ok_or_else(|| AuthenticationError::missing_argument("scopes"))?;
        let requested_scopes = parse_scopes(scopes_raw);

        let access_token = self
            .signer
            .verify(access_token_raw)
            .map_err(|_| AuthenticationError::new(401, ResultId::AccessTokenInvalid, "access_token is invalid"))?;
        let attach_to = self
            .signer
            .verify(attach_to_raw)
            .map_err(|_| AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token is invalid"))?;

        if access_token.gamespace != attach_to.gamespace {
            return Err(AuthenticationError::new(
                409,
                ResultId::WrongGamespace,
                "access_token and attach_to were minted for different gamespaces",
            )
            .into());
        }
        let account_attach = attach_to
            .account
            .clone()
            .ok_or_else(|| AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token carries no account"))?;
        let credential_mine = Credential::parse(&access_token.subject)
            .map_err(|e| AuthenticationError::new(401, ResultId::AccessTokenInvalid, e.to_string()))?;

        let credential_type = credential_mine.credential_type.clone();
        let authenticator = self.authenticators.get(&credential_type).ok_or_else(|| {
            AuthenticationError::new(400, ResultId::UnknownCredential, format!("no authenticator registered for '{credential_type}'"))
        })?;

        let decision = self
            .merge_accounts(account_attach, attach_to.subject.clone(), credential_mine.clone(), None)
            .await?;

        self.settle_decision(
            decision,
            &attach_to.gamespace,
            &credential_mine,
            &requested_scopes,
            args,
            env,
            authenticator,
            409,
        )
        .await
    }

    /// §4.4.3 — finishes a pending conflict carried by a resolve token.
    #[tracing::instrument(skip(self, args, env))]
    pub async fn resolve_conflict(
        &self,
        args: &HashMap<String, String>,
        env: &HashMap<String, String>,
    ) -> Result<AuthResult, ServiceError> {
        let resolve_token_raw = args
            .get("resolve_token")
            .ok_or_else(|| AuthenticationError::missing_argument("resolve_token"))?;
        let method = args
            .get("method")
            .ok_or_else(|| AuthenticationError::missing_argument("method"))?;
        let scopes_raw = args
            .get("scopes")
            .ok_or_else(|| AuthenticationError::missing_argument("scopes"))?;
        let requested_scopes = parse_scopes(scopes_raw);

        let ResolveTokenContext { credential, gamespace } = verify_resolve_token(self.signer.as_ref(), resolve_token_raw)
            .map_err(|e| AuthenticationError::new(401, ResultId::CannotResolveConflict, e.to_string()))?;
        let credential_mine = Credential::parse(&credential)
            .map_err(|e| AuthenticationError::new(401, ResultId::CannotResolveConflict, e.to_string()))?;
        let authenticator = self.authenticators.get(&credential_mine.credential_type).ok_or_else(|| {
            AuthenticationError::new(400, ResultId::UnknownCredential, format!("no authenticator registered for '{}'", credential_mine.credential_type))
        })?;

        let decision = match method.as_str() {
            "multiple_accounts_attached" => {
                let resolve_with = args
                    .get("resolve_with")
                    .ok_or_else(|| AuthenticationError::missing_argument("resolve_with"))?
                    .clone();
                let credential_str = credential_mine.to_string();
                match self
                    .db
                    .transaction(move |conn| resolve_multiple_accounts(conn, &credential_str, &resolve_with))
                    .await
                {
                    Ok(decision) => decision,
                    Err(e) => match e.downcast_ref::<ResolveWithNotAttached>() {
                        Some(not_attached) => {
                            return Err(AuthenticationError::new(409, ResultId::CannotResolveConflict, not_attached.to_string()).into())
                        }
                        None => return Err(e.into()),
                    },
                }
            }
            "merge_required" => {
                let attach_to_raw = args
                    .get("attach_to")
                    .ok_or_else(|| AuthenticationError::missing_argument("attach_to"))?;
                let attach_to = self
                    .signer
                    .verify(attach_to_raw)
                    .map_err(|_| AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token is invalid"))?;
                let account_attach = attach_to
                    .account
                    .clone()
                    .ok_or_else(|| AuthenticationError::new(401, ResultId::AttachToTokenInvalid, "attach_to token carries no account"))?;
                let resolve_with = args
                    .get("resolve_with")
                    .ok_or_else(|| AuthenticationError::missing_argument("resolve_with"))?;
                let resolve = MergeResolution::parse(resolve_with)?;
                self.merge_accounts(account_attach, attach_to.subject, credential_mine.clone(), Some(resolve))
                    .await?
            }
            other => {
                return Err(AuthenticationError::new(
                    400,
                    ResultId::BadResolveMethod,
                    format!("unknown resolve method: {other}"),
                )
                .into())
            }
        };

        self.settle_decision(decision, &gamespace, &credential_mine, &requested_scopes, args, env, authenticator, 300)
            .await
    }

    /// Turns a `MergeDecision` into either a minted token or a structured conflict error,
    /// including the async follow-ups (`invalidate_account`, `mass_profiles`) a pure DB
    /// transaction cannot perform itself.
    #[allow(clippy::too_many_arguments)]
    async fn settle_decision(
        &self,
        decision: MergeDecision,
        gamespace_id: &str,
        credential: &Credential,
        requested_scopes: &BTreeSet<String>,
        args: &HashMap<String, String>,
        env: &HashMap<String, String>,
        authenticator: Arc<dyn Authenticator>,
        multiple_accounts_code: u16,
    ) -> Result<AuthResult, ServiceError> {
        match decision {
            MergeDecision::Account(account) => {
                self.proceed_authentication(&account, credential, gamespace_id, requested_scopes, args, env, authenticator)
                    .await
            }
            MergeDecision::MergeRequired { local, local_credential, remote } => {
                let resolve_token = mint_resolve_token(self.signer.as_ref(), &credential.to_string(), gamespace_id, self.resolve_token_ttl())?;
                let mut profiles = self.fetch_profiles(gamespace_id, &[local.clone(), remote.clone()]).await;
                Err(AuthenticationError::new(409, ResultId::MergeRequired, "the credential and attach_to accounts both exist; choose local, remote, or not_mine")
                    .with_resolve_token(resolve_token)
                    .with_merge_accounts(MergeRequiredAccounts {
                        local: AccountSummary { account: local.clone(), credential: Some(local_credential), profile: profiles.remove(&local) },
                        remote: AccountSummary { account: remote.clone(), credential: Some(credential.to_string()), profile: profiles.remove(&remote) },
                    })
                    .into())
            }
            MergeDecision::MultipleAccountsAttached { accounts } => {
                let resolve_token = mint_resolve_token(self.signer.as_ref(), &credential.to_string(), gamespace_id, self.resolve_token_ttl())?;
                let mut profiles = self.fetch_profiles(gamespace_id, &accounts).await;
                let summaries = accounts
                    .iter()
                    .map(|a| AccountSummary { account: a.clone(), credential: Some(credential.to_string()), profile: profiles.remove(a) })
                    .collect();
                Err(AuthenticationError::new(multiple_accounts_code, ResultId::MultipleAccountsAttached, "multiple accounts are attached to this credential")
                    .with_resolve_token(resolve_token)
                    .with_accounts(summaries)
                    .into())
            }
        }
    }

    async fn fetch_profiles(&self, gamespace_id: &str, accounts: &[String]) -> HashMap<String, serde_json::Value> {
        match self.social.mass_profiles(gamespace_id, accounts).await {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::error!(error = %e, "mass_profiles failed while assembling a conflict payload");
                HashMap::new()
            }
        }
    }

    /// §4.4.4 — the merge state machine. Credential relinking runs inside one
    /// transaction; token invalidation for any displaced account happens
    /// afterward, best-effort, since the token store is external to Postgres.
    async fn merge_accounts(
        &self,
        account_attach: String,
        credential_attach: String,
        credential_mine: Credential,
        resolve: Option<MergeResolution>,
    ) -> Result<MergeDecision, ServiceError> {
        let (decision, to_invalidate) = self
            .db
            .transaction(move |conn| merge_accounts_tx(conn, &account_attach, &credential_attach, &credential_mine, resolve))
            .await?;

        for account in to_invalidate {
            if let Err(e) = self.token_store.invalidate_account(&account).await {
                tracing::warn!(error = %e, account, "failed to invalidate tokens on a displaced account");
            }
        }

        Ok(decision)
    }

    /// §4.4.5 — scope resolution and token minting, the common tail of every entry point.
    #[allow(clippy::too_many_arguments)]
    async fn proceed_authentication(
        &self,
        account: &str,
        credential: &Credential,
        gamespace_id: &str,
        requested_scopes: &BTreeSet<String>,
        args: &HashMap<String, String>,
        env: &HashMap<String, String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<AuthResult, ServiceError> {
        let token_name = match args.get("as") {
            Some(name) => {
                if !validate_token_name(name) {
                    return Err(AuthenticationError::new(400, ResultId::BadAuthAs, format!("invalid token name: {name}")).into());
                }
                name.clone()
            }
            None => "def".to_string(),
        };

        if authenticator.social_profile() {
            let fetch_profile = args.get("import_profile").map(|v| v != "false").unwrap_or(true);
            if let Err(e) = self
                .social
                .attach_account(gamespace_id, &credential.credential_type, &credential.username, account, env, fetch_profile)
                .await
            {
                tracing::warn!(error = %e, "attach_account profile fetch failed, continuing");
            }
        }

        let mut user_scopes = self.access.get_account_access(gamespace_id, account).await;
        match self.gamespaces.get_gamespace_access_scopes(gamespace_id).await {
            Ok(gamespace_scopes) => user_scopes.extend(gamespace_scopes),
            Err(e) => tracing::warn!(error = %e, "failed to load gamespace access scopes"),
        }

        if let Some(should_have_raw) = args.get("should_have") {
            let required: Option<BTreeSet<String>> = if should_have_raw == "*" { None } else { Some(parse_scopes(should_have_raw)) };
            for scope in requested_scopes {
                if user_scopes.contains(scope) {
                    continue;
                }
                let must_have = match &required {
                    None => true,
                    Some(set) => set.contains(scope),
                };
                if must_have {
                    return Err(AuthenticationError::new(403, ResultId::ScopeRestricted, format!("missing required scope: {scope}")).into());
                }
            }
        }

        let unique = args.get("unique").map(|v| v != "false").unwrap_or(true);
        if !unique && !user_scopes.contains("auth_non_unique") {
            return Err(AuthenticationError::new(403, ResultId::NonUniqueTokenRestricted, "non-unique tokens require the auth_non_unique scope").into());
        }

        let allowed_scopes: Vec<String> = requested_scopes.intersection(&user_scopes).cloned().collect();

        if let Some(raw_info) = args.get("info") {
            let patch: serde_json::Value = serde_json::from_str(raw_info)
                .map_err(|_| AuthenticationError::new(400, ResultId::BadAccountInfo, "info must be valid JSON"))?;
            if !patch.is_object() {
                return Err(AuthenticationError::new(400, ResultId::BadAccountInfo, "info must be a JSON object").into());
            }
            let account_for_tx = account.to_string();
            self.db
                .transaction(move |conn| AccountStore::update_info(conn, &account_for_tx, &patch))
                .await?;
        }

        let claims = TokenClaims {
            account: Some(account.to_string()),
            gamespace: gamespace_id.to_string(),
            issuer_tag: unique.then(|| self.config.issuer.clone()),
        };
        let minted = self
            .signer
            .mint(&allowed_scopes, claims, &credential.to_string(), self.access_token_ttl())?;

        if unique {
            self.token_store.save(account, &token_name, &minted.uuid, minted.expires_at).await?;
        }

        if authenticator.social_profile() {
            if let Err(e) = self.social.update_profile(gamespace_id, account, &serde_json::json!({})).await {
                tracing::warn!(error = %e, "update_profile failed, continuing");
            }
        }

        Ok(AuthResult {
            token: minted.token,
            account: account.to_string(),
            credential: credential.to_string(),
            scopes: allowed_scopes,
        })
    }

    pub async fn create_account(&self) -> Result<String, AccountError> {
        self.db.transaction(AccountStore::create_account).await.map_err(AccountError)
    }

    pub async fn check_account_exists(&self, account: &str) -> Result<bool, AccountError> {
        let account = account.to_string();
        self.db
            .transaction(move |conn| AccountStore::exists(conn, &account))
            .await
            .map_err(AccountError)
    }

    pub async fn get_account_info(&self, account: &str) -> Result<Option<serde_json::Value>, AccountError> {
        let account = account.to_string();
        self.db
            .transaction(move |conn| AccountStore::get_info(conn, &account))
            .await
            .map_err(AccountError)
    }

    pub async fn update_account_info(&self, account: &str, patch: serde_json::Value) -> Result<(), AccountError> {
        let account = account.to_string();
        self.db
            .transaction(move |conn| AccountStore::update_info(conn, &account, &patch))
            .await
            .map_err(AccountError)
    }

    /// Detaches every credential from `account`, then removes the row — see
    /// DESIGN.md for why this is the intended behavior rather than a direct
    /// port of the reference implementation.
    pub async fn delete_account(&self, account: &str) -> Result<(), AccountError> {
        let account = account.to_string();
        self.db
            .transaction(move |conn| {
                let credentials = CredentialStore::list_account_credentials(conn, &account, None)?;
                for credential in credentials {
                    CredentialStore::detach(conn, &credential, &account)?;
                }
                AccountStore::delete(conn, &account)
            })
            .await
            .map_err(AccountError)
    }

    pub async fn accounts_deleted(&self, accounts: Vec<String>, gamespace_only: bool) -> Result<(), AccountError> {
        self.db
            .transaction(move |conn| AccountStore::accounts_deleted(conn, &accounts, gamespace_only))
            .await
            .map_err(AccountError)
    }
}

/// §4.4.1 step 7, account-selection-without-an-`attach_to` branch.
fn select_account_for_new_credential(conn: &mut PgConnection, credential: &str) -> anyhow::Result<MergeDecision> {
    let mut accounts = CredentialStore::list_accounts(conn, credential)?;
    match accounts.len() {
        0 => {
            let account = AccountStore::create_account(conn)?;
            CredentialStore::attach(conn, credential, &account)?;
            Ok(MergeDecision::Account(account))
        }
        1 => Ok(MergeDecision::Account(accounts.remove(0))),
        _ => Ok(MergeDecision::MultipleAccountsAttached { accounts }),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not among the accounts attached to this credential")]
struct ResolveWithNotAttached(String);

fn resolve_multiple_accounts(conn: &mut PgConnection, credential: &str, resolve_with: &str) -> anyhow::Result<MergeDecision> {
    let accounts = CredentialStore::list_accounts(conn, credential)?;
    if !accounts.iter().any(|a| a == resolve_with) {
        return Err(ResolveWithNotAttached(resolve_with.to_string()).into());
    }
    for account in &accounts {
        if account != resolve_with {
            CredentialStore::detach(conn, credential, account)?;
        }
    }
    Ok(MergeDecision::Account(resolve_with.to_string()))
}

fn merge_accounts_tx(
    conn: &mut PgConnection,
    account_attach: &str,
    credential_attach: &str,
    credential_mine: &Credential,
    resolve: Option<MergeResolution>,
) -> anyhow::Result<(MergeDecision, Vec<String>)> {
    let credential_mine_str = credential_mine.to_string();
    let type_filter: BTreeSet<String> = [credential_mine.credential_type.clone()].into();
    let same = CredentialStore::list_account_credentials(conn, account_attach, Some(&type_filter))?
        .into_iter()
        .next();
    let mut accounts_mine = CredentialStore::list_accounts(conn, &credential_mine_str)?;

    if let Some(same_credential) = same {
        if same_credential == credential_mine_str {
            return Ok((MergeDecision::Account(account_attach.to_string()), vec![]));
        }
        return match accounts_mine.len() {
            0 => {
                let new_account = AccountStore::create_account(conn)?;
                CredentialStore::attach(conn, &credential_mine_str, &new_account)?;
                CredentialStore::detach(conn, credential_attach, account_attach)?;
                CredentialStore::attach(conn, credential_attach, &new_account)?;
                Ok((MergeDecision::Account(new_account), vec![account_attach.to_string()]))
            }
            1 => {
                let target = accounts_mine.remove(0);
                CredentialStore::detach(conn, credential_attach, account_attach)?;
                CredentialStore::attach(conn, credential_attach, &target)?;
                Ok((MergeDecision::Account(target), vec![account_attach.to_string()]))
            }
            _ => Ok((MergeDecision::MultipleAccountsAttached { accounts: accounts_mine }, vec![])),
        };
    }

    match accounts_mine.len() {
        0 => {
            CredentialStore::attach(conn, &credential_mine_str, account_attach)?;
            Ok((MergeDecision::Account(account_attach.to_string()), vec![]))
        }
        1 => {
            let account_mine = accounts_mine.remove(0);
            match resolve {
                None => Ok((
                    MergeDecision::MergeRequired {
                        local: account_attach.to_string(),
                        local_credential: credential_attach.to_string(),
                        remote: account_mine,
                    },
                    vec![],
                )),
                Some(MergeResolution::NotMine) => {
                    CredentialStore::detach(conn, &credential_mine_str, &account_mine)?;
                    CredentialStore::attach(conn, &credential_mine_str, account_attach)?;
                    Ok((MergeDecision::Account(account_attach.to_string()), vec![]))
                }
                Some(MergeResolution::Local) => {
                    CredentialStore::detach(conn, &credential_mine_str, &account_mine)?;
                    CredentialStore::attach(conn, &credential_mine_str, account_attach)?;
                    for local_type in LOCAL_CREDENTIALS {
                        let local_filter: BTreeSet<String> = [local_type.to_string()].into();
                        let locals = CredentialStore::list_account_credentials(conn, &account_mine, Some(&local_filter))?;
                        for local_credential in locals {
                            CredentialStore::detach(conn, &local_credential, &account_mine)?;
                            CredentialStore::attach(conn, &local_credential, account_attach)?;
                        }
                    }
                    Ok((MergeDecision::Account(account_attach.to_string()), vec![account_mine]))
                }
                Some(MergeResolution::Remote) => {
                    CredentialStore::detach(conn, credential_attach, account_attach)?;
                    CredentialStore::attach(conn, credential_attach, &account_mine)?;
                    Ok((MergeDecision::Account(account_mine), vec![account_attach.to_string()]))
                }
            }
        }
        _ => Ok((MergeDecision::MultipleAccountsAttached { accounts: accounts_mine }, vec![])),
    }
}
