//! End-to-end coverage of the merge state machine and scope resolution
//! against a real Postgres instance. Requires Docker; run with
//! `cargo test --test merge_state_machine -- --ignored`.

mod common;

use accord_identity::account_manager::helpers::account::AccountStore;
use accord_identity::account_manager::helpers::credential_store::CredentialStore;
use accord_identity::account_manager::helpers::gamespace::InMemoryGamespaces;
use accord_identity::account_manager::helpers::registry::{
    AnonymousAuthenticator, AuthenticatorRegistry, DevAuthenticator,
};
use accord_identity::account_manager::helpers::signer::{TokenClaims, TokenSigner};
use accord_identity::account_manager::helpers::social::MockSocialBridge;
use accord_identity::account_manager::helpers::token_store::InMemoryTokenStore;
use accord_identity::config::ServiceConfig;
use accord_identity::db::DbConn;
use accord_identity::{AccountService, ResultId, ServiceError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const GAMESPACE: &str = "7";

fn config() -> ServiceConfig {
    ServiceConfig {
        database_url: String::new(),
        signing_key_hex: String::new(),
        issuer: "login".to_string(),
        access_token_ttl_secs: 7200,
        resolve_token_ttl_secs: 600,
    }
}

fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

struct Harness {
    svc: AccountService,
    db: DbConn,
    signer: Arc<dyn TokenSigner>,
}

async fn harness() -> Harness {
    let db = common::fresh_db().await.expect("fresh test database");
    let mut authenticators = AuthenticatorRegistry::new();
    authenticators.register(Arc::new(AnonymousAuthenticator));
    authenticators.register(Arc::new(DevAuthenticator));

    let gamespaces = Arc::new(InMemoryGamespaces::new());
    gamespaces.register_gamespace("prod", GAMESPACE, BTreeSet::new());

    let signer = common::random_signer();
    let svc = AccountService::new(
        db.clone(),
        config(),
        authenticators,
        Arc::new(InMemoryTokenStore::new()),
        signer.clone(),
        gamespaces.clone(),
        gamespaces,
        Arc::new(MockSocialBridge::new()),
    );
    Harness { svc, db, signer }
}

impl Harness {
    /// Mints a token the way `proceed_authentication` would, without going
    /// through `authorize` first — lets a test set up `accounts_mine` state
    /// that doesn't exist yet in storage.
    fn mint(&self, subject: &str, account: Option<&str>) -> String {
        self.signer
            .mint(&[], TokenClaims { account: account.map(String::from), gamespace: GAMESPACE.to_string(), issuer_tag: None }, subject, chrono::Duration::hours(1))
            .unwrap()
            .token
    }

    async fn create_account(&self) -> String {
        let db = self.db.clone();
        db.transaction(AccountStore::create_account).await.unwrap()
    }

    async fn attach(&self, credential: &str, account: &str) {
        let (credential, account) = (credential.to_string(), account.to_string());
        self.db
            .transaction(move |conn| CredentialStore::attach(conn, &credential, &account))
            .await
            .unwrap();
    }

    async fn accounts_for(&self, credential: &str) -> Vec<String> {
        let credential = credential.to_string();
        self.db
            .transaction(move |conn| CredentialStore::list_accounts(conn, &credential))
            .await
            .unwrap()
    }
}

#[tokio::test]
#[ignore]
async fn first_login_creates_a_fresh_account() {
    let h = harness().await;
    let result = h
        .svc
        .authorize(
            &args(&[("credential", "anonymous"), ("username", "player1"), ("scopes", ""), ("gamespace", "prod")]),
            &HashMap::new(),
        )
        .await
        .unwrap();
    // account "1" is reserved by the fixture seed row.
    assert_eq!(result.account, "2");
    assert_eq!(result.credential, "anonymous:player1");
}

#[tokio::test]
#[ignore]
async fn same_credential_relogin_reuses_the_account_and_rotates_the_token() {
    let h = harness().await;
    let login_args = args(&[("credential", "anonymous"), ("username", "player1"), ("scopes", ""), ("gamespace", "prod")]);

    let first = h.svc.authorize(&login_args, &HashMap::new()).await.unwrap();
    let second = h.svc.authorize(&login_args, &HashMap::new()).await.unwrap();

    assert_eq!(first.account, second.account);
    assert_ne!(first.token, second.token);
}

#[tokio::test]
#[ignore]
async fn attach_account_links_a_fresh_credential_with_no_existing_claim() {
    let h = harness().await;
    let account_a = h.create_account().await;
    h.attach("anonymous:guest1", &account_a).await;

    // "dev:dev1" has never been seen before: accounts_mine is empty, so the
    // merge attaches it straight onto account_a with no conflict.
    let access_token = h.mint("dev:dev1", None);
    let attach_to = h.mint("anonymous:guest1", Some(&account_a));

    let result = h
        .svc
        .attach_account(&args(&[("access_token", &access_token), ("attach_to", &attach_to), ("scopes", "")]), &HashMap::new())
        .await
        .unwrap();

    assert_eq!(result.account, account_a);
    assert_eq!(h.accounts_for("dev:dev1").await, vec![account_a]);
}

#[tokio::test]
#[ignore]
async fn attach_account_with_an_existing_claim_requires_resolution_then_keeps_remote() {
    let h = harness().await;
    let account_a = h.create_account().await;
    h.attach("anonymous:guest2", &account_a).await;
    let account_b = h.create_account().await;
    h.attach("dev:dev2", &account_b).await;

    let access_token = h.mint("dev:dev2", Some(&account_b));
    let attach_to = h.mint("anonymous:guest2", Some(&account_a));

    let err = h
        .svc
        .attach_account(&args(&[("access_token", &access_token), ("attach_to", &attach_to), ("scopes", "")]), &HashMap::new())
        .await
        .unwrap_err();

    let ServiceError::Authentication(auth_err) = err else {
        panic!("expected a merge_required AuthenticationError");
    };
    assert_eq!(auth_err.code, 409);
    assert_eq!(auth_err.result_id, ResultId::MergeRequired);
    let merge_accounts = auth_err.merge_accounts.expect("merge_required carries both sides");
    assert_eq!(merge_accounts.local.account, account_a);
    assert_eq!(merge_accounts.remote.account, account_b);

    let resolved = h
        .svc
        .resolve_conflict(
            &args(&[
                ("resolve_token", auth_err.resolve_token.as_deref().unwrap()),
                ("method", "merge_required"),
                ("resolve_with", "remote"),
                ("attach_to", &attach_to),
                ("scopes", ""),
            ]),
            &HashMap::new(),
        )
        .await
        .unwrap();

    // `remote` keeps account_b and moves the anonymous credential onto it.
    assert_eq!(resolved.account, account_b);
    assert_eq!(h.accounts_for("anonymous:guest2").await, vec![account_b]);
}

#[tokio::test]
#[ignore]
async fn resolve_multiple_accounts_attached_detaches_every_other_claim() {
    let h = harness().await;
    let account_a = h.create_account().await;
    let account_b = h.create_account().await;
    // A duplicate physical claim on one credential, the state the resolver
    // is meant to clean up.
    h.attach("dev:shared", &account_a).await;
    h.attach("dev:shared", &account_b).await;

    let err = h
        .svc
        .authorize(
            &args(&[("credential", "dev"), ("username", "shared"), ("scopes", ""), ("gamespace", "prod")]),
            &HashMap::new(),
        )
        .await
        .unwrap_err();

    let ServiceError::Authentication(auth_err) = err else {
        panic!("expected a multiple_accounts_attached AuthenticationError");
    };
    assert_eq!(auth_err.result_id, ResultId::MultipleAccountsAttached);
    assert_eq!(auth_err.code, 300);
    let accounts: Vec<String> = auth_err.accounts.unwrap().into_iter().map(|a| a.account).collect();
    assert!(accounts.contains(&account_a) && accounts.contains(&account_b));

    let resolved = h
        .svc
        .resolve_conflict(
            &args(&[
                ("resolve_token", auth_err.resolve_token.as_deref().unwrap()),
                ("method", "multiple_accounts_attached"),
                ("resolve_with", &account_a),
                ("scopes", ""),
            ]),
            &HashMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(resolved.account, account_a);
    assert_eq!(h.accounts_for("dev:shared").await, vec![account_a]);
}

#[tokio::test]
#[ignore]
async fn non_unique_token_requires_the_auth_non_unique_scope() {
    let h = harness().await;
    let err = h
        .svc
        .authorize(
            &args(&[
                ("credential", "anonymous"),
                ("username", "service-account"),
                ("scopes", ""),
                ("gamespace", "prod"),
                ("unique", "false"),
            ]),
            &HashMap::new(),
        )
        .await
        .unwrap_err();

    let ServiceError::Authentication(auth_err) = err else {
        panic!("expected a scope-restriction AuthenticationError");
    };
    assert_eq!(auth_err.code, 403);
    assert_eq!(auth_err.result_id, ResultId::NonUniqueTokenRestricted);
}

#[tokio::test]
#[ignore]
async fn account_info_patch_is_deep_merged_and_persisted() {
    let h = harness().await;
    let result = h
        .svc
        .authorize(
            &args(&[
                ("credential", "anonymous"),
                ("username", "infoful"),
                ("scopes", ""),
                ("gamespace", "prod"),
                ("info", r#"{"prefs":{"volume":5}}"#),
            ]),
            &HashMap::new(),
        )
        .await
        .unwrap();

    let info = h.svc.get_account_info(&result.account).await.unwrap().unwrap();
    assert_eq!(info["prefs"]["volume"], 5);

    h.svc
        .update_account_info(&result.account, serde_json::json!({"prefs": {"brightness": 8}}))
        .await
        .unwrap();
    let info = h.svc.get_account_info(&result.account).await.unwrap().unwrap();
    assert_eq!(info["prefs"]["volume"], 5);
    assert_eq!(info["prefs"]["brightness"], 8);
}

#[tokio::test]
#[ignore]
async fn delete_account_detaches_every_credential_first() {
    let h = harness().await;
    let result = h
        .svc
        .authorize(
            &args(&[("credential", "anonymous"), ("username", "doomed"), ("scopes", ""), ("gamespace", "prod")]),
            &HashMap::new(),
        )
        .await
        .unwrap();

    h.svc.delete_account(&result.account).await.unwrap();
    assert!(!h.svc.check_account_exists(&result.account).await.unwrap());
}
