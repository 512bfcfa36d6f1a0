use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error/outcome tag carried in the error envelope. Mirrors
/// the `result_id` strings in the external interface exactly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultId {
    MissingArgument,
    UnknownCredential,
    NoSuchGamespace,
    WrongGamespace,
    AccessTokenInvalid,
    AttachToTokenInvalid,
    BadAuthAs,
    BadAccountInfo,
    ScopeRestricted,
    NonUniqueTokenRestricted,
    MergeRequired,
    MultipleAccountsAttached,
    UnknownMergeOption,
    CannotResolveConflict,
    BadResolveMethod,
    FailedToImportSocial,
    InternalError,
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("internal_error"))
    }
}

/// One side of a `merge_required` conflict, or one entry of a
/// `multiple_accounts_attached` summary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequiredAccounts {
    pub local: AccountSummary,
    pub remote: AccountSummary,
}

/// Successful `authorize` / `attach_account` / `resolve_conflict` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResult {
    pub token: String,
    pub account: String,
    pub credential: String,
    pub scopes: Vec<String>,
}
