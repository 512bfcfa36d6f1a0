use crate::models::{AccountSummary, MergeRequiredAccounts, ResultId};
use serde::Serialize;
use thiserror::Error;

/// A user-visible, protocol-level outcome. `code` is carried through to the
/// transport as an HTTP status; 300 and 409 mark conflict flows that hand the
/// caller actionable state (a resolve token) rather than a bare failure.
#[derive(Clone, Debug, Error, Serialize)]
#[error("{result_id} ({code}): {info:?}")]
pub struct AuthenticationError {
    pub code: u16,
    pub result_id: ResultId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<AccountSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_accounts: Option<MergeRequiredAccounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl AuthenticationError {
    pub fn new(code: u16, result_id: ResultId, info: impl Into<String>) -> Self {
        Self {
            code,
            result_id,
            info: Some(info.into()),
            accounts: None,
            merge_accounts: None,
            resolve_token: None,
            error: None,
            credential: None,
        }
    }

    pub fn missing_argument(name: &str) -> Self {
        Self::new(
            400,
            ResultId::MissingArgument,
            format!("Missing required argument: {name}"),
        )
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_resolve_token(mut self, token: impl Into<String>) -> Self {
        self.resolve_token = Some(token.into());
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<AccountSummary>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_merge_accounts(mut self, accounts: MergeRequiredAccounts) -> Self {
        self.merge_accounts = Some(accounts);
        self
    }

    pub fn with_error_code(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// An internal/storage failure. Not resolvable by retry at the protocol
/// layer; the transport should surface this as a 5xx with no further detail.
#[derive(Debug, Error)]
#[error("account store error: {0}")]
pub struct AccountError(#[from] pub anyhow::Error);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Account(#[from] AccountError),
}

impl From<anyhow::Error> for ServiceError {
    fn from(e: anyhow::Error) -> Self {
        ServiceError::Account(AccountError(e))
    }
}

impl From<crate::account_manager::helpers::signer::SignerError> for ServiceError {
    fn from(e: crate::account_manager::helpers::signer::SignerError) -> Self {
        ServiceError::Account(AccountError(e.into()))
    }
}

impl From<crate::account_manager::helpers::token_store::TokenStoreError> for ServiceError {
    fn from(e: crate::account_manager::helpers::token_store::TokenStoreError) -> Self {
        ServiceError::Account(AccountError(e.into()))
    }
}
