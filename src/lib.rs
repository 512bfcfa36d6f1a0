pub mod account_manager;
pub mod common;
pub mod config;
pub mod credential;
pub mod db;
pub mod errors;
pub mod models;
pub mod schema;

pub use account_manager::{AccountService, MergeResolution};
pub use credential::Credential;
pub use errors::{AccountError, AuthenticationError, ServiceError};
pub use models::{AccountSummary, AuthResult, MergeRequiredAccounts, ResultId};
