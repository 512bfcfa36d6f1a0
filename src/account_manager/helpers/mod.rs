pub mod account;
pub mod credential_store;
pub mod gamespace;
pub mod registry;
pub mod resolve_token;
pub mod signer;
pub mod social;
pub mod token_store;
