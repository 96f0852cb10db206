pub mod auth_client;
pub mod credential_store;
pub mod error;
pub mod transport;
