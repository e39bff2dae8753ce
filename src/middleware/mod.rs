pub mod auth_context;
pub mod client_meta;
