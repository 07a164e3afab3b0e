//! Authentication Module
//! Mission: Admin credentials, JWT sessions, token revocation and the request gateway

pub mod admin_store;
pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod revocation;

pub use admin_store::AdminStore;
pub use api::AuthState;
pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, AuthenticatedAdmin};
pub use revocation::RevocationList;
