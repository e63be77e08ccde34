//! Core library for adminpanel.
//!
//! Credential validation, sign-in against the dashboard's identity provider,
//! and the session context consumed by front ends.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, HttpIdentityProvider, IdentityProvider};
pub use auth::{
    validate, AuthError, Authenticator, Credentials, Locale, RoleLabel, Session, SessionContext,
    SubmitError, UserIdentity,
};
pub use config::{Config, StoreBackend};
