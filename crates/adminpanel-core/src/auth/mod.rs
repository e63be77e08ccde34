//! Authentication module for validating credentials and managing sessions.
//!
//! This module provides:
//! - `validate`: local email/password checks, no network
//! - `Authenticator`: sign-in/sign-out against an identity provider
//! - `SessionContext`: the shared current-session holder
//! - `SessionStore`: durable persistence of the session (file, keychain, memory)
//!
//! Sessions are persisted so a restart can restore them, and expire at the
//! token's `exp` claim (30 minutes when the provider gives no expiry).

pub mod authenticator;
pub mod context;
pub mod credentials;
pub mod error;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use authenticator::Authenticator;
pub use context::SessionContext;
pub use credentials::{validate, Credentials, Field, FieldError, FieldErrors};
pub use error::{AuthError, SessionRestoreError, SubmitError};
pub use roles::{Locale, RoleLabel};
pub use session::{Session, UserIdentity};
pub use store::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};
