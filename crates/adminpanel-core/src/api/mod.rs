//! Identity provider client module.
//!
//! This module provides the `IdentityProvider` seam used by the sign-in flow
//! and `HttpIdentityProvider`, which talks to the dashboard's JSON auth API.
//!
//! The API issues a bearer access token (usually a JWT) on sign-in; the same
//! token is presented to `/api/auth/me` to re-validate a restored session.

pub mod client;
pub mod error;

pub use client::{HttpIdentityProvider, IdentityProvider, ProviderGrant};
pub use error::ApiError;
