//! In-process identity provider for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, IdentityProvider, ProviderGrant};

use super::credentials::Credentials;
use super::session::{test_identity, UserIdentity};

#[derive(Clone, Copy)]
enum Mode {
    Accept,
    Reject,
    Fail,
}

pub(crate) struct MockProvider {
    mode: Mode,
    identity: UserIdentity,
    owner_per_token: bool,
    delays: Mutex<VecDeque<Duration>>,
    exchange_calls: AtomicUsize,
    identity_calls: AtomicUsize,
}

impl MockProvider {
    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            identity: test_identity(&["admin", "user"]),
            owner_per_token: false,
            delays: Mutex::new(VecDeque::new()),
            exchange_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
        }
    }

    pub fn accepting() -> Self {
        Self::with_mode(Mode::Accept)
    }

    /// Answers 401 to everything
    pub fn rejecting() -> Self {
        Self::with_mode(Mode::Reject)
    }

    /// Answers 503 to everything
    pub fn failing() -> Self {
        Self::with_mode(Mode::Fail)
    }

    pub fn with_identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Identity lookups answer with a user whose id is `owner-of-<token>`
    pub fn with_owner_per_token(mut self) -> Self {
        self.owner_per_token = true;
        self
    }

    /// Per-call response delays, consumed in call order
    pub fn with_delays(self, delays: &[Duration]) -> Self {
        *self.delays.lock().unwrap() = delays.iter().copied().collect();
        self
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    async fn respond<T>(&self, ok: impl FnOnce() -> T) -> Result<T, ApiError> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.mode {
            Mode::Accept => Ok(ok()),
            Mode::Reject => Err(ApiError::Unauthorized),
            Mode::Fail => Err(ApiError::ServerError("Service Unavailable".to_string())),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn exchange_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<ProviderGrant, ApiError> {
        let call = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let user = self.identity.clone();
        let token = format!("token-{}-{}", call, credentials.email);
        self.respond(move || ProviderGrant {
            token,
            user,
            expires_in: None,
        })
        .await
    }

    async fn fetch_identity(&self, token: &str) -> Result<UserIdentity, ApiError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        let mut user = self.identity.clone();
        if self.owner_per_token {
            user.id = format!("owner-of-{}", token);
        }
        self.respond(move || user).await
    }
}
