//! Exchanges validated credentials for a session.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::context::SessionContext;
use super::credentials::{validate, Credentials};
use super::error::{AuthError, SubmitError};
use super::session::Session;

/// Signs users in and out against the context's identity provider.
///
/// There is no automatic retry; a failed attempt is reported once.
#[derive(Clone)]
pub struct Authenticator {
    context: SessionContext,
}

impl Authenticator {
    pub fn new(context: SessionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Validate raw form input and, only if it passes, sign in.
    pub async fn submit(&self, candidate: Credentials) -> Result<Session, SubmitError> {
        self.submit_with_cancel(candidate, &CancellationToken::new()).await
    }

    /// `submit` that gives up with `AuthError::Cancelled` once `cancel`
    /// fires. Invalid input is reported even if already cancelled.
    pub async fn submit_with_cancel(
        &self,
        candidate: Credentials,
        cancel: &CancellationToken,
    ) -> Result<Session, SubmitError> {
        let credentials = validate(candidate)?;
        Ok(self.sign_in_with_cancel(&credentials, cancel).await?)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.sign_in_with_cancel(credentials, &CancellationToken::new()).await
    }

    /// Sign in, giving up with `AuthError::Cancelled` if `cancel` fires
    /// before the result is committed.
    ///
    /// The result is committed only if no newer sign-in started and no
    /// sign-out happened while the exchange was in flight; otherwise it is
    /// discarded with `AuthError::Superseded`.
    pub async fn sign_in_with_cancel(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<Session, AuthError> {
        let ticket = self.context.begin_attempt();
        let timeout = self.context.request_timeout();
        info!(attempt = ticket.id, email = %credentials.email, "Signing in");

        let exchange = tokio::time::timeout(
            timeout,
            self.context.provider().exchange_credentials(credentials),
        );

        let grant = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(attempt = ticket.id, "Sign-in cancelled");
                return Err(AuthError::Cancelled);
            }
            result = exchange => match result {
                Err(_) => {
                    error!(
                        attempt = ticket.id,
                        timeout_secs = timeout.as_secs(),
                        "Sign-in timed out"
                    );
                    return Err(AuthError::Timeout(timeout));
                }
                Ok(Err(e)) => {
                    error!(attempt = ticket.id, error = %e, "Sign-in failed");
                    return Err(AuthError::from_sign_in(e));
                }
                Ok(Ok(grant)) => grant,
            },
        };

        if cancel.is_cancelled() {
            info!(attempt = ticket.id, "Sign-in cancelled after exchange");
            return Err(AuthError::Cancelled);
        }

        let session = Session::issue(grant.token, grant.user, grant.expires_in);
        if !self.context.commit_sign_in(ticket, session.clone()) {
            return Err(AuthError::Superseded);
        }

        info!(attempt = ticket.id, user_id = %session.user.id, "Sign-in successful");
        Ok(session)
    }

    /// Clear the persisted and in-memory session. Idempotent.
    pub fn sign_out(&self) {
        self.context.clear();
        info!("Signed out");
    }
}
