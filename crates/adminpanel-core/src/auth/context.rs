//! The current-session holder shared by everything that needs to know who
//! is signed in.
//!
//! `SessionContext` is an explicitly constructed handle; clones share the
//! same state. Reads are synchronous. Writes happen only through the
//! authenticator (sign-in commit, sign-out) and the restore routine, and
//! are ordered by two counters:
//!
//! - `latest_attempt`: id of the most recently started sign-in. A finished
//!   attempt commits only if it is still the latest.
//! - `generation`: bumped whenever the in-memory session is installed or
//!   dropped. Work that started under an older generation is discarded.
//!
//! Lock order is `persist` then `session`. `persist` is held across store
//! I/O so the store sees writes in generation order; `session` is only held
//! for the check-and-swap, so readers never wait on the keychain or disk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::IdentityProvider;

use super::error::{AuthError, SessionRestoreError};
use super::roles::{Locale, RoleLabel};
use super::session::{Session, UserIdentity};
use super::store::SessionStore;

/// Identifies one sign-in attempt and the state it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptTicket {
    pub id: u64,
    generation: u64,
}

struct Inner {
    session: RwLock<Option<Session>>,
    persist: Mutex<()>,
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn IdentityProvider>,
    request_timeout: Duration,
    latest_attempt: AtomicU64,
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Inner>,
}

impl SessionContext {
    /// Create an unauthenticated context. Call `initialize` to restore a
    /// persisted session.
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(None),
                persist: Mutex::new(()),
                store,
                provider,
                request_timeout,
                latest_attempt: AtomicU64::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.read().clone()
    }

    /// Check if there is a session that has not expired
    pub fn is_authenticated(&self) -> bool {
        self.read().as_ref().map(|s| !s.is_expired()).unwrap_or(false)
    }

    /// Bearer token of the current session, for API calls
    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn role(&self) -> RoleLabel {
        self.read()
            .as_ref()
            .map(|s| s.user.role_label())
            .unwrap_or(RoleLabel::Undefined)
    }

    /// Localized role label of the current user
    pub fn role_label(&self, locale: Locale) -> &'static str {
        self.role().text(locale)
    }

    // =========================================================================
    // Startup restore
    // =========================================================================

    /// Restore a persisted session on application start.
    ///
    /// Never fails: a missing, unreadable, corrupt or expired artifact
    /// leaves the context unauthenticated. Returns whether a session was
    /// restored.
    pub fn initialize(&self) -> bool {
        match self.restore() {
            Ok(restored) => {
                debug!(restored, "Session restore finished");
                restored
            }
            Err(e) => {
                warn!(error = %e, "Starting without a session");
                false
            }
        }
    }

    /// Load the persisted session into the context.
    ///
    /// `Ok(false)` means nothing was stored. A corrupt or expired artifact
    /// is removed from the store before the error is returned; a failed
    /// read leaves the store untouched. An in-memory session that is
    /// already present is kept.
    pub fn restore(&self) -> Result<bool, SessionRestoreError> {
        let _persist = self.persist_lock();
        let stored = self.inner.store.read().map_err(SessionRestoreError::Store)?;
        let Some(contents) = stored else {
            return Ok(false);
        };

        let parsed = serde_json::from_str::<Session>(&contents)
            .map_err(SessionRestoreError::from)
            .and_then(|session| {
                if session.is_expired() {
                    Err(SessionRestoreError::Expired)
                } else {
                    Ok(session)
                }
            });
        let session = match parsed {
            Ok(session) => session,
            Err(e) => {
                self.remove_stored();
                return Err(e);
            }
        };

        let mut slot = self.write();
        if slot.is_some() {
            debug!("Session already present, keeping it");
            return Ok(true);
        }
        debug!(user_id = %session.user.id, "Restored stored session");
        *slot = Some(session);
        self.bump_generation();
        Ok(true)
    }

    // =========================================================================
    // Session check
    // =========================================================================

    /// Re-validate the current session, restoring it from the store first
    /// if nothing is in memory, and refresh the user's identity from the
    /// identity provider.
    ///
    /// A rejected or expired session is cleared. Transport failures are
    /// reported but leave the session in place. Results apply only to the
    /// session that was checked; a sign-in or sign-out that lands during
    /// the check wins.
    pub async fn check_user_session(&self) -> Result<(), AuthError> {
        let (session, generation) = match self.snapshot() {
            Some(snapshot) => snapshot,
            None => match self.restore() {
                Ok(true) => self.snapshot().ok_or(AuthError::NotAuthenticated)?,
                Ok(false) => return Err(AuthError::NotAuthenticated),
                Err(SessionRestoreError::Expired) => return Err(AuthError::SessionExpired),
                Err(e) => {
                    warn!(error = %e, "Stored session unusable");
                    return Err(AuthError::NotAuthenticated);
                }
            },
        };

        if session.is_expired() {
            info!("Session expired");
            self.discard_if_unchanged(generation, &session.token);
            return Err(AuthError::SessionExpired);
        }

        let timeout = self.inner.request_timeout;
        let lookup = self.inner.provider.fetch_identity(&session.token);
        match tokio::time::timeout(timeout, lookup).await {
            Err(_) => Err(AuthError::Timeout(timeout)),
            Ok(Ok(user)) => {
                self.refresh_identity(generation, &session.token, user);
                Ok(())
            }
            Ok(Err(e)) if e.is_rejection() => {
                info!(error = %e, "Identity provider rejected session");
                self.discard_if_unchanged(generation, &session.token);
                Err(AuthError::from_session_check(e))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Session check failed, keeping local session");
                Err(AuthError::from_session_check(e))
            }
        }
    }

    // =========================================================================
    // Writes (authenticator only)
    // =========================================================================

    pub(crate) fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.provider
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub(crate) fn begin_attempt(&self) -> AttemptTicket {
        let generation = self.generation();
        let id = self.inner.latest_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        AttemptTicket { id, generation }
    }

    /// Install and persist a freshly issued session, unless a newer attempt
    /// started or the state changed since `ticket` was taken.
    pub(crate) fn commit_sign_in(&self, ticket: AttemptTicket, session: Session) -> bool {
        let contents = serde_json::to_string(&session);
        let _persist = self.persist_lock();
        {
            let mut slot = self.write();
            let latest = self.inner.latest_attempt.load(Ordering::SeqCst);
            if ticket.id != latest || ticket.generation != self.generation() {
                debug!(attempt = ticket.id, latest, "Discarding stale sign-in result");
                return false;
            }
            *slot = Some(session);
            self.bump_generation();
        }

        match contents {
            Ok(contents) => {
                if let Err(e) = self.inner.store.write(&contents) {
                    warn!(error = %e, "Failed to save session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }
        true
    }

    /// Drop the in-memory and persisted session and invalidate any
    /// in-flight attempt. Safe to call when signed out.
    pub(crate) fn clear(&self) {
        let _persist = self.persist_lock();
        {
            let mut slot = self.write();
            *slot = None;
            self.bump_generation();
        }
        self.remove_stored();
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Only called with the `session` write guard held
    fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current session and the generation it belongs to, read together.
    fn snapshot(&self) -> Option<(Session, u64)> {
        let slot = self.read();
        slot.as_ref().map(|s| (s.clone(), self.generation()))
    }

    /// Whether the in-memory session is still the one taken at `generation`
    fn is_unchanged(&self, slot: &Option<Session>, generation: u64, token: &str) -> bool {
        self.generation() == generation && slot.as_ref().is_some_and(|s| s.token == token)
    }

    fn refresh_identity(&self, generation: u64, token: &str, user: UserIdentity) {
        let _persist = self.persist_lock();
        let contents = {
            let mut slot = self.write();
            if !self.is_unchanged(&slot, generation, token) {
                debug!("Session changed during check, dropping refreshed identity");
                return;
            }
            let Some(session) = slot.as_mut() else {
                return;
            };
            if session.user == user {
                return;
            }
            session.user = user;
            serde_json::to_string(&*session)
        };

        match contents {
            Ok(contents) => {
                if let Err(e) = self.inner.store.write(&contents) {
                    warn!(error = %e, "Failed to save refreshed session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session"),
        }
    }

    fn discard_if_unchanged(&self, generation: u64, token: &str) {
        let _persist = self.persist_lock();
        {
            let mut slot = self.write();
            if !self.is_unchanged(&slot, generation, token) {
                return;
            }
            *slot = None;
            self.bump_generation();
        }
        self.remove_stored();
    }

    /// Callers hold the `persist` lock
    fn remove_stored(&self) {
        if let Err(e) = self.inner.store.remove() {
            warn!(error = %e, "Failed to remove stored session");
        }
    }

    fn persist_lock(&self) -> MutexGuard<'_, ()> {
        self.inner.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.inner.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.inner.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::test_identity;
    use crate::auth::store::MemorySessionStore;
    use crate::auth::testing::MockProvider;
    use anyhow::bail;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::AtomicBool;

    fn context_with(
        store: Arc<dyn SessionStore>,
        provider: Arc<MockProvider>,
    ) -> SessionContext {
        SessionContext::new(store, provider, Duration::from_secs(5))
    }

    fn empty_context() -> SessionContext {
        context_with(Arc::new(MemorySessionStore::new()), Arc::new(MockProvider::accepting()))
    }

    fn owned_by(token: &str) -> Session {
        let mut user = test_identity(&["admin"]);
        user.id = format!("owner-of-{}", token);
        Session::issue(token.into(), user, None)
    }

    fn persisted(store: &MemorySessionStore) -> Option<Session> {
        store
            .read()
            .unwrap()
            .map(|contents| serde_json::from_str(&contents).unwrap())
    }

    /// Holds a session but can be made to fail reads, like a locked keychain
    struct LockableStore {
        inner: MemorySessionStore,
        locked: AtomicBool,
    }

    impl SessionStore for LockableStore {
        fn read(&self) -> anyhow::Result<Option<String>> {
            if self.locked.load(Ordering::SeqCst) {
                bail!("keychain locked");
            }
            self.inner.read()
        }

        fn write(&self, contents: &str) -> anyhow::Result<()> {
            self.inner.write(contents)
        }

        fn remove(&self) -> anyhow::Result<()> {
            self.inner.remove()
        }
    }

    fn stored(session: &Session) -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_contents(serde_json::to_string(session).unwrap()))
    }

    #[test]
    fn test_initialize_restores_valid_session() {
        let session = Session::issue("tok".into(), test_identity(&["admin"]), None);
        let ctx = context_with(stored(&session), Arc::new(MockProvider::accepting()));

        assert!(ctx.initialize());
        assert_eq!(ctx.current_user(), Some(session.user.clone()));
        assert_eq!(ctx.token().as_deref(), Some("tok"));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.role_label(Locale::Fa), "ادمین");
    }

    #[test]
    fn test_initialize_with_nothing_stored() {
        let ctx = empty_context();
        assert!(!ctx.initialize());
        assert_eq!(ctx.current_user(), None);
        assert_eq!(ctx.role_label(Locale::En), "Role undefined");
    }

    #[test]
    fn test_initialize_with_corrupt_session_is_unauthenticated() {
        let store = Arc::new(MemorySessionStore::with_contents("{not json"));
        let ctx = context_with(store.clone(), Arc::new(MockProvider::accepting()));

        assert!(matches!(ctx.restore(), Err(SessionRestoreError::Corrupt(_))));
        assert!(!ctx.initialize());
        assert_eq!(ctx.current_user(), None);
        // Corrupt artifact is dropped
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_initialize_with_expired_session() {
        let mut session = Session::issue("tok".into(), test_identity(&[]), None);
        session.expires_at = Utc::now() - ChronoDuration::minutes(1);
        let store = stored(&session);
        let ctx = context_with(store.clone(), Arc::new(MockProvider::accepting()));

        assert!(!ctx.initialize());
        assert!(!ctx.is_authenticated());
        assert_eq!(store.read().unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_user_session_restores_and_refreshes_identity() {
        let session = Session::issue("tok".into(), test_identity(&["user"]), None);
        let store = stored(&session);
        let provider =
            Arc::new(MockProvider::accepting().with_identity(test_identity(&["editor"])));
        let ctx = context_with(store.clone(), provider.clone());

        ctx.check_user_session().await.unwrap();
        assert_eq!(ctx.role(), RoleLabel::Editor);
        assert_eq!(provider.identity_calls(), 1);

        // Refreshed identity is written back
        let persisted: Session = serde_json::from_str(&store.read().unwrap().unwrap()).unwrap();
        assert!(persisted.user.role.contains("editor"));
    }

    #[tokio::test]
    async fn test_check_user_session_without_session() {
        let provider = Arc::new(MockProvider::accepting());
        let ctx = context_with(Arc::new(MemorySessionStore::new()), provider.clone());
        assert_eq!(ctx.check_user_session().await, Err(AuthError::NotAuthenticated));
        assert_eq!(provider.identity_calls(), 0);
    }

    #[tokio::test]
    async fn test_check_user_session_expired() {
        let mut session = Session::issue("tok".into(), test_identity(&[]), None);
        session.expires_at = Utc::now() - ChronoDuration::seconds(1);
        let store = stored(&session);
        let ctx = context_with(store.clone(), Arc::new(MockProvider::accepting()));

        assert_eq!(ctx.check_user_session().await, Err(AuthError::SessionExpired));
        assert_eq!(store.read().unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_user_session_rejected_clears() {
        let session = Session::issue("tok".into(), test_identity(&["admin"]), None);
        let store = stored(&session);
        let ctx = context_with(store.clone(), Arc::new(MockProvider::rejecting()));
        ctx.initialize();

        assert_eq!(ctx.check_user_session().await, Err(AuthError::SessionRejected));
        assert_eq!(ctx.current_user(), None);
        assert_eq!(store.read().unwrap(), None);
    }

    #[tokio::test]
    async fn test_check_user_session_outage_keeps_session() {
        let session = Session::issue("tok".into(), test_identity(&["admin"]), None);
        let ctx = context_with(stored(&session), Arc::new(MockProvider::failing()));
        ctx.initialize();

        assert!(matches!(ctx.check_user_session().await, Err(AuthError::Provider(_))));
        assert_eq!(ctx.current_user(), Some(session.user));
    }

    #[test]
    fn test_stale_ticket_is_not_committed() {
        let store = Arc::new(MemorySessionStore::new());
        let ctx = context_with(store.clone(), Arc::new(MockProvider::accepting()));
        let first = ctx.begin_attempt();
        let second = ctx.begin_attempt();

        let session = Session::issue("tok".into(), test_identity(&[]), None);
        assert!(!ctx.commit_sign_in(first, session.clone()));
        assert_eq!(ctx.current_user(), None);
        assert_eq!(store.read().unwrap(), None);

        assert!(ctx.commit_sign_in(second, session));
        assert!(ctx.is_authenticated());
    }

    #[test]
    fn test_clear_invalidates_outstanding_ticket() {
        let ctx = empty_context();
        let ticket = ctx.begin_attempt();
        ctx.clear();
        let session = Session::issue("tok".into(), test_identity(&[]), None);
        assert!(!ctx.commit_sign_in(ticket, session));
        assert_eq!(ctx.current_user(), None);
    }

    #[test]
    fn test_unreadable_store_keeps_stored_session() {
        let session = Session::issue("tok".into(), test_identity(&["admin"]), None);
        let store = Arc::new(LockableStore {
            inner: MemorySessionStore::with_contents(serde_json::to_string(&session).unwrap()),
            locked: AtomicBool::new(true),
        });
        let ctx = context_with(store.clone(), Arc::new(MockProvider::accepting()));

        assert!(matches!(ctx.restore(), Err(SessionRestoreError::Store(_))));
        assert!(!ctx.initialize());
        assert!(!ctx.is_authenticated());
        assert_eq!(persisted(&store.inner), Some(session.clone()));

        store.locked.store(false, Ordering::SeqCst);
        assert!(ctx.initialize());
        assert_eq!(ctx.current_session(), Some(session));
    }

    #[tokio::test]
    async fn test_check_user_session_with_unreadable_store() {
        let session = Session::issue("tok".into(), test_identity(&["admin"]), None);
        let store = Arc::new(LockableStore {
            inner: MemorySessionStore::with_contents(serde_json::to_string(&session).unwrap()),
            locked: AtomicBool::new(true),
        });
        let provider = Arc::new(MockProvider::accepting());
        let ctx = context_with(store.clone(), provider.clone());

        assert_eq!(ctx.check_user_session().await, Err(AuthError::NotAuthenticated));
        assert_eq!(provider.identity_calls(), 0);
        assert_eq!(persisted(&store.inner), Some(session));

        store.locked.store(false, Ordering::SeqCst);
        assert_eq!(ctx.check_user_session().await, Ok(()));
        assert!(ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_in_during_check_keeps_new_session() {
        let store = stored(&owned_by("old"));
        let provider = Arc::new(
            MockProvider::accepting()
                .with_owner_per_token()
                .with_delays(&[Duration::from_millis(100)]),
        );
        let ctx = context_with(store.clone(), provider);
        assert!(ctx.initialize());

        let checking = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.check_user_session().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ticket = ctx.begin_attempt();
        assert!(ctx.commit_sign_in(ticket, owned_by("new")));
        checking.await.unwrap().unwrap();

        let current = ctx.current_session().unwrap();
        assert_eq!(current.token, "new");
        assert_eq!(current.user.id, "owner-of-new");
        assert_eq!(persisted(&store), Some(current));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sign_in_and_check_never_mix_sessions() {
        for _ in 0..200 {
            let store = stored(&owned_by("old"));
            let provider = Arc::new(MockProvider::accepting().with_owner_per_token());
            let ctx = context_with(store.clone(), provider);
            assert!(ctx.initialize());
            let ticket = ctx.begin_attempt();

            let checking = tokio::spawn({
                let ctx = ctx.clone();
                async move { ctx.check_user_session().await }
            });
            let committing = tokio::task::spawn_blocking({
                let ctx = ctx.clone();
                move || ctx.commit_sign_in(ticket, owned_by("new"))
            });

            assert!(committing.await.unwrap());
            checking.await.unwrap().unwrap();

            let current = ctx.current_session().expect("new session must survive the check");
            assert_eq!(current.token, "new");
            assert_eq!(current.user.id, "owner-of-new");
            assert_eq!(persisted(&store), Some(current));
        }
    }
}
