/// Client-side session management
///
/// Owns the one in-memory session, persists it, schedules a refresh ahead
/// of expiry, and reduces every refresh failure to a single terminal
/// action: clear state and signal expiry. Constructed once by the
/// application root and shared by handle; there is no global instance.

mod store;
mod transport;

pub use store::{FileSessionStore, SessionStore};
pub use transport::{HttpRefreshTransport, RefreshTransport};

use crate::error::{AuthError, AuthResult};
use crate::token::{decode_claims_unverified, TokenPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Refresh this long before the access token expires
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Client-held session state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Always derived from the access token's own expiry claim
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Signals emitted for the UI layer to observe. The manager emits and does
/// not handle them; consumers typically log, then redirect to
/// re-authentication after a short grace delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session ended terminally (refresh failed or was revoked)
    Expired,
}

/// Client session manager handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn RefreshTransport>,
    refresh_buffer: Duration,
    state: Mutex<Option<Session>>,
    /// Pending scheduled-refresh task, aborted on reschedule or clear
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Re-entrancy guard: set while a refresh exchange is in flight
    refreshing: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager with the default refresh buffer
    pub fn new(store: Arc<dyn SessionStore>, transport: Arc<dyn RefreshTransport>) -> Self {
        Self::with_refresh_buffer(store, transport, DEFAULT_REFRESH_BUFFER)
    }

    /// Create a manager with an explicit refresh buffer
    pub fn with_refresh_buffer(
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn RefreshTransport>,
        refresh_buffer: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(ManagerInner {
                store,
                transport,
                refresh_buffer,
                state: Mutex::new(None),
                timer: Mutex::new(None),
                refreshing: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Subscribe to session lifecycle signals
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Load a persisted session. An expired one is discarded and the
    /// manager ends in the empty state; a live one is adopted and a
    /// refresh is scheduled.
    pub async fn init(&self) -> bool {
        let Some(session) = self.inner.store.load().await else {
            tracing::debug!("No persisted session found");
            return false;
        };

        if session.is_expired() {
            tracing::info!("Persisted session already expired, discarding");
            if let Err(e) = self.inner.store.clear().await {
                tracing::warn!("Failed to erase stale session: {}", e);
            }
            return false;
        }

        *self.inner.state.lock().unwrap() = Some(session);
        self.schedule_refresh();
        true
    }

    /// Adopt a freshly issued token pair. Decodes the access token locally
    /// (no signature check; the server verifies on every request) to
    /// derive expiry and subject, persists, and (re)schedules the refresh.
    pub async fn set_session(&self, access_token: &str, refresh_token: &str) -> AuthResult<()> {
        let session = session_from_tokens(access_token, refresh_token)?;

        self.inner.store.save(&session).await?;
        *self.inner.state.lock().unwrap() = Some(session);
        self.schedule_refresh();

        Ok(())
    }

    /// Current access token, only while it is still valid at call time.
    /// Callers must not cache the returned value past its use.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .as_ref()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token.clone())
    }

    /// Current user id, while a live session exists
    pub fn user_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .as_ref()
            .filter(|s| !s.is_expired())
            .map(|s| s.user_id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Whether a scheduled refresh is pending
    pub fn has_pending_refresh(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Drop the session: cancel any pending refresh timer, clear memory,
    /// erase storage. Idempotent.
    pub async fn clear_session(&self) {
        if let Some(handle) = self.inner.timer.lock().unwrap().take() {
            handle.abort();
        }
        *self.inner.state.lock().unwrap() = None;

        if let Err(e) = self.inner.store.clear().await {
            tracing::warn!("Failed to erase persisted session: {}", e);
        }
    }

    /// Force a refresh outside the schedule. Returns Ok(false) when a
    /// refresh is already in flight (the call is a no-op) or no session
    /// exists.
    pub async fn refresh_now(&self) -> AuthResult<bool> {
        run_refresh(&self.inner).await
    }

    /// (Re)schedule the refresh task, cancelling any pending one. Fires at
    /// `expires_at - buffer`, or immediately when that is already past.
    fn schedule_refresh(&self) {
        let delay = {
            let state = self.inner.state.lock().unwrap();
            let Some(session) = state.as_ref() else {
                return;
            };
            let until_expiry = session.expires_at - Utc::now();
            until_expiry
                .to_std()
                .unwrap_or_default()
                .saturating_sub(self.inner.refresh_buffer)
        };

        schedule_after(&self.inner, delay);
    }
}

/// Spawn the deferred refresh task, replacing (and aborting) any pending
/// one. The replaced handle may belong to the task currently running this
/// function; that task must not await after scheduling.
fn schedule_after(inner: &Arc<ManagerInner>, delay: Duration) {
    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) = run_refresh(&task_inner).await {
            tracing::debug!("Scheduled refresh ended the session: {}", e);
        }
    });

    let mut timer = inner.timer.lock().unwrap();
    if let Some(old) = timer.replace(handle) {
        old.abort();
    }
}

/// Perform one refresh exchange. Any failure is terminal: state is cleared
/// and the expiry signal is emitted.
async fn run_refresh(inner: &Arc<ManagerInner>) -> AuthResult<bool> {
    // Re-entrancy guard: a firing that overlaps an in-flight refresh is a
    // no-op, so two exchanges can never race to rotate one token.
    if inner
        .refreshing
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!("Refresh already in progress, skipping");
        return Ok(false);
    }

    let result = do_refresh(inner).await;
    inner.refreshing.store(false, Ordering::Release);
    result
}

async fn do_refresh(inner: &Arc<ManagerInner>) -> AuthResult<bool> {
    let refresh_token = {
        let state = inner.state.lock().unwrap();
        match state.as_ref() {
            Some(session) => session.refresh_token.clone(),
            None => return Ok(false),
        }
    };

    match inner.transport.refresh(&refresh_token).await {
        Ok(pair) => {
            adopt_refreshed_pair(inner, &pair).await?;
            tracing::debug!("Session refreshed");
            Ok(true)
        }
        Err(e) => {
            tracing::info!("Refresh failed, ending session: {}", e);
            end_session(inner).await;
            Err(e)
        }
    }
}

/// Adopt the pair returned by a refresh, unless the session was cleared
/// while the exchange was in flight: a stale result must not resurrect a
/// cleared session.
async fn adopt_refreshed_pair(inner: &Arc<ManagerInner>, pair: &TokenPair) -> AuthResult<()> {
    let session = session_from_tokens(&pair.access_token, &pair.refresh_token)?;

    {
        let mut state = inner.state.lock().unwrap();
        if state.is_none() {
            tracing::debug!("Session cleared during refresh, dropping result");
            return Ok(());
        }
        *state = Some(session.clone());
    }

    inner.store.save(&session).await?;

    // Schedule the next round from the new expiry
    let delay = (session.expires_at - Utc::now())
        .to_std()
        .unwrap_or_default()
        .saturating_sub(inner.refresh_buffer);
    schedule_after(inner, delay);

    Ok(())
}

/// Terminal failure path: clear everything and emit the expiry signal
async fn end_session(inner: &Arc<ManagerInner>) {
    if let Some(handle) = inner.timer.lock().unwrap().take() {
        handle.abort();
    }
    *inner.state.lock().unwrap() = None;

    if let Err(e) = inner.store.clear().await {
        tracing::warn!("Failed to erase persisted session: {}", e);
    }

    // No receivers is fine; the signal is best-effort
    let _ = inner.events.send(SessionEvent::Expired);
}

/// Build a Session from a token pair, deriving expiry and subject from the
/// access token's claims
fn session_from_tokens(access_token: &str, refresh_token: &str) -> AuthResult<Session> {
    let claims = decode_claims_unverified(access_token)?;

    if claims.sub.is_empty() {
        return Err(AuthError::InvalidTokenFormat(
            "Missing subject claim".to_string(),
        ));
    }

    let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
        AuthError::InvalidTokenFormat("Expiry claim out of range".to_string())
    })?;

    Ok(Session {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires_at,
        user_id: claims.sub,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessClaims, TOKEN_AUDIENCE};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// In-memory store for tests
    struct MemoryStore {
        blob: Mutex<Option<Session>>,
    }

    impl MemoryStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                blob: Mutex::new(None),
            })
        }

        fn with(session: Session) -> Arc<Self> {
            Arc::new(Self {
                blob: Mutex::new(Some(session)),
            })
        }

        fn is_empty(&self) -> bool {
            self.blob.lock().unwrap().is_none()
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn load(&self) -> Option<Session> {
            self.blob.lock().unwrap().clone()
        }

        async fn save(&self, session: &Session) -> AuthResult<()> {
            *self.blob.lock().unwrap() = Some(session.clone());
            Ok(())
        }

        async fn clear(&self) -> AuthResult<()> {
            *self.blob.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Transport with a scripted response and a call counter
    struct MockTransport {
        calls: AtomicUsize,
        /// Some(secs) answers with a pair expiring that far out; None fails
        respond_with_ttl: Option<i64>,
    }

    impl MockTransport {
        fn succeeding(ttl_secs: i64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                respond_with_ttl: Some(ttl_secs),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                respond_with_ttl: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshTransport for MockTransport {
        async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenPair> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.respond_with_ttl {
                Some(ttl) => {
                    let access_token = mint_token("user-1", ttl);
                    Ok(TokenPair {
                        access_token,
                        refresh_token: "cd".repeat(32),
                        expires_at: Utc::now() + chrono::Duration::seconds(ttl),
                        user_id: "user-1".to_string(),
                    })
                }
                None => Err(AuthError::InvalidRefreshToken),
            }
        }
    }

    /// Mint an unsigned-for-our-purposes JWT expiring ttl seconds from now
    fn mint_token(user_id: &str, ttl_secs: i64) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            sid: "session-1".to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + ttl_secs,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn expired_session() -> Session {
        Session {
            access_token: mint_token("user-1", -60),
            refresh_token: "ab".repeat(32),
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            user_id: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn init_with_no_persisted_session() {
        let store = MemoryStore::new();
        let transport = MockTransport::succeeding(3600);
        let manager = SessionManager::new(store, transport);

        assert!(!manager.init().await);
        assert!(!manager.is_authenticated());
        assert!(!manager.has_pending_refresh());
    }

    #[tokio::test]
    async fn init_discards_expired_session_without_scheduling() {
        let store = MemoryStore::with(expired_session());
        let transport = MockTransport::succeeding(3600);
        let manager = SessionManager::new(store.clone(), transport.clone());

        assert!(!manager.init().await);
        assert!(!manager.is_authenticated());
        assert!(!manager.has_pending_refresh());
        assert!(store.is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn init_adopts_live_session() {
        let session = Session {
            access_token: mint_token("user-1", 3600),
            refresh_token: "ab".repeat(32),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user_id: "user-1".to_string(),
        };
        let store = MemoryStore::with(session);
        let transport = MockTransport::succeeding(3600);
        let manager = SessionManager::new(store, transport);

        assert!(manager.init().await);
        assert!(manager.is_authenticated());
        assert_eq!(manager.user_id().as_deref(), Some("user-1"));
        assert!(manager.has_pending_refresh());
    }

    #[tokio::test]
    async fn set_session_rejects_undecodable_tokens() {
        let manager = SessionManager::new(MemoryStore::new(), MockTransport::succeeding(3600));

        let err = manager.set_session("garbage", "r1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidTokenFormat(_)));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn set_session_persists_and_schedules() {
        let store = MemoryStore::new();
        let manager =
            SessionManager::new(store.clone(), MockTransport::succeeding(3600));

        manager
            .set_session(&mint_token("user-1", 3600), "r1")
            .await
            .unwrap();

        assert!(manager.is_authenticated());
        assert!(manager.has_pending_refresh());
        assert!(!store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_session_cancels_pending_timer() {
        let transport = MockTransport::succeeding(3600);
        let manager = SessionManager::with_refresh_buffer(
            MemoryStore::new(),
            transport.clone(),
            Duration::from_secs(5),
        );

        // Refresh would fire at ~expiry - 5s
        manager
            .set_session(&mint_token("user-1", 600), "r1")
            .await
            .unwrap();
        assert!(manager.has_pending_refresh());

        manager.clear_session().await;
        assert!(!manager.is_authenticated());

        // Advance virtual time well past the original schedule point: the
        // aborted timer must never reach the transport
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_refresh_fires_exactly_once() {
        let transport = MockTransport::succeeding(7200);
        let manager = SessionManager::with_refresh_buffer(
            MemoryStore::new(),
            transport.clone(),
            Duration::from_secs(5),
        );

        // 10s token with a 5s buffer schedules the exchange at ~t=5s
        manager
            .set_session(&mint_token("user-1", 10), "r1")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(transport.calls(), 1);
        assert!(manager.is_authenticated());
        // The next round is scheduled off the new expiry
        assert!(manager.has_pending_refresh());
    }

    #[tokio::test]
    async fn refresh_failure_clears_and_signals() {
        let store = MemoryStore::new();
        let transport = MockTransport::failing();
        let manager = SessionManager::new(store.clone(), transport.clone());
        let mut events = manager.subscribe();

        manager
            .set_session(&mint_token("user-1", 3600), "r1")
            .await
            .unwrap();

        let err = manager.refresh_now().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
    }

    #[tokio::test]
    async fn manual_refresh_updates_session() {
        let transport = MockTransport::succeeding(7200);
        let manager = SessionManager::new(MemoryStore::new(), transport.clone());

        manager
            .set_session(&mint_token("user-1", 3600), "r1")
            .await
            .unwrap();

        let refreshed = manager.refresh_now().await.unwrap();
        assert!(refreshed);
        assert_eq!(transport.calls(), 1);
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_without_session_is_a_noop() {
        let transport = MockTransport::succeeding(3600);
        let manager = SessionManager::new(MemoryStore::new(), transport.clone());

        let refreshed = manager.refresh_now().await.unwrap();
        assert!(!refreshed);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn expired_session_yields_no_access_token() {
        assert!(expired_session().is_expired());

        let live = Session {
            access_token: mint_token("user-1", 3600),
            refresh_token: "ab".repeat(32),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user_id: "user-1".to_string(),
        };
        assert!(!live.is_expired());
    }

    #[tokio::test]
    async fn overlapping_refreshes_collapse_to_one() {
        use tokio::sync::Notify;

        /// Transport that parks until released, counting entries
        struct BlockingTransport {
            calls: AtomicUsize,
            release: Notify,
        }

        #[async_trait]
        impl RefreshTransport for BlockingTransport {
            async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenPair> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.release.notified().await;
                let access_token = mint_token("user-1", 3600);
                Ok(TokenPair {
                    access_token,
                    refresh_token: "ef".repeat(32),
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                    user_id: "user-1".to_string(),
                })
            }
        }

        let transport = Arc::new(BlockingTransport {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let manager = SessionManager::new(MemoryStore::new(), transport.clone());

        manager
            .set_session(&mint_token("user-1", 3600), "r1")
            .await
            .unwrap();

        // First refresh parks inside the transport
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh_now().await })
        };
        tokio::task::yield_now().await;

        // Second call while in flight is a guarded no-op
        let second = manager.refresh_now().await.unwrap();
        assert!(!second);

        transport.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(first);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
