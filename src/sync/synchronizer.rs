//! Credential refresh and profile synchronization for the signed-in identity.
//!
//! The synchronizer owns the data store's authorization. It acquires a
//! credential on sign-in, installs it, makes sure the identity's profile row
//! exists, and then re-acquires on a fixed cadence until sign-out.
//!
//! Every identity change bumps an epoch. Acquisitions remember the epoch
//! they started in and only install their credential if it is still
//! current, so a refresh landing after sign-out is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::profile::{Identity, ProfileRecord, ProfileService, ProfileSyncOutcome};
use crate::traits::{DataStore, IdentityProvider};

use super::credential::SessionCredential;

/// Authorization phase of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// No credential installed.
    #[default]
    Unauthenticated,
    /// First credential for the current identity in flight.
    Acquiring,
    /// A credential is installed; refresh ticks keep it fresh.
    Authorized,
}

struct SyncInner {
    identity: Option<Identity>,
    /// Bumped on every sign-in and sign-out.
    epoch: u64,
    credential: Option<SessionCredential>,
    profile_synced: bool,
    /// A profile sync ran (successfully or not) since the last authorization.
    profile_sync_attempted: bool,
    refresh_task: Option<JoinHandle<()>>,
    phase_tx: watch::Sender<SyncPhase>,
}

impl SyncInner {
    fn phase(&self) -> SyncPhase {
        *self.phase_tx.borrow()
    }

    fn set_phase(&self, phase: SyncPhase) {
        let changed = self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
        if changed {
            tracing::debug!(phase = ?phase, epoch = self.epoch, "Sync phase transition");
        }
    }

    fn cancel_refresh(&mut self) {
        if let Some(handle) = self.refresh_task.take() {
            handle.abort();
        }
    }

    /// Forget the current identity and everything derived from it.
    fn reset(&mut self, store: &dyn DataStore) {
        self.epoch += 1;
        self.cancel_refresh();
        self.identity = None;
        self.profile_synced = false;
        self.deauthorize(store);
    }

    /// Drop the installed credential but keep the identity.
    fn deauthorize(&mut self, store: &dyn DataStore) {
        self.credential = None;
        self.profile_sync_attempted = false;
        store.set_authorization(None);
        self.set_phase(SyncPhase::Unauthenticated);
    }
}

struct Shared {
    identity_provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DataStore>,
    profiles: ProfileService,
    config: SyncConfig,
    inner: Mutex<SyncInner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn authorize(self: &Arc<Self>) -> Result<Option<SessionCredential>, SyncError> {
        let epoch = {
            let inner = self.lock();
            if inner.identity.is_none() {
                return Ok(None);
            }
            if inner.phase() != SyncPhase::Authorized {
                inner.set_phase(SyncPhase::Acquiring);
            }
            inner.epoch
        };

        let template = self.config.template.as_str();
        let result = self.identity_provider.acquire_credential(template).await;

        let (credential, profile_synced) = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                tracing::debug!(epoch, current = inner.epoch, "Discarding credential for superseded identity");
                return Err(SyncError::Superseded);
            }

            match result {
                Ok(Some(token)) => {
                    let credential = SessionCredential::new(token, template);
                    self.store.set_authorization(Some(&credential.token));
                    inner.credential = Some(credential.clone());
                    if inner.phase() == SyncPhase::Authorized {
                        return Ok(Some(credential));
                    }
                    (credential, inner.profile_synced)
                }
                Ok(None) => {
                    tracing::info!(template = %template, "Identity provider has no session; credential cleared");
                    inner.cancel_refresh();
                    inner.deauthorize(self.store.as_ref());
                    return Ok(None);
                }
                Err(err) if inner.phase() == SyncPhase::Authorized => {
                    let expired = inner
                        .credential
                        .as_ref()
                        .is_some_and(SessionCredential::is_expired);
                    if expired {
                        // The next tick may still recover a fresh credential.
                        tracing::warn!(error = %err, "Credential refresh failed and the installed credential expired");
                        inner.deauthorize(self.store.as_ref());
                    } else {
                        tracing::warn!(error = %err, "Credential refresh failed");
                    }
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Credential acquisition failed");
                    inner.set_phase(SyncPhase::Unauthenticated);
                    return Err(err.into());
                }
            }
        };

        // Readiness is published only once the profile row had its chance
        // to be created.
        if !profile_synced {
            if let Err(err) = self.sync_profile().await {
                tracing::warn!(error = %err, "Profile sync failed; will retry on next refresh");
            }
        }

        let mut inner = self.lock();
        if inner.epoch != epoch {
            return Err(SyncError::Superseded);
        }
        inner.profile_sync_attempted = true;
        inner.set_phase(SyncPhase::Authorized);
        self.spawn_refresh(&mut inner, epoch);
        Ok(Some(credential))
    }

    async fn sync_profile(&self) -> Result<ProfileSyncOutcome, SyncError> {
        let (epoch, identity) = {
            let inner = self.lock();
            let identity = inner.identity.clone().ok_or(SyncError::NotSignedIn)?;
            (inner.epoch, identity)
        };

        let record = ProfileRecord::from_identity(&identity);
        let outcome = self.profiles.create_if_absent(&record).await?;

        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.profile_synced = true;
        }
        Ok(outcome)
    }

    fn spawn_refresh(self: &Arc<Self>, inner: &mut SyncInner, epoch: u64) {
        if inner.refresh_task.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime; credential refresh not scheduled");
            return;
        };

        let shared = Arc::clone(self);
        let period = self.config.refresh_interval;
        inner.refresh_task = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if shared.lock().epoch != epoch {
                    break;
                }

                match shared.authorize().await {
                    Ok(Some(_)) => tracing::debug!(epoch, "Credential refreshed"),
                    Ok(None) | Err(SyncError::Superseded) => break,
                    Err(_) => continue,
                }

                let needs_profile = !shared.lock().profile_synced;
                if needs_profile {
                    if let Err(err) = shared.sync_profile().await {
                        tracing::warn!(error = %err, "Profile sync retry failed");
                    }
                }
            }
        }));
    }
}

/// Keeps the data store authorized as the signed-in identity.
///
/// # Example
///
/// ```ignore
/// let sync = CredentialSynchronizer::new(identity_provider, store, SyncConfig::default());
/// sync.sign_in(Identity::new("user_2abc").with_email("fox@example.com")).await?;
/// assert!(sync.is_ready());
///
/// // Later
/// sync.sign_out();
/// ```
pub struct CredentialSynchronizer {
    shared: Arc<Shared>,
}

impl CredentialSynchronizer {
    pub fn new(
        identity_provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DataStore>,
        config: SyncConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SyncPhase::Unauthenticated);
        Self {
            shared: Arc::new(Shared {
                identity_provider,
                profiles: ProfileService::new(Arc::clone(&store)),
                store,
                config,
                inner: Mutex::new(SyncInner {
                    identity: None,
                    epoch: 0,
                    credential: None,
                    profile_synced: false,
                    profile_sync_attempted: false,
                    refresh_task: None,
                    phase_tx,
                }),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Make `identity` the signed-in identity, authorize the store and
    /// ensure its profile row exists.
    ///
    /// A profile sync failure does not fail sign-in; it is logged and
    /// retried on the next refresh tick. `Authorized` is published only
    /// after that first profile sync attempt.
    pub async fn sign_in(&self, identity: Identity) -> Result<Option<SessionCredential>, SyncError> {
        {
            let mut inner = self.shared.lock();
            inner.reset(self.shared.store.as_ref());
            tracing::info!(subject_id = %identity.subject_id, "Identity signed in");
            inner.identity = Some(identity);
        }

        self.ensure_authorized().await
    }

    /// Forget the identity, clear the store's authorization and stop
    /// refreshing. Results of operations still in flight are dropped.
    pub fn sign_out(&self) {
        let mut inner = self.shared.lock();
        let subject_id = inner.identity.as_ref().map(|identity| identity.subject_id.clone());
        inner.reset(self.shared.store.as_ref());
        tracing::info!(subject_id = ?subject_id, "Identity signed out");
    }

    /// Acquire a credential and install it on the store.
    ///
    /// Coming from `Unauthenticated`, the profile row is synced before the
    /// phase becomes `Authorized`. `Ok(None)` when nobody is signed in or
    /// the provider has no session.
    pub async fn ensure_authorized(&self) -> Result<Option<SessionCredential>, SyncError> {
        self.shared.authorize().await
    }

    /// Create the signed-in identity's profile row unless it exists.
    pub async fn ensure_profile_synced(&self) -> Result<ProfileSyncOutcome, SyncError> {
        self.shared.sync_profile().await
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.lock().phase()
    }

    /// Whether the store is authorized as the signed-in identity and the
    /// profile row has been synced at least once (successfully or not).
    pub fn is_ready(&self) -> bool {
        let inner = self.shared.lock();
        inner.phase() == SyncPhase::Authorized && inner.profile_sync_attempted
    }

    pub fn current_credential(&self) -> Option<SessionCredential> {
        self.shared.lock().credential.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.shared.lock().identity.clone()
    }

    /// Whether the profile row is known to exist for the signed-in identity.
    pub fn is_profile_synced(&self) -> bool {
        self.shared.lock().profile_synced
    }

    /// Receive phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.shared.lock().phase_tx.subscribe()
    }
}

impl Drop for CredentialSynchronizer {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        inner.cancel_refresh();
    }
}

impl std::fmt::Debug for CredentialSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("CredentialSynchronizer")
            .field("phase", &inner.phase())
            .field("identity", &inner.identity)
            .field("epoch", &inner.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryStore, MockIdentityProvider};
    use crate::traits::{HttpError, IdentityError};
    use serde_json::json;
    use std::time::Duration;

    fn setup(identity: &MockIdentityProvider, store: &InMemoryStore) -> CredentialSynchronizer {
        CredentialSynchronizer::new(
            Arc::new(identity.clone()),
            Arc::new(store.clone()),
            SyncConfig::default(),
        )
    }

    fn fox() -> Identity {
        Identity::new("user_1")
            .with_email("fox@example.com")
            .with_name("Fox", "Mulder")
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_authorizes_and_creates_profile() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        let credential = sync.sign_in(fox()).await.unwrap().unwrap();
        assert_eq!(credential.token, "jwt-1");
        assert_eq!(credential.template, "supabase");
        assert!(sync.is_ready());
        assert!(sync.is_profile_synced());
        assert_eq!(store.authorization().as_deref(), Some("jwt-1"));

        let rows = store.rows("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("clerk_id"), Some(&json!("user_1")));
        assert_eq!(rows[0].get("email"), Some(&json!("fox@example.com")));
        assert_eq!(rows[0].get("first_name"), Some(&json!("Fox")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_credential_is_not_an_error() {
        let identity = MockIdentityProvider::new();
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        assert_eq!(sync.sign_in(fox()).await.unwrap(), None);
        assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
        assert!(store.rows("users").is_empty());

        // No self-scheduled retry.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(identity.acquire_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_authorized_without_identity() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        assert_eq!(sync.ensure_authorized().await.unwrap(), None);
        assert_eq!(identity.acquire_count(), 0);
        assert!(matches!(
            sync.ensure_profile_synced().await,
            Err(SyncError::NotSignedIn)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ticks_reacquire_without_repeating_profile_sync() {
        let identity = MockIdentityProvider::new().with_token("jwt-later");
        identity.push_token(Some("jwt-1"));
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        sync.sign_in(fox()).await.unwrap();
        assert_eq!(store.authorization().as_deref(), Some("jwt-1"));

        tokio::time::sleep(Duration::from_secs(49)).await;
        assert_eq!(identity.acquire_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(identity.acquire_count(), 2);
        assert_eq!(store.authorization().as_deref(), Some("jwt-later"));

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(identity.acquire_count(), 4);
        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.query_count(), 1);
        assert!(sync.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_stops_refresh_and_clears_authorization() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        sync.sign_in(fox()).await.unwrap();
        sync.sign_out();

        assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
        assert!(sync.current_credential().is_none());
        assert!(sync.identity().is_none());
        assert_eq!(store.authorization(), None);

        tokio::time::sleep(Duration::from_secs(500)).await;
        assert_eq!(identity.acquire_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_sign_out_never_installs() {
        let identity = MockIdentityProvider::new().with_token("jwt-stale");
        identity.set_acquire_delay(Duration::from_secs(5));
        let store = InMemoryStore::new();
        let sync = Arc::new(setup(&identity, &store));

        let pending = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sign_in(fox()).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync.phase(), SyncPhase::Acquiring);
        sync.sign_out();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(SyncError::Superseded)));
        assert_eq!(store.authorization(), None);
        assert!(!store
            .authorization_history()
            .contains(&Some("jwt-stale".to_string())));
        assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_keeps_credential_until_next_tick() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);
        sync.sign_in(fox()).await.unwrap();

        identity.set_acquire_error(Some(IdentityError::Http(HttpError::Timeout(
            "10s".to_string(),
        ))));
        tokio::time::sleep(Duration::from_secs(51)).await;
        assert!(sync.is_ready());
        assert_eq!(store.authorization().as_deref(), Some("jwt-1"));

        identity.set_acquire_error(None);
        identity.set_token(Some("jwt-2"));
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(store.authorization().as_deref(), Some("jwt-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_with_expired_credential_deauthorizes() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = json!({ "sub": "user_1", "exp": chrono::Utc::now().timestamp() - 10 });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let expired = format!("{}.{}.sig", header, payload);

        let identity = MockIdentityProvider::new().with_token(&expired);
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);
        sync.sign_in(fox()).await.unwrap();
        assert!(sync.is_ready());

        identity.set_acquire_error(Some(IdentityError::Http(HttpError::Timeout(
            "10s".to_string(),
        ))));
        tokio::time::sleep(Duration::from_secs(51)).await;
        assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
        assert!(!sync.is_ready());
        assert!(sync.current_credential().is_none());
        assert_eq!(store.authorization(), None);

        // The refresh task keeps ticking and recovers.
        identity.set_acquire_error(None);
        identity.set_token(Some("jwt-2"));
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(store.authorization().as_deref(), Some("jwt-2"));
        assert!(sync.is_ready());
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_while_profile_insert_pending() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        store.set_latency(Duration::from_secs(1));
        let sync = Arc::new(setup(&identity, &store));

        let pending = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sign_in(fox()).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.authorization().as_deref(), Some("jwt-1"));
        assert!(!sync.is_ready());
        assert_eq!(sync.phase(), SyncPhase::Acquiring);
        assert!(store.rows("users").is_empty());

        pending.await.unwrap().unwrap();
        assert!(sync.is_ready());
        assert_eq!(store.rows("users").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_authorization_syncs_profile_before_ready() {
        let identity = MockIdentityProvider::new();
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);

        assert_eq!(sync.sign_in(fox()).await.unwrap(), None);
        assert!(!sync.is_ready());

        identity.set_token(Some("jwt-1"));
        sync.ensure_authorized().await.unwrap();
        assert!(sync.is_ready());
        assert!(sync.is_profile_synced());
        assert_eq!(store.rows("users").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_session_on_refresh_deauthorizes() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);
        let mut phases = sync.subscribe();

        sync.sign_in(fox()).await.unwrap();
        assert_eq!(*phases.borrow_and_update(), SyncPhase::Authorized);

        identity.set_token(None);
        tokio::time::sleep(Duration::from_secs(51)).await;
        assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
        assert_eq!(store.authorization(), None);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(identity.acquire_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_profile_sync_is_retried_on_tick() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        store.set_insert_error(Some(crate::traits::StoreError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        }));
        let sync = setup(&identity, &store);

        sync.sign_in(fox()).await.unwrap();
        assert!(sync.is_ready());
        assert!(!sync.is_profile_synced());

        store.set_insert_error(None);
        tokio::time::sleep(Duration::from_secs(51)).await;
        assert!(sync.is_profile_synced());
        assert_eq!(store.rows("users").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_refresh() {
        let identity = MockIdentityProvider::new().with_token("jwt-1");
        let store = InMemoryStore::new();
        let sync = setup(&identity, &store);
        sync.sign_in(fox()).await.unwrap();

        drop(sync);
        tokio::time::sleep(Duration::from_secs(500)).await;
        assert_eq!(identity.acquire_count(), 1);
    }
}
