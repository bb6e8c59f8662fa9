//! Integration tests for the credential synchronizer against shared state.

mod common;

use common::*;
use idmirror::config::SyncConfig;
use idmirror::error::SyncError;
use idmirror::profile::{Identity, ProfileService};
use idmirror::sync::{CredentialSynchronizer, SyncPhase};
use std::sync::Arc;
use std::time::Duration;

fn synchronizer(identity: &MockIdentityProvider, store: &InMemoryStore) -> CredentialSynchronizer {
    CredentialSynchronizer::new(
        Arc::new(identity.clone()),
        Arc::new(store.clone()),
        SyncConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_profile_sync_creates_one_row() {
    let store = profile_store();
    store.set_latency(Duration::from_millis(10));

    let phone = MockIdentityProvider::new().with_token(&jwt_for("user_1"));
    let laptop = MockIdentityProvider::new().with_token(&jwt_for("user_1"));
    let a = synchronizer(&phone, &store);
    let b = synchronizer(&laptop, &store);

    let identity = Identity::new("user_1")
        .with_email("fox@example.com")
        .with_name("Fox", "Mulder");
    let (first, second) = tokio::join!(a.sign_in(identity.clone()), b.sign_in(identity));

    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_some());
    assert_eq!(store.rows("users").len(), 1);
    assert!(a.is_profile_synced());
    assert!(b.is_profile_synced());
    assert_eq!(store.insert_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_existing_profile_is_left_untouched() {
    let store = profile_store();
    store.seed(
        "users",
        serde_json::json!({ "clerk_id": "user_1", "username": "cool_fox42", "email": "old@example.com" }),
    );
    let identity = MockIdentityProvider::new().with_token(&jwt_for("user_1"));
    let sync = synchronizer(&identity, &store);

    sync.sign_in(Identity::new("user_1").with_email("new@example.com"))
        .await
        .unwrap();

    let profile = ProfileService::new(Arc::new(store.clone()))
        .fetch("user_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.username.as_deref(), Some("cool_fox42"));
    assert_eq!(profile.email.as_deref(), Some("old@example.com"));
    assert_eq!(store.insert_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_store_requests_carry_current_credential() {
    let store = profile_store();
    let token = jwt_for("user_1");
    let identity = MockIdentityProvider::new().with_token(&token);
    let sync = synchronizer(&identity, &store);

    sync.sign_in(Identity::new("user_1")).await.unwrap();

    let calls = store.calls();
    assert!(!calls.is_empty());
    for call in calls {
        assert_eq!(call.authorization.as_deref(), Some(token.as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rotates_credential_and_sign_out_clears_it() {
    let store = profile_store();
    let identity = MockIdentityProvider::new().with_token("token-1");
    let sync = synchronizer(&identity, &store);
    let mut phases = sync.subscribe();

    sync.sign_in(Identity::new("user_1")).await.unwrap();
    assert_eq!(*phases.borrow_and_update(), SyncPhase::Authorized);

    identity.set_token(Some("token-2"));
    tokio::time::sleep(Duration::from_secs(51)).await;
    assert_eq!(store.authorization().as_deref(), Some("token-2"));
    assert_eq!(identity.acquire_count(), 2);

    sync.sign_out();
    assert_eq!(sync.phase(), SyncPhase::Unauthenticated);
    assert_eq!(store.authorization(), None);

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(identity.acquire_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_switching_identity_discards_slow_previous_acquisition() {
    let store = profile_store();
    let identity = MockIdentityProvider::new();
    identity.set_acquire_delay(Duration::from_millis(100));
    identity.push_token(Some("token-for-a"));
    identity.push_token(Some("token-for-b"));
    let sync = Arc::new(synchronizer(&identity, &store));

    let first = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.sign_in(Identity::new("user_a")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = sync.sign_in(Identity::new("user_b")).await.unwrap();

    assert!(matches!(first.await.unwrap(), Err(SyncError::Superseded)));
    assert!(second.is_some());
    assert_eq!(sync.identity().unwrap().subject_id, "user_b");
    assert_eq!(store.authorization().as_deref(), Some("token-for-b"));
    assert!(!store
        .authorization_history()
        .contains(&Some("token-for-a".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_profile_sync_inserts_once() {
    let store = profile_store();
    let identity = MockIdentityProvider::new().with_token(&jwt_for("user_1"));
    let sync = synchronizer(&identity, &store);

    sync.sign_in(Identity::new("user_1")).await.unwrap();
    let again = sync.ensure_profile_synced().await.unwrap();

    assert_eq!(again, idmirror::profile::ProfileSyncOutcome::AlreadyPresent);
    assert_eq!(store.insert_count(), 1);
    assert_eq!(store.rows("users").len(), 1);
}
