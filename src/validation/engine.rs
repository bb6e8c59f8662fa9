//! Debounced, race-free username availability checking.
//!
//! Every input change bumps a generation counter, cancels the pending
//! debounce timer, and runs the format rules synchronously. Only a
//! well-formed candidate schedules a remote lookup, and a lookup result is
//! applied only if its generation is still the latest when it lands.
//! Lookups already in flight are never aborted; stale results are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ValidationConfig;
use crate::traits::{DataStore, Filter, StoreError};

use super::rules::{validate_format, InvalidReason};
use super::state::ValidationState;

struct EngineInner {
    /// Bumped on every input change and reset.
    generation: u64,
    /// Debounce timer that has not fired yet.
    pending: Option<JoinHandle<()>>,
    state_tx: watch::Sender<ValidationState>,
}

impl EngineInner {
    fn publish(&self, state: ValidationState) {
        tracing::debug!(
            input = %state.input_value,
            phase = ?state.phase,
            reason = ?state.reason,
            "Username validation transition"
        );
        self.state_tx.send_replace(state);
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

fn lock(inner: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live username validator for one input field.
///
/// # Example
///
/// ```ignore
/// let validator = UsernameValidator::new(store, ValidationConfig::default());
/// let mut states = validator.subscribe();
///
/// validator.on_input_changed("cool_fox42");
/// while states.changed().await.is_ok() {
///     render(&*states.borrow());
/// }
/// ```
pub struct UsernameValidator {
    store: Arc<dyn DataStore>,
    config: Arc<ValidationConfig>,
    inner: Arc<Mutex<EngineInner>>,
}

impl UsernameValidator {
    pub fn new(store: Arc<dyn DataStore>, config: ValidationConfig) -> Self {
        let (state_tx, _) = watch::channel(ValidationState::idle());
        Self {
            store,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(EngineInner {
                generation: 0,
                pending: None,
                state_tx,
            })),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Accept the latest field value, trimmed and lowercased as the
    /// signup form submits it.
    ///
    /// Never performs remote work before returning. Must be called from
    /// within a tokio runtime for the availability lookup to be scheduled.
    pub fn on_input_changed(&self, value: &str) {
        let candidate = value.trim().to_lowercase();
        let mut inner = lock(&self.inner);

        inner.generation += 1;
        let generation = inner.generation;
        inner.cancel_pending();

        let verdict = validate_format(&candidate, &self.config);
        let needs_lookup = verdict.is_checking();
        inner.publish(verdict);
        if !needs_lookup {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime; username availability check not scheduled");
            return;
        };

        let lookup = PendingLookup {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            inner: Arc::clone(&self.inner),
            generation,
            candidate,
        };
        inner.pending = Some(runtime.spawn(lookup.run()));
    }

    /// Snapshot of the current verdict.
    pub fn current_state(&self) -> ValidationState {
        lock(&self.inner).state_tx.borrow().clone()
    }

    /// Receive every verdict transition.
    pub fn subscribe(&self) -> watch::Receiver<ValidationState> {
        lock(&self.inner).state_tx.subscribe()
    }

    /// Return to `Idle`, cancelling any pending lookup and orphaning any
    /// lookup in flight. Used when the form submits or goes away.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.cancel_pending();
        inner.publish(ValidationState::idle());
    }
}

impl Drop for UsernameValidator {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.cancel_pending();
    }
}

impl std::fmt::Debug for UsernameValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameValidator")
            .field("config", &self.config)
            .field("state", &self.current_state())
            .finish()
    }
}

/// A scheduled check: waits out the quiet window, then looks up the
/// candidate and publishes the verdict if it is still current.
struct PendingLookup {
    store: Arc<dyn DataStore>,
    config: Arc<ValidationConfig>,
    inner: Arc<Mutex<EngineInner>>,
    generation: u64,
    candidate: String,
}

impl PendingLookup {
    async fn run(self) {
        tokio::time::sleep(self.config.debounce).await;

        {
            let mut inner = lock(&self.inner);
            if inner.generation != self.generation {
                return;
            }
            // Fired: from here on the lookup is only ever ignored, not aborted.
            inner.pending = None;
        }

        let verdict = check_availability(self.store.as_ref(), &self.config, &self.candidate).await;

        let inner = lock(&self.inner);
        if inner.generation != self.generation {
            tracing::debug!(
                candidate = %self.candidate,
                "Discarding availability result for superseded input"
            );
            return;
        }
        inner.publish(verdict);
    }
}

/// Look up `candidate` in the profile table and turn the outcome into a
/// verdict. No row means available; any other store error is reported as a
/// failed check rather than propagated.
pub async fn check_availability(
    store: &dyn DataStore,
    config: &ValidationConfig,
    candidate: &str,
) -> ValidationState {
    let filter = Filter::eq(config.column.as_str(), candidate);

    match store.query(&config.table, &filter).await {
        Err(StoreError::NotFound { .. }) => ValidationState::valid(candidate),
        Ok(_) => ValidationState::invalid(candidate, InvalidReason::AlreadyTaken, config),
        Err(err) => {
            tracing::warn!(candidate = %candidate, error = %err, "Username availability check failed");
            ValidationState::invalid(candidate, InvalidReason::LookupFailed, config)
        }
    }
}
