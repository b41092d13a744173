//! # Turnstile Runtime
//!
//! Runtime implementation for the Turnstile credential ledger.
//!
//! This crate provides the [`Store`], the single writer that owns all ledger
//! state. Every command runs as one transaction:
//!
//! 1. Acquire the write lock
//! 2. Run the reducer; on rejection return the error with nothing changed
//! 3. Append the transition's notifications to the journal
//! 4. Release the lock
//! 5. Broadcast the new journal entries and hand payouts to the payout hook
//!
//! Steps 4-5 are ordered so that anything reacting to a committed command,
//! including a payout hook that calls straight back into the store, sees the
//! complete post-commit state and can never observe a half-applied command.
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_runtime::Store;
//!
//! let store = Store::new(LedgerState::default(), LedgerReducer::new(), environment);
//!
//! // Send a command
//! let receipt = store.send(LedgerCommand::Deposit { .. }).await?;
//!
//! // Read state
//! let balance = store.state(|s| s.book.balance_of(&alice)).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast};
use turnstile_core::{Command, Effect, Environment, Journal, JournalEntry, Payout, Reducer};

/// Prometheus metrics for observability
pub mod metrics;

use crate::metrics::StoreMetrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError<E>
    where
        E: std::error::Error + 'static,
    {
        /// The reducer rejected the command; state is unchanged
        #[error(transparent)]
        Rejected(E),

        /// Store is shutting down and not accepting new commands
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for in-flight commands
        #[error("Shutdown timed out with {0} commands still running")]
        ShutdownTimeout(usize),
    }

    impl<E> StoreError<E>
    where
        E: std::error::Error + 'static,
    {
        /// The domain rejection, if this is one
        #[must_use]
        pub const fn rejection(&self) -> Option<&E> {
            match self {
                Self::Rejected(error) => Some(error),
                Self::ShutdownInProgress | Self::ShutdownTimeout(_) => None,
            }
        }
    }
}

pub use error::StoreError;

/// Default number of journal entries buffered for slow subscribers
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// State and journal, guarded together so they commit together
struct Committed<S, N> {
    state: S,
    journal: Journal<N>,
}

/// Counts a command as in flight until dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The Store - single writer over ledger state
///
/// # Type Parameters
///
/// - `R`: Reducer implementation; its associated types fix the state,
///   command, environment, notification, receipt and error types
///
/// Cloning a store is cheap and yields a handle to the same state.
pub struct Store<R>
where
    R: Reducer,
{
    inner: Arc<RwLock<Committed<R::State, R::Notification>>>,
    reducer: Arc<R>,
    environment: Arc<R::Environment>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    notifications: broadcast::Sender<JournalEntry<R::Notification>>,
}

impl<R> Clone for Store<R>
where
    R: Reducer,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            shutdown: Arc::clone(&self.shutdown),
            in_flight: Arc::clone(&self.in_flight),
            notifications: self.notifications.clone(),
        }
    }
}

impl<R> Store<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Send + Sync + 'static,
    R::Command: Command + Send + 'static,
    R::Environment: Environment + 'static,
    R::Notification: Clone + Send + Sync + 'static,
    R::Receipt: Send + 'static,
    R::Error: std::error::Error + Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    ///
    /// Uses [`DEFAULT_BROADCAST_CAPACITY`] for the notification channel.
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        Self::with_broadcast_capacity(
            initial_state,
            reducer,
            environment,
            DEFAULT_BROADCAST_CAPACITY,
        )
    }

    /// Create a new store with a custom notification broadcast capacity
    ///
    /// Subscribers that fall more than `capacity` entries behind observe a
    /// lag error; the journal itself always keeps every entry.
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: R::State,
        reducer: R,
        environment: R::Environment,
        capacity: usize,
    ) -> Self {
        let (notifications, _) = broadcast::channel(capacity.max(1));

        Self {
            inner: Arc::new(RwLock::new(Committed {
                state: initial_state,
                journal: Journal::new(),
            })),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            shutdown: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            notifications,
        }
    }

    /// Run one command as a transaction
    ///
    /// The reducer executes while the write lock is held, so concurrent
    /// `send` calls are serialized. Effects run after the lock is released
    /// and before this method returns.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Rejected`] if the reducer rejected the command
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    #[tracing::instrument(skip_all, name = "store_send", fields(command = command.name()))]
    pub async fn send(&self, command: R::Command) -> Result<R::Receipt, StoreError<R::Error>> {
        let name = command.name();

        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!(command = name, "Command refused during shutdown");
            return Err(StoreError::ShutdownInProgress);
        }

        let _in_flight = InFlight::enter(&self.in_flight);
        let started = Instant::now();

        let (receipt, committed, payouts) = {
            let mut guard = self.inner.write().await;
            let Committed { state, journal } = &mut *guard;

            let transition = match self.reducer.reduce(state, command, &self.environment) {
                Ok(transition) => transition,
                Err(error) => {
                    StoreMetrics::record_rejection(name, started.elapsed());
                    tracing::debug!(command = name, %error, "Command rejected");
                    return Err(StoreError::Rejected(error));
                }
            };

            let recorded_at = self.environment.clock().now();
            let mut committed = Vec::new();
            let mut payouts: Vec<Payout> = Vec::new();
            for effect in transition.effects {
                match effect {
                    Effect::Notify(notification) => {
                        committed.push(journal.append(recorded_at, notification).clone());
                    }
                    Effect::Payout(payout) => payouts.push(payout),
                    Effect::None => {}
                }
            }

            (transition.receipt, committed, payouts)
        };

        StoreMetrics::record_commit(name, committed.len(), started.elapsed());
        tracing::debug!(
            command = name,
            notifications = committed.len(),
            payouts = payouts.len(),
            "Command committed"
        );

        for entry in committed {
            // No subscribers is fine; the journal already has the entry.
            let _ = self.notifications.send(entry);
        }

        for payout in &payouts {
            StoreMetrics::record_payout(payout);
            self.environment.payout_hook().on_payout(payout).await;
        }

        Ok(receipt)
    }

    /// Read state via a closure
    ///
    /// Takes the read lock, so the closure always sees a fully committed
    /// state.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&R::State) -> T,
    {
        let guard = self.inner.read().await;
        f(&guard.state)
    }

    /// Read the journal via a closure
    pub async fn journal<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Journal<R::Notification>) -> T,
    {
        let guard = self.inner.read().await;
        f(&guard.journal)
    }

    /// Journal entries after `sequence`, cloned out of the lock
    pub async fn journal_since(&self, sequence: u64) -> Vec<JournalEntry<R::Notification>> {
        self.journal(|journal| journal.since(sequence).to_vec()).await
    }

    /// Subscribe to journal entries committed from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JournalEntry<R::Notification>> {
        self.notifications.subscribe()
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Initiate graceful shutdown of the store
    ///
    /// This method:
    /// 1. Sets the shutdown flag (rejecting new commands)
    /// 2. Waits for in-flight commands and their effects to finish
    /// 3. Returns when all finish or the timeout expires
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires first.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError<R::Error>> {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.store(true, Ordering::Release);

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            let pending = self.in_flight.load(Ordering::Acquire);

            if pending == 0 {
                tracing::info!("All commands completed, shutdown successful");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(pending_commands = pending, "Shutdown timeout");
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}
