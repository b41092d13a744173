//! Integration tests for journal broadcasting
//!
//! Subscribers see every committed notification exactly once, in journal
//! order, and never see anything from a rejected command.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_test::{assert_err, assert_ok};
use turnstile_core::{
    Clock, Command, Environment, NoopPayoutHook, PayoutHook, Reducer, Transition,
};
use turnstile_runtime::{Store, StoreError};
use turnstile_testing::mocks::FixedClock;
use turnstile_testing::test_clock;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone)]
enum Entry {
    /// Record this many notifications
    Record(u64),
    /// Always rejected
    Refuse,
}

impl Command for Entry {
    fn name(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::Refuse => "refuse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded(u64);

#[derive(Debug, Error)]
#[error("refused")]
struct Refused;

#[derive(Debug, Default)]
struct Counter {
    recorded: u64,
}

struct Env {
    clock: FixedClock,
}

impl Environment for Env {
    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn payout_hook(&self) -> &dyn PayoutHook {
        &NoopPayoutHook
    }
}

struct RecordingReducer;

impl Reducer for RecordingReducer {
    type State = Counter;
    type Command = Entry;
    type Environment = Env;
    type Notification = Recorded;
    type Receipt = u64;
    type Error = Refused;

    fn reduce(
        &self,
        state: &mut Counter,
        command: Entry,
        _env: &Env,
    ) -> Result<Transition<u64, Recorded>, Refused> {
        match command {
            Entry::Refuse => Err(Refused),
            Entry::Record(count) => {
                let mut transition = Transition::new(state.recorded + count);
                for _ in 0..count {
                    state.recorded += 1;
                    transition = transition.notify(Recorded(state.recorded));
                }
                Ok(transition)
            }
        }
    }
}

fn store(capacity: usize) -> Store<RecordingReducer> {
    Store::with_broadcast_capacity(
        Counter::default(),
        RecordingReducer,
        Env {
            clock: test_clock(),
        },
        capacity,
    )
}

// ============================================================================
// Tests
// ============================================================================

/// Every subscriber receives the same entries in sequence order
#[tokio::test]
async fn concurrent_subscribers_see_the_same_sequence() {
    let store = store(64);
    let mut first = store.subscribe();
    let mut second = store.subscribe();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                store.send(Entry::Record(2)).await.unwrap();
            }
        })
    };
    writer.await.unwrap();

    for expected in 1..=10u64 {
        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sequence, expected);
        assert_eq!(a.notification, Recorded(expected));
    }
}

/// Rejections reach neither the journal nor subscribers
#[tokio::test]
async fn rejected_commands_are_not_broadcast() {
    let store = store(8);
    let mut feed = store.subscribe();

    let err = assert_err!(store.send(Entry::Refuse).await);
    assert!(matches!(err, StoreError::Rejected(Refused)));
    assert!(matches!(feed.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(store.journal(|j| j.len()).await, 0);
}

/// A subscriber that falls behind loses entries from the channel, not the journal
#[tokio::test]
async fn lagging_subscriber_can_catch_up_from_the_journal() {
    let store = store(2);
    let mut slow = store.subscribe();

    assert_ok!(store.send(Entry::Record(5)).await);

    match slow.recv().await {
        Err(RecvError::Lagged(missed)) => assert_eq!(missed, 3),
        other => panic!("expected lag, got {other:?}"),
    }
    let replay = store.journal_since(0).await;
    assert_eq!(replay.len(), 5);
    assert_eq!(store.journal_since(3).await.len(), 2);
}

/// Only entries committed after subscribing are delivered
#[tokio::test]
async fn late_subscribers_start_at_the_present() {
    let store = store(8);
    assert_ok!(store.send(Entry::Record(3)).await);

    let mut late = store.subscribe();
    assert_ok!(store.send(Entry::Record(1)).await);

    let entry = late.recv().await.unwrap();
    assert_eq!(entry.sequence, 4);
    assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
}

/// Dropping every handle closes the channel
#[tokio::test]
async fn channel_closes_when_the_store_is_dropped() {
    let store = store(8);
    let mut feed = store.subscribe();
    assert_ok!(store.send(Entry::Record(1)).await);
    drop(store);

    assert!(feed.recv().await.is_ok());
    assert!(matches!(feed.recv().await, Err(RecvError::Closed)));
}

/// Shutdown waits for nothing when idle and then refuses work
#[tokio::test]
async fn shutdown_is_visible_to_every_clone() {
    let store = store(8);
    let other = store.clone();
    assert_ok!(store.shutdown(Duration::from_millis(100)).await);

    assert!(other.is_shutting_down());
    let err = assert_err!(other.send(Entry::Record(1)).await);
    assert!(matches!(err, StoreError::ShutdownInProgress));
}
