//! # Turnstile Testing
//!
//! Testing utilities and helpers for the Turnstile credential ledger.
//!
//! This crate provides:
//! - Mock implementations of Environment traits (clocks, payout hooks)
//! - [`CommandTest`], a Given-When-Then harness for reducers
//! - proptest strategies for ledger value types
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::{CommandTest, test_clock};
//!
//! CommandTest::new(LedgerReducer::new())
//!     .with_env(test_environment())
//!     .given_state(LedgerState::default())
//!     .when_command(LedgerCommand::Deposit { .. })
//!     .then_receipt(|receipt| assert!(matches!(receipt, LedgerReceipt::Deposited(_))))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use turnstile_core::environment::Clock;


pub use command_test::CommandTest;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Mutex, PoisonError};
    use turnstile_core::{Payout, PayoutHook};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that tests move by hand, with millisecond resolution.
    ///
    /// Shared through an `Arc`, it lets a test walk an event through its
    /// sale window: before start, during, after end.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        /// Create a clock reading `start`
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                millis: AtomicI64::new(start.timestamp_millis()),
            }
        }

        /// Jump to an absolute time
        pub fn set(&self, time: DateTime<Utc>) {
            self.millis.store(time.timestamp_millis(), Ordering::SeqCst);
        }

        /// Move forward by `delta`
        pub fn advance(&self, delta: chrono::Duration) {
            self.millis
                .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
                .unwrap_or_default()
        }
    }

    /// Payout hook that remembers every payout it receives
    #[derive(Debug, Default)]
    pub struct RecordingPayoutHook {
        payouts: Mutex<Vec<Payout>>,
    }

    impl RecordingPayoutHook {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Payouts received so far, in order
        #[must_use]
        pub fn payouts(&self) -> Vec<Payout> {
            self.payouts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl PayoutHook for RecordingPayoutHook {
        async fn on_payout(&self, payout: &Payout) {
            self.payouts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(payout.clone());
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant every default test clock reads (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use turnstile_core::{Amount, Identity};

    /// Any royalty rate the catalog accepts, in basis points
    pub fn royalty_bps() -> impl Strategy<Value = u16> {
        0u16..=10_000
    }

    /// A positive amount
    pub fn positive_amount() -> impl Strategy<Value = Amount> {
        (1u64..=u64::MAX).prop_map(Amount::new)
    }

    /// A positive amount small enough that thousands of them still fit in a `u64`
    pub fn modest_amount() -> impl Strategy<Value = Amount> {
        (1u64..=1_000_000_000).prop_map(Amount::new)
    }

    /// One of a small, fixed pool of identities, so generated operations
    /// collide on the same accounts often
    pub fn pooled_identity() -> impl Strategy<Value = Identity> {
        prop_oneof![
            Just(Identity::new("alice")),
            Just(Identity::new("bob")),
            Just(Identity::new("carol")),
            Just(Identity::new("dave")),
        ]
    }
}

/// Install a `tracing` subscriber for test output, once per process.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, RecordingPayoutHook, test_clock, test_epoch};
