//! # Turnstile Core
//!
//! Core traits and value types for the Turnstile credential ledger.
//!
//! The ledger is built from the same small set of ideas throughout:
//!
//! - **State**: owned, cloneable ledger state for a component
//! - **Command**: a request to change state, issued on behalf of a caller
//! - **Reducer**: `(State, Command, Environment) → Result<Transition, Error>`
//! - **Effect**: a description of work that leaves the transaction
//!   (audit notifications, value payouts), executed after commit
//! - **Environment**: injected dependencies (clock, payout hook)
//!
//! A reducer either returns a [`reducer::Transition`] and has committed its
//! mutations, or returns an error and has touched nothing. Reducers validate
//! every precondition before the first write.
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_core::*;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Command = CounterCommand;
//!     type Environment = CounterEnvironment;
//!     type Notification = CounterNotification;
//!     type Receipt = u64;
//!     type Error = CounterError;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         command: CounterCommand,
//!         env: &CounterEnvironment,
//!     ) -> Result<Transition<u64, CounterNotification>, CounterError> {
//!         state.count = state.count.checked_add(1).ok_or(CounterError::Overflow)?;
//!         Ok(Transition::new(state.count).notify(CounterNotification::Incremented))
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Append-only audit journal
pub mod journal;

/// Ledger value primitives (identities and amounts)
pub mod value;

pub use journal::{Journal, JournalEntry};
pub use value::{Amount, Identity};

/// Command module - requests submitted to a reducer
pub mod command {
    /// A command that can be routed through a reducer.
    ///
    /// The name is used as a stable label for logs and metrics, so it should
    /// be a short `snake_case` identifier such as `"purchase_ticket"`.
    pub trait Command {
        /// Stable name of this command
        fn name(&self) -> &'static str;
    }
}

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions over owned state:
/// `(State, Command, Environment) → Result<(State', Receipt, Effects), Error>`
pub mod reducer {
    use super::effect::{Effect, Effects, Payout};

    /// Outcome of a successfully reduced command.
    ///
    /// Carries the value handed back to the caller and the effects that the
    /// runtime executes once the transaction has committed.
    #[derive(Debug)]
    pub struct Transition<Receipt, Notification> {
        /// Value returned to the caller
        pub receipt: Receipt,
        /// Effects to run after commit, in order
        pub effects: Effects<Notification>,
    }

    impl<Receipt, Notification> Transition<Receipt, Notification> {
        /// Creates a transition with no effects
        #[must_use]
        pub fn new(receipt: Receipt) -> Self {
            Self {
                receipt,
                effects: Effects::new(),
            }
        }

        /// Creates a transition that carries already collected effects
        #[must_use]
        pub const fn with_effects(receipt: Receipt, effects: Effects<Notification>) -> Self {
            Self { receipt, effects }
        }

        /// Appends an audit notification
        #[must_use]
        pub fn notify(mut self, notification: Notification) -> Self {
            self.effects.push(Effect::Notify(notification));
            self
        }

        /// Appends a payout
        #[must_use]
        pub fn payout(mut self, payout: Payout) -> Self {
            self.effects.push(Effect::Payout(payout));
            self
        }

        /// Replaces the receipt, keeping the effects
        #[must_use]
        pub fn map_receipt<T>(self, f: impl FnOnce(Receipt) -> T) -> Transition<T, Notification> {
            Transition {
                receipt: f(self.receipt),
                effects: self.effects,
            }
        }

        /// Notifications carried by this transition, in emission order
        pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
            self.effects.iter().filter_map(|effect| match effect {
                Effect::Notify(notification) => Some(notification),
                Effect::Payout(_) | Effect::None => None,
            })
        }

        /// Payouts carried by this transition, in emission order
        pub fn payouts(&self) -> impl Iterator<Item = &Payout> {
            self.effects.iter().filter_map(|effect| match effect {
                Effect::Payout(payout) => Some(payout),
                Effect::Notify(_) | Effect::None => None,
            })
        }
    }

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The ledger state this reducer operates on
    /// - `Command`: The commands this reducer accepts
    /// - `Environment`: Injected dependencies
    /// - `Notification`: Audit records emitted on success
    /// - `Receipt`: Value returned to the caller on success
    /// - `Error`: Typed rejection
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The command type this reducer processes
        type Command;

        /// The environment type with injected dependencies
        type Environment;

        /// Audit notification type
        type Notification;

        /// Value returned to the caller on success
        type Receipt;

        /// Rejection type
        type Error;

        /// Reduce a command into state changes and effects.
        ///
        /// Implementations must either:
        /// 1. validate the command, apply it to `state` and return the
        ///    transition, or
        /// 2. return an error without having modified `state`.
        ///
        /// # Errors
        ///
        /// Returns the reducer's rejection when the command violates a
        /// business rule. State is left untouched in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            command: Self::Command,
            env: &Self::Environment,
        ) -> Result<Transition<Self::Receipt, Self::Notification>, Self::Error>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe work that happens outside the transaction. They are
/// values, returned from reducers and executed by the Store runtime only
/// after the state change has been committed and the write lock released.
pub mod effect {
    use super::value::{Amount, Identity};
    use serde::{Deserialize, Serialize};
    use smallvec::SmallVec;

    /// Inline buffer of effects; most commands produce four or fewer.
    pub type Effects<Notification> = SmallVec<[Effect<Notification>; 4]>;

    /// Why value left the ledger's custody
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum PayoutKind {
        /// Primary-sale proceeds withdrawn by an organizer
        Withdrawal,
        /// Organizer share of a resale
        Royalty,
        /// Seller share of a resale
        SaleProceeds,
    }

    /// A value credit that was committed inside a transaction.
    ///
    /// By the time the runtime hands a payout to a hook, the recipient's
    /// balance already reflects it.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Payout {
        /// Who was credited
        pub recipient: Identity,
        /// How much
        pub amount: Amount,
        /// Why
        pub kind: PayoutKind,
    }

    impl Payout {
        /// Creates a payout record
        #[must_use]
        pub const fn new(recipient: Identity, amount: Amount, kind: PayoutKind) -> Self {
            Self {
                recipient,
                amount,
                kind,
            }
        }
    }

    /// Effect type - describes work to run after commit
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Effect<Notification> {
        /// No-op effect
        None,

        /// Append to the audit journal and broadcast to subscribers
        Notify(Notification),

        /// Hand a committed value credit to the payout hook
        Payout(Payout),
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected via
/// the Environment parameter.
pub mod environment {
    use super::effect::Payout;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// The ledger reads the clock once at command entry; every timing rule
    /// inside that command is evaluated against that single reading.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Receives value credits after the transaction that produced them has
    /// committed.
    ///
    /// A hook may call back into the ledger; it always observes committed
    /// state because the runtime releases its write lock before invoking it.
    #[async_trait]
    pub trait PayoutHook: Send + Sync {
        /// Called once per committed payout, in emission order
        async fn on_payout(&self, payout: &Payout);
    }

    /// Hook that ignores every payout
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoopPayoutHook;

    #[async_trait]
    impl PayoutHook for NoopPayoutHook {
        async fn on_payout(&self, _payout: &Payout) {}
    }

    /// Dependencies every reducer environment must expose to the runtime
    pub trait Environment: Send + Sync {
        /// Clock used for command timing and journal timestamps
        fn clock(&self) -> &dyn Clock;

        /// Hook notified of committed payouts
        fn payout_hook(&self) -> &dyn PayoutHook;
    }
}

pub use command::Command;
pub use effect::{Effect, Effects, Payout, PayoutKind};
pub use environment::{Clock, Environment, NoopPayoutHook, PayoutHook, SystemClock};
pub use reducer::{Reducer, Transition};
