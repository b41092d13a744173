//! Turnstile ledger - single-use event tickets as transferable credentials
//!
//! Three components share one transactional ledger:
//!
//! - **Credential Registry**: owns credentials, approvals and the single mint
//!   authority
//! - **Issuance Catalog**: events, ticket types, primary sales, door
//!   validation and organizer withdrawals
//! - **Resale Market**: fixed-price listings with an organizer royalty on
//!   every settled resale
//!
//! # Architecture
//!
//! ```text
//!   caller ──▶ Ledger ──▶ Store (write lock) ──▶ LedgerReducer
//!                                                  │
//!                 ┌───────────────┬────────────────┼───────────────┐
//!                 ▼               ▼                ▼               ▼
//!            Registry         Catalog           Market         ValueBook
//!                                                  │
//!                          journal append ◀────────┘
//!                                  │  (lock released)
//!                                  ▼
//!                      broadcast + payout hook
//! ```
//!
//! A command either commits all of its mutations and journal entries or is
//! rejected with a [`LedgerError`] and leaves nothing behind. Payouts reach
//! external recipients only after the transaction has committed, so a hook
//! that calls back into the ledger observes the settled state.
//!
//! # Value
//!
//! Value enters through [`Ledger::deposit`] and then only moves between
//! accounts and event proceeds:
//!
//! ```text
//! sum(balances) + sum(undisbursed proceeds) == total deposited
//! ```
//!
//! Resale royalties are `floor(price * royalty_bps / 10_000)`; the seller
//! receives the rest.

#![forbid(unsafe_code)]

pub mod aggregates;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notification;
pub mod reducer;
pub mod types;

pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use ledger::Ledger;
pub use notification::{ApprovalScope, LedgerNotification};
pub use reducer::{LedgerCommand, LedgerEnvironment, LedgerReceipt, LedgerReducer, LedgerState};
pub use types::{
    ComponentIds, Credential, Event, EventDraft, EventId, Listing, ListingClosure, ListingId,
    OriginDomain, Settlement, TicketType, TicketTypeId, TokenId,
};
