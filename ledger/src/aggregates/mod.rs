//! Ledger components.
//!
//! Each component owns its slice of state and exposes validate-then-apply
//! operations: every rule is checked before the first write, so an operation
//! that returns an error has changed nothing. Operations that span
//! components take the others as explicit `&mut` borrows.

pub mod catalog;
pub mod market;
pub mod registry;
pub mod value_book;

pub use catalog::{EventBook, IssuanceCatalog, PurchaseOrder};
pub use market::{ResaleMarket, royalty_split};
pub use registry::CredentialRegistry;
pub use value_book::ValueBook;

use crate::types::EventId;
use turnstile_core::Identity;

/// Read-only view of event administration data.
///
/// The registry and the market resolve organizers and royalty rates through
/// this trait instead of depending on the catalog directly.
pub trait EventDirectory {
    /// Organizer of an event, `None` for unknown events
    fn organizer_of(&self, event_id: EventId) -> Option<&Identity>;

    /// Resale royalty of an event in basis points, `None` for unknown events
    fn royalty_bps_of(&self, event_id: EventId) -> Option<u16>;
}
