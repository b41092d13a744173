//! Domain types for the credential ledger.
//!
//! Identifiers, records and command inputs shared by the registry, the
//! issuance catalog and the resale market. Every identifier is allocated
//! from a monotonic counter owned by one component and is never reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use turnstile_core::{Amount, Identity};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! sequential_id {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Wraps a raw identifier
            #[must_use]
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// The raw identifier
            #[must_use]
            pub const fn value(self) -> $repr {
                self.0
            }

            /// The identifier allocated after this one, `None` once exhausted
            #[must_use]
            pub const fn next(self) -> Option<Self> {
                match self.0.checked_add(1) {
                    Some(value) => Some(Self(value)),
                    None => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

sequential_id!(
    /// Identifier of an event, allocated by the catalog starting at 1
    EventId(u64)
);

sequential_id!(
    /// Identifier of a ticket type, allocated per event starting at 0
    TicketTypeId(u32)
);

sequential_id!(
    /// Global credential identifier, allocated by the registry starting at 1
    TokenId(u64)
);

sequential_id!(
    /// Identifier of a resale listing, allocated by the market starting at 1
    ListingId(u64)
);

/// Opaque tag for the chain or namespace a buyer transacted from.
///
/// Recorded on the credential for provenance; never interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginDomain(String);

impl OriginDomain {
    /// Creates an origin tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as given
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identities the three components act under in cross-component calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentIds {
    /// Credential registry
    pub registry: Identity,
    /// Issuance catalog; the permanent mint authority after bootstrap
    pub catalog: Identity,
    /// Resale market; the operator owners approve before listing
    pub market: Identity,
}

impl Default for ComponentIds {
    fn default() -> Self {
        Self {
            registry: Identity::new("registry"),
            catalog: Identity::new("catalog"),
            market: Identity::new("market"),
        }
    }
}

/// Largest royalty the catalog accepts (100%)
pub const MAX_ROYALTY_BPS: u16 = 10_000;

// ============================================================================
// Events and ticket types
// ============================================================================

/// Everything an organizer supplies to create an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue label
    pub venue: String,
    /// Off-ledger metadata locator (opaque)
    pub metadata_locator: String,
    /// Sales open at this instant
    pub start_time: DateTime<Utc>,
    /// Sales close after this instant
    pub end_time: DateTime<Utc>,
    /// Upper bound on the sum of all ticket-type supplies
    pub total_supply_cap: u32,
    /// Organizer share of every resale, in basis points
    pub royalty_bps: u16,
}

impl EventDraft {
    /// Creates a draft with empty description, venue and metadata locator
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        total_supply_cap: u32,
        royalty_bps: u16,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            venue: String::new(),
            metadata_locator: String::new(),
            start_time,
            end_time,
            total_supply_cap,
            royalty_bps,
        }
    }

    /// Sets the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the venue
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = venue.into();
        self
    }

    /// Sets the metadata locator
    #[must_use]
    pub fn with_metadata_locator(mut self, locator: impl Into<String>) -> Self {
        self.metadata_locator = locator.into();
        self
    }
}

/// An event as stored by the catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Holder of every administrative right over this event
    pub organizer: Identity,
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Venue label
    pub venue: String,
    /// Off-ledger metadata locator
    pub metadata_locator: String,
    /// Sales open at this instant
    pub start_time: DateTime<Utc>,
    /// Sales close after this instant
    pub end_time: DateTime<Utc>,
    /// Upper bound on the sum of all ticket-type supplies
    pub total_supply_cap: u32,
    /// Sum of all ticket-type supplies so far
    pub allocated_supply: u32,
    /// Organizer share of every resale, in basis points
    pub royalty_bps: u16,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether `who` organizes this event
    #[must_use]
    pub fn is_organizer(&self, who: &Identity) -> bool {
        &self.organizer == who
    }

    /// Whether `now` is after the end of the sale window
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    /// Whether `now` is before the start of the sale window
    #[must_use]
    pub fn has_not_started(&self, now: DateTime<Utc>) -> bool {
        now < self.start_time
    }

    /// Supply that can still be allocated to new ticket types
    #[must_use]
    pub const fn unallocated_supply(&self) -> u32 {
        self.total_supply_cap.saturating_sub(self.allocated_supply)
    }
}

/// A priced, capped class of tickets within one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Owning event
    pub event_id: EventId,
    /// Position within the event (starting at 0)
    pub id: TicketTypeId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: Amount,
    /// Most credentials that can ever be minted for this type
    pub supply: u32,
    /// Credentials minted so far; never exceeds `supply`
    pub sold: u32,
}

impl TicketType {
    /// Credentials still available
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.supply.saturating_sub(self.sold)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// A single-use admission credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Global identifier
    pub token_id: TokenId,
    /// Event this credential admits to
    pub event_id: EventId,
    /// Ticket type it was sold as
    pub ticket_type_id: TicketTypeId,
    /// First holder; never changes
    pub original_owner: Identity,
    /// Current holder
    pub current_owner: Identity,
    /// Price paid at mint; never changes
    pub purchase_price: Amount,
    /// Where the buyer transacted from
    pub origin_domain: OriginDomain,
    /// Off-ledger metadata locator
    pub metadata_locator: String,
    /// Whether the credential has been consumed at the door
    pub used: bool,
    /// When the credential was minted
    pub minted_at: DateTime<Utc>,
    /// When the credential was validated, if it has been
    pub used_at: Option<DateTime<Utc>>,
}

/// Fields the catalog supplies when minting a credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintRequest {
    /// Event the credential belongs to
    pub event_id: EventId,
    /// Ticket type it is sold as
    pub ticket_type_id: TicketTypeId,
    /// First holder
    pub owner: Identity,
    /// Unit price paid
    pub purchase_price: Amount,
    /// Buyer's origin tag
    pub origin_domain: OriginDomain,
    /// Off-ledger metadata locator
    pub metadata_locator: String,
}

// ============================================================================
// Listings
// ============================================================================

/// Why a listing stopped being active
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingClosure {
    /// Bought by someone
    Sold,
    /// Withdrawn by the seller
    Canceled,
    /// The seller gave the credential away outside the market
    OwnershipChanged,
}

/// A resale offer for one credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identifier
    pub id: ListingId,
    /// Credential offered
    pub token_id: TokenId,
    /// Owner at listing time
    pub seller: Identity,
    /// Asking price; payment must match exactly
    pub price: Amount,
    /// Whether the listing can still be bought or canceled
    pub active: bool,
    /// When the listing was created
    pub created_at: DateTime<Utc>,
    /// How and when the listing closed
    pub closed: Option<(ListingClosure, DateTime<Utc>)>,
}

/// Value movements of one settled resale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Listing that was bought
    pub listing_id: ListingId,
    /// Credential that changed hands
    pub token_id: TokenId,
    /// Total paid by the buyer
    pub price: Amount,
    /// Share credited to the organizer
    pub royalty: Amount,
    /// Share credited to the seller
    pub seller_amount: Amount,
}
