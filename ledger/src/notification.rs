//! Audit notifications.
//!
//! One notification per state change, appended to the journal inside the
//! transaction that made the change. External indexers rebuild every read
//! model from this stream alone.

use crate::types::{EventId, ListingClosure, ListingId, OriginDomain, TicketTypeId, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{Amount, Identity};

/// What an approval applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    /// A single credential
    Token(TokenId),
    /// Every credential the owner holds, now or later
    AllCredentials,
}

/// Notifications emitted by committed commands
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerNotification {
    /// Minting rights moved from the deployer to their permanent holder
    MintAuthorityTransferred {
        /// Authority before the handoff
        previous: Identity,
        /// Authority after the handoff
        current: Identity,
    },

    /// Value entered the ledger
    FundsDeposited {
        /// Credited account
        account: Identity,
        /// Amount credited
        amount: Amount,
    },

    /// An event was created
    EventCreated {
        /// New event
        event_id: EventId,
        /// Its organizer
        organizer: Identity,
        /// Display name
        name: String,
        /// Sales open
        start_time: DateTime<Utc>,
        /// Sales close
        end_time: DateTime<Utc>,
        /// Supply cap
        total_supply_cap: u32,
        /// Resale royalty
        royalty_bps: u16,
    },

    /// A ticket type was added to an event
    TicketTypeAdded {
        /// Owning event
        event_id: EventId,
        /// New ticket type
        ticket_type_id: TicketTypeId,
        /// Display name
        name: String,
        /// Unit price
        price: Amount,
        /// Supply
        supply: u32,
    },

    /// A credential came into existence
    CredentialMinted {
        /// New credential
        token_id: TokenId,
        /// Its event
        event_id: EventId,
        /// Its ticket type
        ticket_type_id: TicketTypeId,
        /// First holder
        owner: Identity,
        /// Price paid
        purchase_price: Amount,
        /// Buyer's origin tag
        origin_domain: OriginDomain,
    },

    /// A primary sale settled
    TicketsPurchased {
        /// Event
        event_id: EventId,
        /// Ticket type
        ticket_type_id: TicketTypeId,
        /// Buyer
        buyer: Identity,
        /// Credentials minted, in order
        token_ids: Vec<TokenId>,
        /// Total paid
        total_paid: Amount,
    },

    /// A credential changed hands
    CredentialTransferred {
        /// Credential
        token_id: TokenId,
        /// Previous holder
        from: Identity,
        /// New holder
        to: Identity,
    },

    /// An owner granted or revoked a transfer approval
    ApprovalChanged {
        /// Owner granting the approval
        owner: Identity,
        /// Operator approved or revoked; `None` clears a token approval
        operator: Option<Identity>,
        /// What the approval covers
        scope: ApprovalScope,
        /// Whether the approval is now in force
        approved: bool,
    },

    /// A credential was consumed at the door
    CredentialValidated {
        /// Credential
        token_id: TokenId,
        /// Its event
        event_id: EventId,
        /// Holder at validation time
        holder: Identity,
        /// Organizer who validated it
        validated_by: Identity,
    },

    /// An organizer withdrew primary-sale proceeds
    FundsWithdrawn {
        /// Event
        event_id: EventId,
        /// Recipient
        to: Identity,
        /// Amount withdrawn
        amount: Amount,
    },

    /// A credential was offered for resale
    ListingCreated {
        /// New listing
        listing_id: ListingId,
        /// Credential offered
        token_id: TokenId,
        /// Seller
        seller: Identity,
        /// Asking price
        price: Amount,
    },

    /// A resale settled
    ListingPurchased {
        /// Listing
        listing_id: ListingId,
        /// Credential sold
        token_id: TokenId,
        /// Seller
        seller: Identity,
        /// Buyer
        buyer: Identity,
        /// Price paid
        price: Amount,
        /// Organizer credited with the royalty
        organizer: Identity,
        /// Organizer share
        royalty: Amount,
        /// Seller share
        seller_amount: Amount,
    },

    /// A listing closed without a sale
    ListingCanceled {
        /// Listing
        listing_id: ListingId,
        /// Credential that was offered
        token_id: TokenId,
        /// Seller
        seller: Identity,
        /// Why it closed
        reason: ListingClosure,
    },
}

impl LedgerNotification {
    /// Stable `snake_case` name of this notification
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MintAuthorityTransferred { .. } => "mint_authority_transferred",
            Self::FundsDeposited { .. } => "funds_deposited",
            Self::EventCreated { .. } => "event_created",
            Self::TicketTypeAdded { .. } => "ticket_type_added",
            Self::CredentialMinted { .. } => "credential_minted",
            Self::TicketsPurchased { .. } => "tickets_purchased",
            Self::CredentialTransferred { .. } => "credential_transferred",
            Self::ApprovalChanged { .. } => "approval_changed",
            Self::CredentialValidated { .. } => "credential_validated",
            Self::FundsWithdrawn { .. } => "funds_withdrawn",
            Self::ListingCreated { .. } => "listing_created",
            Self::ListingPurchased { .. } => "listing_purchased",
            Self::ListingCanceled { .. } => "listing_canceled",
        }
    }
}
