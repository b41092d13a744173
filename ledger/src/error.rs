//! Typed rejections.
//!
//! Every variant describes caller or business state, never a transient
//! infrastructure fault, so none is retried internally. A rejected command
//! leaves the ledger exactly as it was and emits no notification.

use crate::config::ConfigError;
use crate::types::{EventId, ListingId, TicketTypeId, TokenId};
use thiserror::Error;
use turnstile_core::{Amount, Identity};
use turnstile_runtime::StoreError;

/// Reasons the ledger refuses a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller does not organize the event
    #[error("{caller} is not the organizer of event {event_id}")]
    NotOrganizer {
        /// Event in question
        event_id: EventId,
        /// Who asked
        caller: Identity,
    },

    /// Caller (or the stated sender) does not hold the credential
    #[error("{caller} does not own credential {token_id}")]
    NotOwner {
        /// Credential in question
        token_id: TokenId,
        /// Who asked
        caller: Identity,
    },

    /// Caller did not create the listing
    #[error("{caller} is not the seller of listing {listing_id}")]
    NotSeller {
        /// Listing in question
        listing_id: ListingId,
        /// Who asked
        caller: Identity,
    },

    /// Caller lacks the minting or validation authority the action needs,
    /// or claims the identity of one of the ledger's own components
    #[error("{caller} lacks authority for this action")]
    NotAuthority {
        /// Who asked
        caller: Identity,
    },

    /// Caller may not move a credential it neither owns nor was approved for
    #[error("{caller} is not approved to move credential {token_id}")]
    NotApproved {
        /// Credential in question
        token_id: TokenId,
        /// Who asked
        caller: Identity,
    },

    /// The market has not been granted the right to move the credential
    #[error("market is not approved to move credential {token_id}")]
    MarketNotApproved {
        /// Credential in question
        token_id: TokenId,
    },

    /// The one-time mint authority handoff already happened
    #[error("mint authority has already been transferred")]
    AuthorityAlreadyTransferred,

    /// Event start is not before its end
    #[error("event window is empty: start must be before end")]
    InvalidWindow,

    /// Royalty above 100%
    #[error("royalty of {royalty_bps} bps exceeds 10000")]
    InvalidRoyalty {
        /// Requested royalty
        royalty_bps: u16,
    },

    /// A price of zero
    #[error("price must be greater than zero")]
    ZeroPrice,

    /// A supply of zero
    #[error("supply must be greater than zero")]
    ZeroSupply,

    /// A quantity of zero
    #[error("quantity must be greater than zero")]
    ZeroQuantity,

    /// An amount of zero where value must move
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Ticket-type supplies would exceed the event's cap
    #[error("supply {requested} exceeds remaining cap {remaining} of event {event_id}")]
    SupplyExceedsCap {
        /// Event in question
        event_id: EventId,
        /// Supply asked for
        requested: u32,
        /// Supply still unallocated
        remaining: u32,
    },

    /// Sales have not opened yet
    #[error("event {event_id} has not started")]
    EventNotStarted {
        /// Event in question
        event_id: EventId,
    },

    /// Sales have closed
    #[error("event {event_id} has ended")]
    EventEnded {
        /// Event in question
        event_id: EventId,
    },

    /// Not enough supply left for the requested quantity
    #[error("ticket type {ticket_type_id} of event {event_id} has {remaining} left, {requested} requested")]
    SoldOut {
        /// Event in question
        event_id: EventId,
        /// Ticket type in question
        ticket_type_id: TicketTypeId,
        /// Quantity asked for
        requested: u32,
        /// Quantity still available
        remaining: u32,
    },

    /// Attached value differs from the exact amount due
    #[error("incorrect payment: expected {expected}, attached {attached}")]
    IncorrectPayment {
        /// Exact amount due
        expected: Amount,
        /// Amount attached
        attached: Amount,
    },

    /// Caller's balance cannot cover the attached value
    #[error("{account} has {available}, needs {required}")]
    InsufficientBalance {
        /// Account to be debited
        account: Identity,
        /// Amount to debit
        required: Amount,
        /// Current balance
        available: Amount,
    },

    /// The credential has been validated and can no longer move
    #[error("credential {token_id} has been used")]
    CredentialUsed {
        /// Credential in question
        token_id: TokenId,
    },

    /// The credential was validated before
    #[error("credential {token_id} is already used")]
    AlreadyUsed {
        /// Credential in question
        token_id: TokenId,
    },

    /// The credential already has an active listing
    #[error("credential {token_id} is already listed as {listing_id}")]
    AlreadyListed {
        /// Credential in question
        token_id: TokenId,
        /// The active listing
        listing_id: ListingId,
    },

    /// The listing was bought or canceled
    #[error("listing {listing_id} is not active")]
    ListingInactive {
        /// Listing in question
        listing_id: ListingId,
    },

    /// The seller no longer holds the listed credential
    #[error("seller of listing {listing_id} no longer owns the credential")]
    SellerNoLongerOwner {
        /// Listing in question
        listing_id: ListingId,
    },

    /// A seller tried to buy their own listing
    #[error("{caller} cannot buy their own listing {listing_id}")]
    SelfPurchase {
        /// Listing in question
        listing_id: ListingId,
        /// Who asked
        caller: Identity,
    },

    /// The credential belongs to a different event
    #[error("credential {token_id} belongs to event {actual}, not {expected}")]
    EventMismatch {
        /// Credential in question
        token_id: TokenId,
        /// Event named by the caller
        expected: EventId,
        /// Event the credential belongs to
        actual: EventId,
    },

    /// The event has no undisbursed proceeds
    #[error("event {event_id} has nothing to withdraw")]
    NothingToWithdraw {
        /// Event in question
        event_id: EventId,
    },

    /// No event with this identifier
    #[error("event {event_id} does not exist")]
    UnknownEvent {
        /// Identifier asked for
        event_id: EventId,
    },

    /// No ticket type with this identifier in the event
    #[error("event {event_id} has no ticket type {ticket_type_id}")]
    UnknownTicketType {
        /// Event in question
        event_id: EventId,
        /// Identifier asked for
        ticket_type_id: TicketTypeId,
    },

    /// No credential with this identifier
    #[error("credential {token_id} does not exist")]
    UnknownCredential {
        /// Identifier asked for
        token_id: TokenId,
    },

    /// No listing with this identifier
    #[error("listing {listing_id} does not exist")]
    UnknownListing {
        /// Identifier asked for
        listing_id: ListingId,
    },

    /// An amount, counter or identifier would overflow
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The deployment configuration cannot be used
    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The ledger is shutting down and refuses new commands
    #[error("ledger is shutting down")]
    ShuttingDown,

    /// A committed command returned a receipt of the wrong shape
    #[error("command {command} committed with an unexpected receipt")]
    UnexpectedReceipt {
        /// Command name
        command: &'static str,
    },
}

impl From<StoreError<LedgerError>> for LedgerError {
    fn from(error: StoreError<LedgerError>) -> Self {
        match error {
            StoreError::Rejected(rejection) => rejection,
            StoreError::ShutdownInProgress | StoreError::ShutdownTimeout(_) => Self::ShuttingDown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_rejections_unwrap_to_the_domain_error() {
        let error = LedgerError::from(StoreError::Rejected(LedgerError::ZeroPrice));
        assert_eq!(error, LedgerError::ZeroPrice);
        let error = LedgerError::from(StoreError::<LedgerError>::ShutdownInProgress);
        assert_eq!(error, LedgerError::ShuttingDown);
    }

    #[test]
    fn config_errors_convert() {
        let error = LedgerError::from(ConfigError::DuplicateIdentity(Identity::new("market")));
        assert_eq!(
            error.to_string(),
            "invalid ledger configuration: components must have distinct identities, market is used twice"
        );
    }

    #[test]
    fn messages_name_the_subject() {
        let error = LedgerError::IncorrectPayment {
            expected: Amount::new(100),
            attached: Amount::new(99),
        };
        assert_eq!(error.to_string(), "incorrect payment: expected 100, attached 99");
    }
}
