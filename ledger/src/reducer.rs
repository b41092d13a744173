//! The ledger reducer.
//!
//! One [`LedgerCommand`] is one transaction. The reducer reads the clock
//! once, routes the command to the component that owns it and returns the
//! component's transition with the receipt wrapped in [`LedgerReceipt`].

use crate::aggregates::{CredentialRegistry, IssuanceCatalog, PurchaseOrder, ResaleMarket, ValueBook};
use crate::error::LedgerError;
use crate::notification::LedgerNotification;
use crate::types::{
    ComponentIds, EventDraft, EventId, ListingId, OriginDomain, Settlement, TicketTypeId, TokenId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstile_core::{
    Amount, Clock, Command, Environment, Identity, NoopPayoutHook, PayoutHook, Reducer,
    SystemClock, Transition,
};

// ============================================================================
// State
// ============================================================================

/// All ledger state, committed as one unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    registry: CredentialRegistry,
    catalog: IssuanceCatalog,
    market: ResaleMarket,
    book: ValueBook,
}

impl LedgerState {
    /// Fresh state with `deployer` as the mint authority
    #[must_use]
    pub fn new(deployer: Identity, ids: ComponentIds) -> Self {
        Self {
            registry: CredentialRegistry::new(ids.registry, deployer),
            catalog: IssuanceCatalog::new(ids.catalog),
            market: ResaleMarket::new(ids.market),
            book: ValueBook::new(),
        }
    }

    /// Credential ownership, approvals and validation
    #[must_use]
    pub const fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    /// Events, ticket types and proceeds
    #[must_use]
    pub const fn catalog(&self) -> &IssuanceCatalog {
        &self.catalog
    }

    /// Resale listings
    #[must_use]
    pub const fn market(&self) -> &ResaleMarket {
        &self.market
    }

    /// Account balances
    #[must_use]
    pub const fn book(&self) -> &ValueBook {
        &self.book
    }

    /// Whether `who` is the identity one of the components acts under
    #[must_use]
    pub fn is_component(&self, who: &Identity) -> bool {
        [
            self.registry.identity(),
            self.catalog.identity(),
            self.market.identity(),
        ]
        .contains(&who)
    }

    /// Whether balances plus undisbursed proceeds equal everything deposited
    #[must_use]
    pub fn value_is_conserved(&self) -> bool {
        let held = self
            .book
            .total_balances()
            .zip(self.catalog.total_proceeds())
            .and_then(|(balances, proceeds)| balances.checked_add(proceeds));
        held == Some(self.book.total_issued())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// A write against the ledger, issued on behalf of `caller`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCommand {
    /// Hand minting rights to their permanent holder
    SetMintAuthority {
        /// Current mint authority
        caller: Identity,
        /// Identity that will mint from now on
        new_authority: Identity,
    },

    /// Credit fresh value to an account
    Deposit {
        /// Account credited
        account: Identity,
        /// Amount credited
        amount: Amount,
    },

    /// Create an event organized by the caller
    CreateEvent {
        /// Future organizer
        caller: Identity,
        /// Event details
        draft: EventDraft,
    },

    /// Add a ticket type to an event
    AddTicketType {
        /// Organizer
        caller: Identity,
        /// Event
        event_id: EventId,
        /// Display name
        name: String,
        /// Unit price
        price: Amount,
        /// Supply
        supply: u32,
    },

    /// Primary sale
    PurchaseTicket {
        /// Buyer
        caller: Identity,
        /// Event
        event_id: EventId,
        /// Ticket type
        ticket_type_id: TicketTypeId,
        /// Number of credentials
        quantity: u32,
        /// Attached value
        payment: Amount,
        /// Buyer's origin tag
        origin_domain: OriginDomain,
    },

    /// Gift a credential outside the market
    TransferTicket {
        /// Holder or approved operator
        caller: Identity,
        /// Credential
        token_id: TokenId,
        /// Current holder
        from: Identity,
        /// Recipient
        to: Identity,
    },

    /// Approve an operator for one credential (or clear it)
    Approve {
        /// Holder
        caller: Identity,
        /// Credential
        token_id: TokenId,
        /// Operator, `None` to clear
        operator: Option<Identity>,
    },

    /// Approve or revoke an operator for all of the caller's credentials
    SetApprovalForAll {
        /// Holder
        caller: Identity,
        /// Operator
        operator: Identity,
        /// Grant or revoke
        approved: bool,
    },

    /// Consume a credential at the door
    ValidateTicket {
        /// Organizer
        caller: Identity,
        /// Event the credential is presented for
        event_id: EventId,
        /// Credential
        token_id: TokenId,
    },

    /// Pay out an event's proceeds
    WithdrawFunds {
        /// Organizer
        caller: Identity,
        /// Event
        event_id: EventId,
        /// Recipient
        to: Identity,
    },

    /// Offer a credential for resale
    ListTicket {
        /// Holder
        caller: Identity,
        /// Credential
        token_id: TokenId,
        /// Asking price
        price: Amount,
    },

    /// Buy a resale listing
    BuyTicket {
        /// Buyer
        caller: Identity,
        /// Listing
        listing_id: ListingId,
        /// Attached value
        payment: Amount,
    },

    /// Withdraw a resale listing
    CancelListing {
        /// Seller
        caller: Identity,
        /// Listing
        listing_id: ListingId,
    },
}

impl LedgerCommand {
    /// Who issued the command; `None` for deposits, which credit an account
    /// without acting on anyone's behalf
    #[must_use]
    pub const fn caller(&self) -> Option<&Identity> {
        match self {
            Self::Deposit { .. } => None,
            Self::SetMintAuthority { caller, .. }
            | Self::CreateEvent { caller, .. }
            | Self::AddTicketType { caller, .. }
            | Self::PurchaseTicket { caller, .. }
            | Self::TransferTicket { caller, .. }
            | Self::Approve { caller, .. }
            | Self::SetApprovalForAll { caller, .. }
            | Self::ValidateTicket { caller, .. }
            | Self::WithdrawFunds { caller, .. }
            | Self::ListTicket { caller, .. }
            | Self::BuyTicket { caller, .. }
            | Self::CancelListing { caller, .. } => Some(caller),
        }
    }
}

impl Command for LedgerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::SetMintAuthority { .. } => "set_mint_authority",
            Self::Deposit { .. } => "deposit",
            Self::CreateEvent { .. } => "create_event",
            Self::AddTicketType { .. } => "add_ticket_type",
            Self::PurchaseTicket { .. } => "purchase_ticket",
            Self::TransferTicket { .. } => "transfer_ticket",
            Self::Approve { .. } => "approve",
            Self::SetApprovalForAll { .. } => "set_approval_for_all",
            Self::ValidateTicket { .. } => "validate_ticket",
            Self::WithdrawFunds { .. } => "withdraw_funds",
            Self::ListTicket { .. } => "list_ticket",
            Self::BuyTicket { .. } => "buy_ticket",
            Self::CancelListing { .. } => "cancel_listing",
        }
    }
}

/// What a committed command hands back
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerReceipt {
    /// The command changed state and returns nothing further
    Done,
    /// New balance after a deposit
    Deposited(Amount),
    /// Id of the new event
    EventCreated(EventId),
    /// Id of the new ticket type
    TicketTypeAdded(TicketTypeId),
    /// Minted credentials in order
    TicketsPurchased(Vec<TokenId>),
    /// Amount paid out
    Withdrawn(Amount),
    /// Id of the new listing
    Listed(ListingId),
    /// Value movements of a resale
    Settled(Settlement),
}

// ============================================================================
// Environment
// ============================================================================

/// Injected dependencies of the ledger
#[derive(Clone)]
pub struct LedgerEnvironment {
    clock: Arc<dyn Clock>,
    payout_hook: Arc<dyn PayoutHook>,
}

impl LedgerEnvironment {
    /// Creates an environment from a clock and a payout hook
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, payout_hook: Arc<dyn PayoutHook>) -> Self {
        Self { clock, payout_hook }
    }

    /// System time, payouts ignored
    #[must_use]
    pub fn production() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(NoopPayoutHook))
    }
}

impl Environment for LedgerEnvironment {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn payout_hook(&self) -> &dyn PayoutHook {
        self.payout_hook.as_ref()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Routes ledger commands to the components that own them
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Command = LedgerCommand;
    type Environment = LedgerEnvironment;
    type Notification = LedgerNotification;
    type Receipt = LedgerReceipt;
    type Error = LedgerError;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut LedgerState,
        command: LedgerCommand,
        env: &LedgerEnvironment,
    ) -> Result<Transition<LedgerReceipt, LedgerNotification>, LedgerError> {
        // Component identities act only inside a transaction, as the operator
        // of a settlement or the minter of a sale.
        if let Some(caller) = command.caller().filter(|caller| state.is_component(caller)) {
            return Err(LedgerError::NotAuthority {
                caller: caller.clone(),
            });
        }

        let now = env.clock().now();
        let LedgerState {
            registry,
            catalog,
            market,
            book,
        } = state;

        match command {
            LedgerCommand::SetMintAuthority {
                caller,
                new_authority,
            } => Ok(registry
                .set_mint_authority(&caller, new_authority)?
                .map_receipt(|()| LedgerReceipt::Done)),

            LedgerCommand::Deposit { account, amount } => Ok(book
                .deposit(account, amount)?
                .map_receipt(LedgerReceipt::Deposited)),

            LedgerCommand::CreateEvent { caller, draft } => Ok(catalog
                .create_event(&caller, draft, now)?
                .map_receipt(LedgerReceipt::EventCreated)),

            LedgerCommand::AddTicketType {
                caller,
                event_id,
                name,
                price,
                supply,
            } => Ok(catalog
                .add_ticket_type(&caller, event_id, name, price, supply, now)?
                .map_receipt(LedgerReceipt::TicketTypeAdded)),

            LedgerCommand::PurchaseTicket {
                caller,
                event_id,
                ticket_type_id,
                quantity,
                payment,
                origin_domain,
            } => {
                let order = PurchaseOrder {
                    event_id,
                    ticket_type_id,
                    quantity,
                    payment,
                    origin_domain,
                };
                Ok(catalog
                    .purchase_ticket(&caller, order, registry, book, now)?
                    .map_receipt(LedgerReceipt::TicketsPurchased))
            }

            LedgerCommand::TransferTicket {
                caller,
                token_id,
                from,
                to,
            } => {
                let mut transition = registry
                    .transfer(&caller, token_id, &from, to.clone())?
                    .map_receipt(|()| LedgerReceipt::Done);
                if let Some(notice) = market.retire_stale_listing(token_id, &to, now) {
                    transition = transition.notify(notice);
                }
                Ok(transition)
            }

            LedgerCommand::Approve {
                caller,
                token_id,
                operator,
            } => Ok(registry
                .approve(&caller, token_id, operator)?
                .map_receipt(|()| LedgerReceipt::Done)),

            LedgerCommand::SetApprovalForAll {
                caller,
                operator,
                approved,
            } => Ok(registry
                .set_approval_for_all(&caller, operator, approved)
                .map_receipt(|()| LedgerReceipt::Done)),

            LedgerCommand::ValidateTicket {
                caller,
                event_id,
                token_id,
            } => Ok(catalog
                .validate_ticket(&caller, event_id, token_id, registry, now)?
                .map_receipt(|()| LedgerReceipt::Done)),

            LedgerCommand::WithdrawFunds {
                caller,
                event_id,
                to,
            } => Ok(catalog
                .withdraw_funds(&caller, event_id, to, book)?
                .map_receipt(LedgerReceipt::Withdrawn)),

            LedgerCommand::ListTicket {
                caller,
                token_id,
                price,
            } => Ok(market
                .list_ticket(&caller, token_id, price, &*registry, now)?
                .map_receipt(LedgerReceipt::Listed)),

            LedgerCommand::BuyTicket {
                caller,
                listing_id,
                payment,
            } => Ok(market
                .buy_ticket(&caller, listing_id, payment, registry, book, &*catalog, now)?
                .map_receipt(LedgerReceipt::Settled)),

            LedgerCommand::CancelListing { caller, listing_id } => Ok(market
                .cancel_listing(&caller, listing_id, now)?
                .map_receipt(|()| LedgerReceipt::Done)),
        }
    }
}
