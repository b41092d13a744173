//! The ledger handle.
//!
//! [`Ledger`] wraps the store with one async method per write and one per
//! read. Writes take the caller identity explicitly; every write is a single
//! serialized transaction. Cloning the handle is cheap and shares state.

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::metrics;
use crate::notification::LedgerNotification;
use crate::reducer::{LedgerCommand, LedgerEnvironment, LedgerReceipt, LedgerReducer, LedgerState};
use crate::types::{
    ComponentIds, Credential, Event, EventDraft, EventId, Listing, ListingId, OriginDomain,
    Settlement, TicketType, TicketTypeId, TokenId,
};
use std::time::Duration;
use tokio::sync::broadcast;
use turnstile_core::{Amount, Command, Identity, JournalEntry};
use turnstile_runtime::Store;

/// Unwraps the receipt variant a command is known to produce
macro_rules! expect_receipt {
    ($receipt:expr, $command:expr, $pattern:pat => $value:expr) => {
        match $receipt {
            $pattern => Ok($value),
            _ => Err(LedgerError::UnexpectedReceipt { command: $command }),
        }
    };
}

/// Handle to a running credential ledger
#[derive(Clone)]
pub struct Ledger {
    store: Store<LedgerReducer>,
    components: ComponentIds,
}

impl Ledger {
    /// Deploys the components with the deployer as mint authority.
    ///
    /// Until [`Ledger::set_mint_authority`] hands minting to the catalog,
    /// every primary sale fails with [`LedgerError::NotAuthority`].
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidConfig`] if the deployer and the components do
    /// not all have distinct identities.
    pub fn deploy(
        config: &LedgerConfig,
        environment: LedgerEnvironment,
    ) -> Result<Self, LedgerError> {
        config.validate()?;
        let state = LedgerState::new(config.deployer.clone(), config.components.clone());
        let store = Store::with_broadcast_capacity(
            state,
            LedgerReducer::new(),
            environment,
            config.journal_capacity,
        );
        tracing::info!(
            deployer = %config.deployer,
            registry = %config.components.registry,
            catalog = %config.components.catalog,
            market = %config.components.market,
            "Ledger deployed"
        );

        Ok(Self {
            store,
            components: config.components.clone(),
        })
    }

    /// Deploys and performs the one-time handoff of minting to the catalog
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidConfig`] for an unusable configuration. The
    /// handoff itself cannot be refused on a fresh deployment.
    pub async fn bootstrap(
        config: &LedgerConfig,
        environment: LedgerEnvironment,
    ) -> Result<Self, LedgerError> {
        let ledger = Self::deploy(config, environment)?;
        ledger
            .set_mint_authority(&config.deployer, config.components.catalog.clone())
            .await?;
        Ok(ledger)
    }

    async fn send(&self, command: LedgerCommand) -> Result<LedgerReceipt, LedgerError> {
        Ok(self.store.send(command).await?)
    }

    async fn send_expecting_done(&self, command: LedgerCommand) -> Result<(), LedgerError> {
        let name = command.name();
        expect_receipt!(self.send(command).await?, name, LedgerReceipt::Done => ())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Hands minting rights to `new_authority` (once)
    ///
    /// After [`Ledger::bootstrap`] the catalog holds the authority, and no
    /// external caller can act as the catalog, so every further handoff is
    /// refused.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAuthority`] unless `caller` is the current mint
    /// authority.
    pub async fn set_mint_authority(
        &self,
        caller: &Identity,
        new_authority: Identity,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::SetMintAuthority {
            caller: caller.clone(),
            new_authority,
        })
        .await
    }

    /// Credits fresh value to `account` and returns its new balance
    ///
    /// # Errors
    ///
    /// [`LedgerError::ZeroAmount`] or [`LedgerError::ArithmeticOverflow`].
    pub async fn deposit(&self, account: &Identity, amount: Amount) -> Result<Amount, LedgerError> {
        let receipt = self
            .send(LedgerCommand::Deposit {
                account: account.clone(),
                amount,
            })
            .await?;
        expect_receipt!(receipt, "deposit", LedgerReceipt::Deposited(balance) => balance)
    }

    /// Creates an event organized by `caller`
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidWindow`] or [`LedgerError::InvalidRoyalty`].
    pub async fn create_event(
        &self,
        caller: &Identity,
        draft: EventDraft,
    ) -> Result<EventId, LedgerError> {
        let receipt = self
            .send(LedgerCommand::CreateEvent {
                caller: caller.clone(),
                draft,
            })
            .await?;
        expect_receipt!(receipt, "create_event", LedgerReceipt::EventCreated(id) => id)
    }

    /// Adds a ticket type to one of `caller`'s events
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::IssuanceCatalog::add_ticket_type`].
    pub async fn add_ticket_type(
        &self,
        caller: &Identity,
        event_id: EventId,
        name: impl Into<String>,
        price: Amount,
        supply: u32,
    ) -> Result<TicketTypeId, LedgerError> {
        let receipt = self
            .send(LedgerCommand::AddTicketType {
                caller: caller.clone(),
                event_id,
                name: name.into(),
                price,
                supply,
            })
            .await?;
        expect_receipt!(receipt, "add_ticket_type", LedgerReceipt::TicketTypeAdded(id) => id)
    }

    /// Buys `quantity` credentials; returns their ids in mint order
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::IssuanceCatalog::purchase_ticket`].
    pub async fn purchase_ticket(
        &self,
        caller: &Identity,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        payment: Amount,
        origin_domain: OriginDomain,
    ) -> Result<Vec<TokenId>, LedgerError> {
        let receipt = self
            .send(LedgerCommand::PurchaseTicket {
                caller: caller.clone(),
                event_id,
                ticket_type_id,
                quantity,
                payment,
                origin_domain,
            })
            .await?;
        let token_ids = expect_receipt!(
            receipt,
            "purchase_ticket",
            LedgerReceipt::TicketsPurchased(ids) => ids
        )?;
        metrics::record_tickets_sold(token_ids.len(), payment);
        Ok(token_ids)
    }

    /// Gives a credential away outside the market
    ///
    /// Any listing the giver still had on it is canceled.
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::CredentialRegistry::check_transfer`].
    pub async fn transfer_ticket(
        &self,
        caller: &Identity,
        token_id: TokenId,
        from: &Identity,
        to: Identity,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::TransferTicket {
            caller: caller.clone(),
            token_id,
            from: from.clone(),
            to,
        })
        .await
    }

    /// Approves `operator` for one credential, or clears it with `None`
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotOwner`] or [`LedgerError::CredentialUsed`].
    pub async fn approve(
        &self,
        caller: &Identity,
        token_id: TokenId,
        operator: Option<Identity>,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::Approve {
            caller: caller.clone(),
            token_id,
            operator,
        })
        .await
    }

    /// Approves or revokes `operator` for all of `caller`'s credentials
    ///
    /// # Errors
    ///
    /// Only [`LedgerError::ShuttingDown`].
    pub async fn set_approval_for_all(
        &self,
        caller: &Identity,
        operator: Identity,
        approved: bool,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::SetApprovalForAll {
            caller: caller.clone(),
            operator,
            approved,
        })
        .await
    }

    /// Consumes a credential at the door
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::IssuanceCatalog::validate_ticket`].
    pub async fn validate_ticket(
        &self,
        caller: &Identity,
        event_id: EventId,
        token_id: TokenId,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::ValidateTicket {
            caller: caller.clone(),
            event_id,
            token_id,
        })
        .await?;
        metrics::record_validation();
        Ok(())
    }

    /// Pays an event's proceeds to `to` and returns the amount
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::IssuanceCatalog::withdraw_funds`].
    pub async fn withdraw_funds(
        &self,
        caller: &Identity,
        event_id: EventId,
        to: Identity,
    ) -> Result<Amount, LedgerError> {
        let receipt = self
            .send(LedgerCommand::WithdrawFunds {
                caller: caller.clone(),
                event_id,
                to,
            })
            .await?;
        expect_receipt!(receipt, "withdraw_funds", LedgerReceipt::Withdrawn(amount) => amount)
    }

    /// Lists a credential for resale
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::ResaleMarket::list_ticket`].
    pub async fn list_ticket(
        &self,
        caller: &Identity,
        token_id: TokenId,
        price: Amount,
    ) -> Result<ListingId, LedgerError> {
        let receipt = self
            .send(LedgerCommand::ListTicket {
                caller: caller.clone(),
                token_id,
                price,
            })
            .await?;
        expect_receipt!(receipt, "list_ticket", LedgerReceipt::Listed(id) => id)
    }

    /// Buys a listing
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::ResaleMarket::buy_ticket`].
    pub async fn buy_ticket(
        &self,
        caller: &Identity,
        listing_id: ListingId,
        payment: Amount,
    ) -> Result<Settlement, LedgerError> {
        let receipt = self
            .send(LedgerCommand::BuyTicket {
                caller: caller.clone(),
                listing_id,
                payment,
            })
            .await?;
        let settlement =
            expect_receipt!(receipt, "buy_ticket", LedgerReceipt::Settled(settlement) => settlement)?;
        metrics::record_resale(settlement.royalty);
        Ok(settlement)
    }

    /// Cancels one of `caller`'s listings
    ///
    /// # Errors
    ///
    /// See [`crate::aggregates::ResaleMarket::cancel_listing`].
    pub async fn cancel_listing(
        &self,
        caller: &Identity,
        listing_id: ListingId,
    ) -> Result<(), LedgerError> {
        self.send_expecting_done(LedgerCommand::CancelListing {
            caller: caller.clone(),
            listing_id,
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Identity owners approve so the market can settle their listings
    #[must_use]
    pub const fn market_identity(&self) -> &Identity {
        &self.components.market
    }

    /// Read any part of the state
    pub async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&LedgerState) -> T,
    {
        self.store.state(f).await
    }

    /// An event by id
    pub async fn event(&self, event_id: EventId) -> Option<Event> {
        self.read(|s| s.catalog().event(event_id).cloned()).await
    }

    /// All events in id order
    pub async fn events(&self) -> Vec<Event> {
        self.read(|s| s.catalog().events().cloned().collect()).await
    }

    /// Ticket types of an event
    pub async fn ticket_types(&self, event_id: EventId) -> Vec<TicketType> {
        self.read(|s| s.catalog().ticket_types(event_id).to_vec()).await
    }

    /// One ticket type
    pub async fn ticket_type(
        &self,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
    ) -> Option<TicketType> {
        self.read(|s| s.catalog().ticket_type(event_id, ticket_type_id).cloned())
            .await
    }

    /// Undisbursed proceeds of an event
    pub async fn withdrawable(&self, event_id: EventId) -> Option<Amount> {
        self.read(|s| s.catalog().withdrawable(event_id)).await
    }

    /// A credential by id
    pub async fn credential(&self, token_id: TokenId) -> Option<Credential> {
        self.read(|s| s.registry().credential(token_id).cloned()).await
    }

    /// Current holder of a credential
    pub async fn owner_of(&self, token_id: TokenId) -> Option<Identity> {
        self.read(|s| s.registry().owner_of(token_id).cloned()).await
    }

    /// Credentials held by `owner`
    pub async fn tokens_of(&self, owner: &Identity) -> Vec<TokenId> {
        self.read(|s| s.registry().tokens_of(owner)).await
    }

    /// Who may currently mint
    pub async fn mint_authority(&self) -> Identity {
        self.read(|s| s.registry().mint_authority().clone()).await
    }

    /// Whether `operator` holds or may move a credential
    pub async fn is_approved_or_owner(&self, operator: &Identity, token_id: TokenId) -> bool {
        self.read(|s| s.registry().is_approved_or_owner(operator, token_id))
            .await
    }

    /// A listing by id
    pub async fn listing(&self, listing_id: ListingId) -> Option<Listing> {
        self.read(|s| s.market().listing(listing_id).cloned()).await
    }

    /// The active listing of a credential
    pub async fn active_listing_for(&self, token_id: TokenId) -> Option<ListingId> {
        self.read(|s| s.market().active_listing_for(token_id)).await
    }

    /// All active listings
    pub async fn active_listings(&self) -> Vec<Listing> {
        self.read(|s| s.market().active_listings().cloned().collect())
            .await
    }

    /// Value balance of an account
    pub async fn balance_of(&self, account: &Identity) -> Amount {
        self.read(|s| s.book().balance_of(account)).await
    }

    /// Value ever deposited
    pub async fn total_issued(&self) -> Amount {
        self.read(|s| s.book().total_issued()).await
    }

    /// Whether balances plus undisbursed proceeds equal deposited value
    pub async fn value_is_conserved(&self) -> bool {
        self.read(LedgerState::value_is_conserved).await
    }

    // ------------------------------------------------------------------------
    // Journal and lifecycle
    // ------------------------------------------------------------------------

    /// Notifications committed from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JournalEntry<LedgerNotification>> {
        self.store.subscribe()
    }

    /// The whole journal, oldest first
    pub async fn journal(&self) -> Vec<JournalEntry<LedgerNotification>> {
        self.store.journal(|journal| journal.entries().to_vec()).await
    }

    /// Journal entries after `sequence`
    pub async fn journal_since(&self, sequence: u64) -> Vec<JournalEntry<LedgerNotification>> {
        self.store.journal_since(sequence).await
    }

    /// The journal as JSON lines
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which the notification types never
    /// produce in practice.
    pub async fn journal_json_lines(&self) -> Result<String, serde_json::Error> {
        self.store.journal(|journal| journal.to_json_lines()).await
    }

    /// Stop accepting commands and wait for in-flight ones
    ///
    /// # Errors
    ///
    /// [`LedgerError::ShuttingDown`] if commands were still running when
    /// `timeout` expired.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), LedgerError> {
        Ok(self.store.shutdown(timeout).await?)
    }
}
