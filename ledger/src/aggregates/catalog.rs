//! Issuance catalog.
//!
//! Owns events, their ticket types and the primary-sale proceeds of each
//! event. Credentials are minted through the registry under the catalog's
//! own identity, which must hold the mint authority.

use crate::aggregates::{CredentialRegistry, EventDirectory, ValueBook};
use crate::error::LedgerError;
use crate::notification::LedgerNotification;
use crate::types::{
    Event, EventDraft, EventId, MAX_ROYALTY_BPS, MintRequest, OriginDomain, TicketType,
    TicketTypeId, TokenId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnstile_core::{Amount, Identity, Payout, PayoutKind, Transition};

/// An event together with everything the catalog tracks for it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBook {
    /// The event record
    pub event: Event,
    /// Ticket types in id order; the id is the position
    pub ticket_types: Vec<TicketType>,
    /// Undisbursed primary-sale proceeds
    pub proceeds: Amount,
}

/// A primary sale request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseOrder {
    /// Event to buy into
    pub event_id: EventId,
    /// Ticket type to buy
    pub ticket_type_id: TicketTypeId,
    /// Number of credentials
    pub quantity: u32,
    /// Attached value; must equal price times quantity
    pub payment: Amount,
    /// Buyer's origin tag
    pub origin_domain: OriginDomain,
}

/// Events, ticket types and proceeds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceCatalog {
    identity: Identity,
    next_event_id: EventId,
    events: BTreeMap<EventId, EventBook>,
}

impl IssuanceCatalog {
    /// Creates an empty catalog acting as `identity`
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity,
            next_event_id: EventId::new(1),
            events: BTreeMap::new(),
        }
    }

    /// Creates an event organized by `caller`
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidWindow`] unless start is before end
    /// - [`LedgerError::InvalidRoyalty`] above 10 000 basis points
    /// - [`LedgerError::ArithmeticOverflow`] if event ids run out
    pub fn create_event(
        &mut self,
        caller: &Identity,
        draft: EventDraft,
        now: DateTime<Utc>,
    ) -> Result<Transition<EventId, LedgerNotification>, LedgerError> {
        if draft.start_time >= draft.end_time {
            return Err(LedgerError::InvalidWindow);
        }
        if draft.royalty_bps > MAX_ROYALTY_BPS {
            return Err(LedgerError::InvalidRoyalty {
                royalty_bps: draft.royalty_bps,
            });
        }
        let event_id = self.next_event_id;
        let next = event_id.next().ok_or(LedgerError::ArithmeticOverflow)?;

        let event = Event {
            id: event_id,
            organizer: caller.clone(),
            name: draft.name,
            description: draft.description,
            venue: draft.venue,
            metadata_locator: draft.metadata_locator,
            start_time: draft.start_time,
            end_time: draft.end_time,
            total_supply_cap: draft.total_supply_cap,
            allocated_supply: 0,
            royalty_bps: draft.royalty_bps,
            created_at: now,
        };
        let notification = LedgerNotification::EventCreated {
            event_id,
            organizer: caller.clone(),
            name: event.name.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            total_supply_cap: event.total_supply_cap,
            royalty_bps: event.royalty_bps,
        };

        self.events.insert(
            event_id,
            EventBook {
                event,
                ticket_types: Vec::new(),
                proceeds: Amount::ZERO,
            },
        );
        self.next_event_id = next;
        tracing::info!(%event_id, organizer = %caller, "Event created");

        Ok(Transition::new(event_id).notify(notification))
    }

    /// Adds a ticket type to an event
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownEvent`] / [`LedgerError::NotOrganizer`]
    /// - [`LedgerError::ZeroPrice`] / [`LedgerError::ZeroSupply`]
    /// - [`LedgerError::EventEnded`] once `now` is past the end time
    /// - [`LedgerError::SupplyExceedsCap`] if supplies would exceed the cap
    pub fn add_ticket_type(
        &mut self,
        caller: &Identity,
        event_id: EventId,
        name: String,
        price: Amount,
        supply: u32,
        now: DateTime<Utc>,
    ) -> Result<Transition<TicketTypeId, LedgerNotification>, LedgerError> {
        let book = self.organized_by(caller, event_id)?;
        if price.is_zero() {
            return Err(LedgerError::ZeroPrice);
        }
        if supply == 0 {
            return Err(LedgerError::ZeroSupply);
        }
        if book.event.has_ended(now) {
            return Err(LedgerError::EventEnded { event_id });
        }
        let remaining = book.event.unallocated_supply();
        if supply > remaining {
            return Err(LedgerError::SupplyExceedsCap {
                event_id,
                requested: supply,
                remaining,
            });
        }
        let ticket_type_id = u32::try_from(book.ticket_types.len())
            .map(TicketTypeId::new)
            .map_err(|_| LedgerError::ArithmeticOverflow)?;
        // supply <= remaining == cap - allocated, so the sum stays within the cap
        let allocated = book.event.allocated_supply.saturating_add(supply);

        let book = self.book_mut(event_id)?;
        book.event.allocated_supply = allocated;
        book.ticket_types.push(TicketType {
            event_id,
            id: ticket_type_id,
            name: name.clone(),
            price,
            supply,
            sold: 0,
        });

        Ok(
            Transition::new(ticket_type_id).notify(LedgerNotification::TicketTypeAdded {
                event_id,
                ticket_type_id,
                name,
                price,
                supply,
            }),
        )
    }

    /// Sells `quantity` credentials of one ticket type to `caller`.
    ///
    /// Debits the payment from the buyer, mints one credential per ticket
    /// through the registry and credits the event's proceeds. Returns the
    /// new token ids in mint order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownEvent`] / [`LedgerError::UnknownTicketType`]
    /// - [`LedgerError::ZeroQuantity`]
    /// - [`LedgerError::EventNotStarted`] / [`LedgerError::EventEnded`]
    /// - [`LedgerError::SoldOut`] if fewer than `quantity` remain
    /// - [`LedgerError::IncorrectPayment`] unless payment is exactly
    ///   price times quantity
    /// - [`LedgerError::InsufficientBalance`] if the buyer cannot pay
    /// - [`LedgerError::NotAuthority`] if the catalog cannot mint yet
    pub fn purchase_ticket(
        &mut self,
        caller: &Identity,
        order: PurchaseOrder,
        registry: &mut CredentialRegistry,
        book: &mut ValueBook,
        now: DateTime<Utc>,
    ) -> Result<Transition<Vec<TokenId>, LedgerNotification>, LedgerError> {
        let PurchaseOrder {
            event_id,
            ticket_type_id,
            quantity,
            payment,
            origin_domain,
        } = order;

        let event_book = self.require(event_id)?;
        let ticket_type = event_book
            .ticket_types
            .get(ticket_type_id.value() as usize)
            .ok_or(LedgerError::UnknownTicketType {
                event_id,
                ticket_type_id,
            })?;
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        if event_book.event.has_not_started(now) {
            return Err(LedgerError::EventNotStarted { event_id });
        }
        if event_book.event.has_ended(now) {
            return Err(LedgerError::EventEnded { event_id });
        }
        let remaining = ticket_type.remaining();
        if quantity > remaining {
            return Err(LedgerError::SoldOut {
                event_id,
                ticket_type_id,
                requested: quantity,
                remaining,
            });
        }
        let due = ticket_type
            .price
            .checked_mul(u64::from(quantity))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if payment != due {
            return Err(LedgerError::IncorrectPayment {
                expected: due,
                attached: payment,
            });
        }
        book.check_debit(caller, payment)?;
        registry.check_mint(&self.identity, quantity)?;
        let proceeds = event_book
            .proceeds
            .checked_add(payment)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let unit_price = ticket_type.price;
        let sold = ticket_type.sold.saturating_add(quantity);
        let metadata_locator = event_book.event.metadata_locator.clone();

        // check_debit and check_mint above make the `?` paths below unreachable.
        book.debit(caller, payment)?;
        let event_book = self.book_mut(event_id)?;
        event_book.proceeds = proceeds;
        if let Some(ticket_type) = event_book
            .ticket_types
            .get_mut(ticket_type_id.value() as usize)
        {
            ticket_type.sold = sold;
        }

        let mut transition = Transition::new(Vec::with_capacity(quantity as usize));
        for _ in 0..quantity {
            let minted = registry.mint(
                &self.identity,
                MintRequest {
                    event_id,
                    ticket_type_id,
                    owner: caller.clone(),
                    purchase_price: unit_price,
                    origin_domain: origin_domain.clone(),
                    metadata_locator: metadata_locator.clone(),
                },
                now,
            )?;
            transition.receipt.push(minted.receipt);
            transition.effects.extend(minted.effects);
        }

        tracing::info!(
            %event_id,
            %ticket_type_id,
            buyer = %caller,
            quantity,
            %payment,
            "Tickets purchased"
        );
        let token_ids = transition.receipt.clone();
        Ok(transition.notify(LedgerNotification::TicketsPurchased {
            event_id,
            ticket_type_id,
            buyer: caller.clone(),
            token_ids,
            total_paid: payment,
        }))
    }

    /// Consumes a credential at the door
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownEvent`] / [`LedgerError::NotOrganizer`]
    /// - [`LedgerError::UnknownCredential`]
    /// - [`LedgerError::EventMismatch`] for a credential of another event
    /// - [`LedgerError::AlreadyUsed`] on a second validation
    pub fn validate_ticket(
        &self,
        caller: &Identity,
        event_id: EventId,
        token_id: TokenId,
        registry: &mut CredentialRegistry,
        now: DateTime<Utc>,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        self.organized_by(caller, event_id)?;
        let credential = registry
            .credential(token_id)
            .ok_or(LedgerError::UnknownCredential { token_id })?;
        if credential.event_id != event_id {
            return Err(LedgerError::EventMismatch {
                token_id,
                expected: event_id,
                actual: credential.event_id,
            });
        }

        registry.mark_used(caller, token_id, self, now)
    }

    /// Pays an event's proceeds out to `to`
    ///
    /// The proceeds are zeroed before `to` is credited.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownEvent`] / [`LedgerError::NotOrganizer`]
    /// - [`LedgerError::NothingToWithdraw`] when proceeds are zero
    pub fn withdraw_funds(
        &mut self,
        caller: &Identity,
        event_id: EventId,
        to: Identity,
        book: &mut ValueBook,
    ) -> Result<Transition<Amount, LedgerNotification>, LedgerError> {
        let amount = self.organized_by(caller, event_id)?.proceeds;
        if amount.is_zero() {
            return Err(LedgerError::NothingToWithdraw { event_id });
        }
        book.balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.book_mut(event_id)?.proceeds = Amount::ZERO;
        book.credit(&to, amount)?;
        tracing::info!(%event_id, %to, %amount, "Proceeds withdrawn");

        Ok(Transition::new(amount)
            .notify(LedgerNotification::FundsWithdrawn {
                event_id,
                to: to.clone(),
                amount,
            })
            .payout(Payout::new(to, amount, PayoutKind::Withdrawal)))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// The catalog's own identity
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// An event by id
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<&Event> {
        self.events.get(&event_id).map(|book| &book.event)
    }

    /// All events in id order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values().map(|book| &book.event)
    }

    /// Ticket types of an event in id order (empty for unknown events)
    #[must_use]
    pub fn ticket_types(&self, event_id: EventId) -> &[TicketType] {
        self.events
            .get(&event_id)
            .map_or(&[], |book| book.ticket_types.as_slice())
    }

    /// One ticket type
    #[must_use]
    pub fn ticket_type(&self, event_id: EventId, ticket_type_id: TicketTypeId) -> Option<&TicketType> {
        self.ticket_types(event_id)
            .get(ticket_type_id.value() as usize)
    }

    /// Undisbursed proceeds of an event
    #[must_use]
    pub fn withdrawable(&self, event_id: EventId) -> Option<Amount> {
        self.events.get(&event_id).map(|book| book.proceeds)
    }

    /// Sum of undisbursed proceeds over all events, `None` if it overflows
    #[must_use]
    pub fn total_proceeds(&self) -> Option<Amount> {
        self.events
            .values()
            .try_fold(Amount::ZERO, |sum, book| sum.checked_add(book.proceeds))
    }

    fn require(&self, event_id: EventId) -> Result<&EventBook, LedgerError> {
        self.events
            .get(&event_id)
            .ok_or(LedgerError::UnknownEvent { event_id })
    }

    fn book_mut(&mut self, event_id: EventId) -> Result<&mut EventBook, LedgerError> {
        self.events
            .get_mut(&event_id)
            .ok_or(LedgerError::UnknownEvent { event_id })
    }

    fn organized_by(&self, caller: &Identity, event_id: EventId) -> Result<&EventBook, LedgerError> {
        let book = self.require(event_id)?;
        if !book.event.is_organizer(caller) {
            return Err(LedgerError::NotOrganizer {
                event_id,
                caller: caller.clone(),
            });
        }
        Ok(book)
    }
}

impl EventDirectory for IssuanceCatalog {
    fn organizer_of(&self, event_id: EventId) -> Option<&Identity> {
        self.event(event_id).map(|event| &event.organizer)
    }

    fn royalty_bps_of(&self, event_id: EventId) -> Option<u16> {
        self.event(event_id).map(|event| event.royalty_bps)
    }
}
