//! Resale market.
//!
//! Holders list credentials at a fixed price; a buyer pays exactly that
//! price and the proceeds are split between the event organizer (royalty)
//! and the seller. The market moves credentials through the registry under
//! its own identity, so a holder must approve the market before listing.

use crate::aggregates::{CredentialRegistry, EventDirectory, ValueBook};
use crate::error::LedgerError;
use crate::notification::LedgerNotification;
use crate::types::{Listing, ListingClosure, ListingId, MAX_ROYALTY_BPS, Settlement, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnstile_core::{Amount, Identity, Payout, PayoutKind, Transition};

/// Splits a resale price into `(royalty, seller_amount)`.
///
/// `royalty = floor(price * royalty_bps / 10000)` and the seller receives
/// the rest, so the two parts always add up to `price`.
///
/// # Errors
///
/// [`LedgerError::InvalidRoyalty`] above 10 000 basis points.
pub fn royalty_split(price: Amount, royalty_bps: u16) -> Result<(Amount, Amount), LedgerError> {
    let invalid = LedgerError::InvalidRoyalty { royalty_bps };
    if royalty_bps > MAX_ROYALTY_BPS {
        return Err(invalid);
    }
    let royalty = price.basis_points(royalty_bps).ok_or(invalid)?;
    let seller_amount = price
        .checked_sub(royalty)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    Ok((royalty, seller_amount))
}

/// Listings and the active-listing index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResaleMarket {
    identity: Identity,
    next_listing_id: ListingId,
    listings: BTreeMap<ListingId, Listing>,
    active_by_token: BTreeMap<TokenId, ListingId>,
}

impl ResaleMarket {
    /// Creates an empty market acting as `identity`
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity,
            next_listing_id: ListingId::new(1),
            listings: BTreeMap::new(),
            active_by_token: BTreeMap::new(),
        }
    }

    /// Offers `caller`'s credential for resale at `price`
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownCredential`]
    /// - [`LedgerError::NotOwner`] unless `caller` holds the credential
    /// - [`LedgerError::CredentialUsed`] once validated
    /// - [`LedgerError::AlreadyListed`] while another listing is active
    /// - [`LedgerError::ZeroPrice`]
    /// - [`LedgerError::MarketNotApproved`] unless the market may move it
    pub fn list_ticket(
        &mut self,
        caller: &Identity,
        token_id: TokenId,
        price: Amount,
        registry: &CredentialRegistry,
        now: DateTime<Utc>,
    ) -> Result<Transition<ListingId, LedgerNotification>, LedgerError> {
        let credential = registry
            .credential(token_id)
            .ok_or(LedgerError::UnknownCredential { token_id })?;
        if &credential.current_owner != caller {
            return Err(LedgerError::NotOwner {
                token_id,
                caller: caller.clone(),
            });
        }
        if credential.used {
            return Err(LedgerError::CredentialUsed { token_id });
        }
        if let Some(listing_id) = self.active_listing_for(token_id) {
            return Err(LedgerError::AlreadyListed {
                token_id,
                listing_id,
            });
        }
        if price.is_zero() {
            return Err(LedgerError::ZeroPrice);
        }
        if !registry.is_approved_or_owner(&self.identity, token_id) {
            return Err(LedgerError::MarketNotApproved { token_id });
        }
        let listing_id = self.next_listing_id;
        let next = listing_id.next().ok_or(LedgerError::ArithmeticOverflow)?;

        self.listings.insert(
            listing_id,
            Listing {
                id: listing_id,
                token_id,
                seller: caller.clone(),
                price,
                active: true,
                created_at: now,
                closed: None,
            },
        );
        self.active_by_token.insert(token_id, listing_id);
        self.next_listing_id = next;
        tracing::debug!(%listing_id, %token_id, seller = %caller, %price, "Listing created");

        Ok(
            Transition::new(listing_id).notify(LedgerNotification::ListingCreated {
                listing_id,
                token_id,
                seller: caller.clone(),
                price,
            }),
        )
    }

    /// Settles a resale to `caller`.
    ///
    /// Every check runs before anything changes. The listing is closed
    /// first, then the buyer is debited, the organizer and seller are
    /// credited and the credential moves to the buyer.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownListing`] / [`LedgerError::ListingInactive`]
    /// - [`LedgerError::IncorrectPayment`] unless `payment` equals the price
    /// - [`LedgerError::SellerNoLongerOwner`]
    /// - [`LedgerError::CredentialUsed`] / [`LedgerError::NotApproved`] from
    ///   the registry's transfer rules
    /// - [`LedgerError::SelfPurchase`] when the seller buys
    /// - [`LedgerError::InsufficientBalance`] if the buyer cannot pay
    #[allow(clippy::too_many_arguments)]
    pub fn buy_ticket(
        &mut self,
        caller: &Identity,
        listing_id: ListingId,
        payment: Amount,
        registry: &mut CredentialRegistry,
        book: &mut ValueBook,
        directory: &dyn EventDirectory,
        now: DateTime<Utc>,
    ) -> Result<Transition<Settlement, LedgerNotification>, LedgerError> {
        let listing = self.require(listing_id)?;
        if !listing.active {
            return Err(LedgerError::ListingInactive { listing_id });
        }
        if payment != listing.price {
            return Err(LedgerError::IncorrectPayment {
                expected: listing.price,
                attached: payment,
            });
        }
        let token_id = listing.token_id;
        if registry.owner_of(token_id) != Some(&listing.seller) {
            return Err(LedgerError::SellerNoLongerOwner { listing_id });
        }
        let credential = registry.check_transfer(&self.identity, token_id, &listing.seller)?;
        if caller == &listing.seller {
            return Err(LedgerError::SelfPurchase {
                listing_id,
                caller: caller.clone(),
            });
        }
        let event_id = credential.event_id;
        let (organizer, royalty_bps) = directory
            .organizer_of(event_id)
            .zip(directory.royalty_bps_of(event_id))
            .ok_or(LedgerError::UnknownEvent { event_id })?;
        let organizer = organizer.clone();
        let (royalty, seller_amount) = royalty_split(listing.price, royalty_bps)?;
        book.check_debit(caller, payment)?;

        let seller = listing.seller.clone();
        let price = listing.price;

        // All rules hold; the listing closes before any value moves.
        self.close(listing_id, ListingClosure::Sold, now);
        book.debit(caller, payment)?;
        book.credit(&organizer, royalty)?;
        book.credit(&seller, seller_amount)?;
        let transferred = registry.transfer(&self.identity, token_id, &seller, caller.clone())?;

        tracing::info!(
            %listing_id,
            %token_id,
            %seller,
            buyer = %caller,
            %price,
            %royalty,
            "Listing purchased"
        );

        let settlement = Settlement {
            listing_id,
            token_id,
            price,
            royalty,
            seller_amount,
        };
        let mut transition = Transition::with_effects(settlement, transferred.effects).notify(
            LedgerNotification::ListingPurchased {
                listing_id,
                token_id,
                seller: seller.clone(),
                buyer: caller.clone(),
                price,
                organizer: organizer.clone(),
                royalty,
                seller_amount,
            },
        );
        if !royalty.is_zero() {
            transition = transition.payout(Payout::new(organizer, royalty, PayoutKind::Royalty));
        }
        if !seller_amount.is_zero() {
            transition =
                transition.payout(Payout::new(seller, seller_amount, PayoutKind::SaleProceeds));
        }
        Ok(transition)
    }

    /// Withdraws an active listing. No value moves.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownListing`]
    /// - [`LedgerError::NotSeller`] unless `caller` created the listing
    /// - [`LedgerError::ListingInactive`] once bought or canceled
    pub fn cancel_listing(
        &mut self,
        caller: &Identity,
        listing_id: ListingId,
        now: DateTime<Utc>,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        let listing = self.require(listing_id)?;
        if &listing.seller != caller {
            return Err(LedgerError::NotSeller {
                listing_id,
                caller: caller.clone(),
            });
        }
        if !listing.active {
            return Err(LedgerError::ListingInactive { listing_id });
        }
        let token_id = listing.token_id;

        self.close(listing_id, ListingClosure::Canceled, now);

        Ok(
            Transition::new(()).notify(LedgerNotification::ListingCanceled {
                listing_id,
                token_id,
                seller: caller.clone(),
                reason: ListingClosure::Canceled,
            }),
        )
    }

    /// Closes the active listing of a credential its seller no longer holds.
    ///
    /// Returns the cancellation notice, or `None` if there was nothing to
    /// close.
    pub fn retire_stale_listing(
        &mut self,
        token_id: TokenId,
        new_owner: &Identity,
        now: DateTime<Utc>,
    ) -> Option<LedgerNotification> {
        let listing_id = self.active_listing_for(token_id)?;
        let seller = self.listings.get(&listing_id)?.seller.clone();
        if &seller == new_owner {
            return None;
        }
        self.close(listing_id, ListingClosure::OwnershipChanged, now);
        tracing::debug!(%listing_id, %token_id, "Stale listing retired");
        Some(LedgerNotification::ListingCanceled {
            listing_id,
            token_id,
            seller,
            reason: ListingClosure::OwnershipChanged,
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// The market's own identity
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// A listing by id, active or not
    #[must_use]
    pub fn listing(&self, listing_id: ListingId) -> Option<&Listing> {
        self.listings.get(&listing_id)
    }

    /// The active listing of a credential, if any
    #[must_use]
    pub fn active_listing_for(&self, token_id: TokenId) -> Option<ListingId> {
        self.active_by_token.get(&token_id).copied()
    }

    /// Active listings in id order
    pub fn active_listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values().filter(|listing| listing.active)
    }

    fn require(&self, listing_id: ListingId) -> Result<&Listing, LedgerError> {
        self.listings
            .get(&listing_id)
            .ok_or(LedgerError::UnknownListing { listing_id })
    }

    fn close(&mut self, listing_id: ListingId, closure: ListingClosure, now: DateTime<Utc>) {
        if let Some(listing) = self.listings.get_mut(&listing_id) {
            listing.active = false;
            listing.closed = Some((closure, now));
            self.active_by_token.remove(&listing.token_id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EventId, MintRequest, OriginDomain, TicketTypeId};
    use proptest::prelude::*;
    use turnstile_testing::properties::royalty_bps;
    use turnstile_testing::test_epoch;

    /// Directory with event 1 organized by "org" at a fixed royalty
    struct Royalty {
        organizer: Identity,
        bps: u16,
    }

    impl EventDirectory for Royalty {
        fn organizer_of(&self, event_id: EventId) -> Option<&Identity> {
            (event_id == EventId::new(1)).then_some(&self.organizer)
        }

        fn royalty_bps_of(&self, event_id: EventId) -> Option<u16> {
            (event_id == EventId::new(1)).then_some(self.bps)
        }
    }

    fn id(name: &str) -> Identity {
        Identity::new(name)
    }

    struct Fixture {
        market: ResaleMarket,
        registry: CredentialRegistry,
        book: ValueBook,
        directory: Royalty,
    }

    /// alice holds token 1 and has approved the market; bob has 1 000
    fn fixture() -> Fixture {
        let mut registry = CredentialRegistry::new(id("registry"), id("catalog"));
        registry
            .mint(
                &id("catalog"),
                MintRequest {
                    event_id: EventId::new(1),
                    ticket_type_id: TicketTypeId::new(0),
                    owner: id("alice"),
                    purchase_price: Amount::new(100),
                    origin_domain: OriginDomain::default(),
                    metadata_locator: String::new(),
                },
                test_epoch(),
            )
            .unwrap();
        registry.set_approval_for_all(&id("alice"), id("market"), true);
        let mut book = ValueBook::new();
        book.deposit(id("bob"), Amount::new(1_000)).unwrap();

        Fixture {
            market: ResaleMarket::new(id("market")),
            registry,
            book,
            directory: Royalty {
                organizer: id("org"),
                bps: 1_000,
            },
        }
    }

    impl Fixture {
        fn list(&mut self, who: &str, price: u64) -> Result<ListingId, LedgerError> {
            self.market
                .list_ticket(&id(who), TokenId::new(1), Amount::new(price), &self.registry, test_epoch())
                .map(|transition| transition.receipt)
        }

        fn buy(
            &mut self,
            who: &str,
            listing_id: ListingId,
            payment: u64,
        ) -> Result<Transition<Settlement, LedgerNotification>, LedgerError> {
            self.market.buy_ticket(
                &id(who),
                listing_id,
                Amount::new(payment),
                &mut self.registry,
                &mut self.book,
                &self.directory,
                test_epoch(),
            )
        }
    }

    #[test]
    fn split_follows_the_floor_rule() {
        assert_eq!(
            royalty_split(Amount::new(200), 1_000).unwrap(),
            (Amount::new(20), Amount::new(180))
        );
        assert_eq!(
            royalty_split(Amount::new(9), 1_500).unwrap(),
            (Amount::new(1), Amount::new(8))
        );
        assert_eq!(
            royalty_split(Amount::new(7), 10_000).unwrap(),
            (Amount::new(7), Amount::ZERO)
        );
        assert!(royalty_split(Amount::new(7), 10_001).is_err());
    }

    proptest! {
        #[test]
        fn split_always_adds_up(price in any::<u64>(), bps in royalty_bps()) {
            let (royalty, seller_amount) = royalty_split(Amount::new(price), bps).unwrap();
            prop_assert_eq!(royalty.checked_add(seller_amount), Some(Amount::new(price)));
            let expected = u128::from(price) * u128::from(bps) / 10_000;
            prop_assert_eq!(u128::from(royalty.units()), expected);
        }
    }

    #[test]
    fn resale_splits_value_and_moves_ownership() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();
        let transition = f.buy("bob", listing_id, 200).unwrap();

        assert_eq!(transition.receipt.royalty, Amount::new(20));
        assert_eq!(transition.receipt.seller_amount, Amount::new(180));
        assert_eq!(transition.payouts().count(), 2);
        assert_eq!(f.book.balance_of(&id("org")), Amount::new(20));
        assert_eq!(f.book.balance_of(&id("alice")), Amount::new(180));
        assert_eq!(f.book.balance_of(&id("bob")), Amount::new(800));
        assert_eq!(f.registry.owner_of(TokenId::new(1)), Some(&id("bob")));

        let listing = f.market.listing(listing_id).unwrap();
        assert!(!listing.active);
        assert_eq!(listing.closed, Some((ListingClosure::Sold, test_epoch())));
        assert_eq!(f.market.active_listing_for(TokenId::new(1)), None);
    }

    #[test]
    fn listing_requires_market_approval() {
        let mut f = fixture();
        f.registry.set_approval_for_all(&id("alice"), id("market"), false);
        assert_eq!(
            f.list("alice", 200).unwrap_err(),
            LedgerError::MarketNotApproved { token_id: TokenId::new(1) }
        );

        f.registry
            .approve(&id("alice"), TokenId::new(1), Some(id("market")))
            .unwrap();
        assert!(f.list("alice", 200).is_ok());
    }

    #[test]
    fn listing_rejections() {
        let mut f = fixture();
        assert!(matches!(f.list("bob", 200).unwrap_err(), LedgerError::NotOwner { .. }));
        assert_eq!(f.list("alice", 0).unwrap_err(), LedgerError::ZeroPrice);

        let listing_id = f.list("alice", 200).unwrap();
        assert_eq!(
            f.list("alice", 300).unwrap_err(),
            LedgerError::AlreadyListed {
                token_id: TokenId::new(1),
                listing_id,
            }
        );
        let err = f
            .market
            .list_ticket(&id("alice"), TokenId::new(5), Amount::new(1), &f.registry, test_epoch())
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownCredential { token_id: TokenId::new(5) });
    }

    #[test]
    fn buy_rejections_move_nothing() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();
        let snapshot = (f.market.clone(), f.registry.clone(), f.book.clone());

        assert_eq!(
            f.buy("bob", listing_id, 199).unwrap_err(),
            LedgerError::IncorrectPayment {
                expected: Amount::new(200),
                attached: Amount::new(199),
            }
        );
        assert!(matches!(
            f.buy("alice", listing_id, 200).unwrap_err(),
            LedgerError::SelfPurchase { .. }
        ));
        assert!(matches!(
            f.buy("carol", listing_id, 200).unwrap_err(),
            LedgerError::InsufficientBalance { .. }
        ));
        assert_eq!(
            f.buy("bob", ListingId::new(42), 200).unwrap_err(),
            LedgerError::UnknownListing { listing_id: ListingId::new(42) }
        );

        assert_eq!(snapshot, (f.market.clone(), f.registry.clone(), f.book.clone()));
    }

    #[test]
    fn seller_who_gave_the_credential_away_cannot_sell() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();
        f.registry
            .transfer(&id("alice"), TokenId::new(1), &id("alice"), id("carol"))
            .unwrap();

        assert_eq!(
            f.buy("bob", listing_id, 200).unwrap_err(),
            LedgerError::SellerNoLongerOwner { listing_id }
        );
    }

    #[test]
    fn revoked_approval_blocks_the_sale() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();
        f.registry.set_approval_for_all(&id("alice"), id("market"), false);

        assert!(matches!(
            f.buy("bob", listing_id, 200).unwrap_err(),
            LedgerError::NotApproved { .. }
        ));
    }

    #[test]
    fn validated_credential_cannot_be_bought() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();
        let directory = Royalty {
            organizer: id("org"),
            bps: 1_000,
        };
        f.registry
            .mark_used(&id("org"), TokenId::new(1), &directory, test_epoch())
            .unwrap();

        assert_eq!(
            f.buy("bob", listing_id, 200).unwrap_err(),
            LedgerError::CredentialUsed { token_id: TokenId::new(1) }
        );
        assert_eq!(f.registry.owner_of(TokenId::new(1)), Some(&id("alice")));
    }

    #[test]
    fn cancel_is_seller_only_and_final() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();

        assert!(matches!(
            f.market.cancel_listing(&id("bob"), listing_id, test_epoch()).unwrap_err(),
            LedgerError::NotSeller { .. }
        ));
        f.market
            .cancel_listing(&id("alice"), listing_id, test_epoch())
            .unwrap();
        assert_eq!(
            f.market
                .cancel_listing(&id("alice"), listing_id, test_epoch())
                .unwrap_err(),
            LedgerError::ListingInactive { listing_id }
        );
        assert_eq!(
            f.buy("bob", listing_id, 200).unwrap_err(),
            LedgerError::ListingInactive { listing_id }
        );
        assert_eq!(f.market.active_listings().count(), 0);

        // The credential can be listed again under a new id.
        assert_eq!(f.list("alice", 250).unwrap(), ListingId::new(2));
    }

    #[test]
    fn stale_listing_is_retired_for_a_new_owner_only() {
        let mut f = fixture();
        let listing_id = f.list("alice", 200).unwrap();

        assert_eq!(
            f.market
                .retire_stale_listing(TokenId::new(1), &id("alice"), test_epoch()),
            None
        );
        let notice = f
            .market
            .retire_stale_listing(TokenId::new(1), &id("carol"), test_epoch())
            .unwrap();
        assert!(matches!(
            notice,
            LedgerNotification::ListingCanceled {
                reason: ListingClosure::OwnershipChanged,
                ..
            }
        ));
        assert!(!f.market.listing(listing_id).unwrap().active);
    }
}
