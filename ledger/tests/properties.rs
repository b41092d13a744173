//! Property tests over random command sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use turnstile_core::{Amount, Identity, NoopPayoutHook, Reducer};
use turnstile_ledger::{
    ComponentIds, EventDraft, EventId, Ledger, LedgerCommand, LedgerConfig, LedgerEnvironment,
    LedgerReducer, LedgerState, ListingId, OriginDomain, TicketTypeId, TokenId,
};
use turnstile_testing::mocks::FixedClock;
use turnstile_testing::properties::{modest_amount, pooled_identity, royalty_bps};
use turnstile_testing::test_epoch;

const SUPPLY: u32 = 6;
const EVENT: EventId = EventId::new(1);
const TIER: TicketTypeId = TicketTypeId::new(0);

fn env() -> LedgerEnvironment {
    LedgerEnvironment::new(
        Arc::new(FixedClock::new(test_epoch())),
        Arc::new(NoopPayoutHook),
    )
}

fn organizer() -> Identity {
    Identity::new("organizer")
}

#[derive(Clone, Debug)]
enum Op {
    Deposit(Identity, Amount),
    Purchase(Identity, u32, bool),
    ApproveMarket(Identity, bool),
    List(Identity, u64, Amount),
    Buy(Identity, u64, bool),
    Cancel(Identity, u64),
    Gift(Identity, u64, Identity),
    Validate(u64),
    Withdraw,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (pooled_identity(), modest_amount()).prop_map(|(who, amount)| Op::Deposit(who, amount)),
        (pooled_identity(), 0u32..4, any::<bool>())
            .prop_map(|(who, quantity, exact)| Op::Purchase(who, quantity, exact)),
        (pooled_identity(), any::<bool>()).prop_map(|(who, on)| Op::ApproveMarket(who, on)),
        (pooled_identity(), 1u64..=8, modest_amount())
            .prop_map(|(who, token, price)| Op::List(who, token, price)),
        (pooled_identity(), 1u64..=8, any::<bool>())
            .prop_map(|(who, listing, exact)| Op::Buy(who, listing, exact)),
        (pooled_identity(), 1u64..=8).prop_map(|(who, listing)| Op::Cancel(who, listing)),
        (pooled_identity(), 1u64..=8, pooled_identity())
            .prop_map(|(from, token, to)| Op::Gift(from, token, to)),
        (1u64..=8).prop_map(Op::Validate),
        Just(Op::Withdraw),
    ]
}

fn opened_state(price: Amount, royalty: u16) -> LedgerState {
    let mut state = LedgerState::new(Identity::new("deployer"), ComponentIds::default());
    let setup = vec![
        LedgerCommand::SetMintAuthority {
            caller: Identity::new("deployer"),
            new_authority: Identity::new("catalog"),
        },
        LedgerCommand::CreateEvent {
            caller: organizer(),
            draft: EventDraft::new(
                "Property Show",
                test_epoch() - Duration::hours(1),
                test_epoch() + Duration::hours(1),
                SUPPLY,
                royalty,
            ),
        },
        LedgerCommand::AddTicketType {
            caller: organizer(),
            event_id: EVENT,
            name: "GA".to_string(),
            price,
            supply: SUPPLY,
        },
    ];
    for command in setup {
        LedgerReducer::new().reduce(&mut state, command, &env()).unwrap();
    }
    state
}

fn to_command(op: Op, state: &LedgerState, price: Amount) -> LedgerCommand {
    match op {
        Op::Deposit(account, amount) => LedgerCommand::Deposit { account, amount },
        Op::Purchase(caller, quantity, exact) => {
            let due = price.checked_mul(u64::from(quantity)).unwrap_or(Amount::ZERO);
            let payment = if exact { due } else { Amount::new(due.units() + 1) };
            LedgerCommand::PurchaseTicket {
                caller,
                event_id: EVENT,
                ticket_type_id: TIER,
                quantity,
                payment,
                origin_domain: OriginDomain::new("prop"),
            }
        }
        Op::ApproveMarket(caller, approved) => LedgerCommand::SetApprovalForAll {
            caller,
            operator: Identity::new("market"),
            approved,
        },
        Op::List(caller, token, asking) => LedgerCommand::ListTicket {
            caller,
            token_id: TokenId::new(token),
            price: asking,
        },
        Op::Buy(caller, listing, exact) => {
            let listing_id = ListingId::new(listing);
            let asked = state
                .market()
                .listing(listing_id)
                .map_or(Amount::new(1), |listing| listing.price);
            let payment = if exact { asked } else { Amount::new(asked.units() / 2) };
            LedgerCommand::BuyTicket {
                caller,
                listing_id,
                payment,
            }
        }
        Op::Cancel(caller, listing) => LedgerCommand::CancelListing {
            caller,
            listing_id: ListingId::new(listing),
        },
        Op::Gift(from, token, to) => LedgerCommand::TransferTicket {
            caller: from.clone(),
            token_id: TokenId::new(token),
            from,
            to,
        },
        Op::Validate(token) => LedgerCommand::ValidateTicket {
            caller: organizer(),
            event_id: EVENT,
            token_id: TokenId::new(token),
        },
        Op::Withdraw => LedgerCommand::WithdrawFunds {
            caller: organizer(),
            event_id: EVENT,
            to: organizer(),
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn random_operations_preserve_ledger_invariants(
        price in modest_amount(),
        royalty in royalty_bps(),
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut state = opened_state(price, royalty);
        let reducer = LedgerReducer::new();
        let mut frozen: BTreeMap<TokenId, Identity> = BTreeMap::new();

        for op in ops {
            let command = to_command(op, &state, price);
            let before = state.clone();
            if reducer.reduce(&mut state, command, &env()).is_err() {
                prop_assert_eq!(&state, &before);
            }

            prop_assert!(state.value_is_conserved());

            let tier = state.catalog().ticket_type(EVENT, TIER).unwrap();
            prop_assert!(tier.sold <= tier.supply);
            prop_assert_eq!(state.registry().minted(), tier.sold as usize);

            for credential in state.registry().credentials_for(EVENT) {
                if credential.used {
                    let owner = frozen
                        .entry(credential.token_id)
                        .or_insert_with(|| credential.current_owner.clone());
                    prop_assert_eq!(&credential.current_owner, owner);
                }
            }

            for listing in state.market().active_listings() {
                prop_assert_eq!(
                    state.registry().owner_of(listing.token_id),
                    Some(&listing.seller)
                );
            }
        }
    }

    #[test]
    fn primary_sales_never_oversell(quantities in prop::collection::vec(0u32..4, 1..12)) {
        tokio_test::block_on(async {
            let environment = LedgerEnvironment::new(
                Arc::new(FixedClock::new(test_epoch())),
                Arc::new(NoopPayoutHook),
            );
            let ledger = Ledger::bootstrap(&LedgerConfig::default(), environment)
                .await
                .unwrap();
            let draft = EventDraft::new(
                "Small Room",
                test_epoch() - Duration::hours(1),
                test_epoch() + Duration::hours(1),
                SUPPLY,
                0,
            );
            let event_id = ledger.create_event(&organizer(), draft).await.unwrap();
            let tier = ledger
                .add_ticket_type(&organizer(), event_id, "Seat", Amount::new(10), SUPPLY)
                .await
                .unwrap();
            let fan = Identity::new("fan");
            ledger.deposit(&fan, Amount::new(1_000)).await.unwrap();

            let mut expected_sold = 0u32;
            for quantity in quantities {
                let payment = Amount::new(10 * u64::from(quantity));
                let outcome = ledger
                    .purchase_ticket(&fan, event_id, tier, quantity, payment, OriginDomain::new("p"))
                    .await;
                if let Ok(tokens) = outcome {
                    expected_sold += quantity;
                    assert_eq!(tokens.len(), quantity as usize);
                }
                let sold = ledger.ticket_type(event_id, tier).await.unwrap().sold;
                assert_eq!(sold, expected_sold);
                assert!(sold <= SUPPLY);
            }
            assert_eq!(ledger.tokens_of(&fan).await.len(), expected_sold as usize);
            assert!(ledger.value_is_conserved().await);
        });
    }
}
