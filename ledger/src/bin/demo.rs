//! Runs one primary sale and one royalty-bearing resale end to end, then
//! prints the audit journal and the metrics scrape.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_core::{Amount, Identity, Payout, PayoutHook, SystemClock};
use turnstile_ledger::metrics::register_ledger_metrics;
use turnstile_ledger::{EventDraft, Ledger, LedgerConfig, LedgerEnvironment, OriginDomain};
use turnstile_runtime::metrics::MetricsRecorder;

/// 0.1 of a whole unit, with 18 decimals
const TICKET_PRICE: u64 = 100_000_000_000_000_000;

/// Logs every payout instead of moving funds anywhere
struct LoggingPayoutHook;

#[async_trait]
impl PayoutHook for LoggingPayoutHook {
    async fn on_payout(&self, payout: &Payout) {
        info!(
            recipient = %payout.recipient,
            amount = %payout.amount,
            kind = ?payout.kind,
            "Payout released"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("invalid ledger configuration")?;
    info!(?config, "Configuration loaded");

    let mut recorder = MetricsRecorder::new();
    recorder.install().context("installing metrics recorder")?;
    register_ledger_metrics();

    let environment = LedgerEnvironment::new(Arc::new(SystemClock), Arc::new(LoggingPayoutHook));
    let ledger = Ledger::bootstrap(&config, environment).await?;

    let organizer = Identity::new("organizer");
    let buyer1 = Identity::new("buyer1");
    let buyer2 = Identity::new("buyer2");
    let price = Amount::new(TICKET_PRICE);
    let resale_price = Amount::new(TICKET_PRICE * 2);

    ledger.deposit(&buyer1, price).await?;
    ledger.deposit(&buyer2, resale_price).await?;

    let now = Utc::now();
    let draft = EventDraft::new(
        "Rust Conf",
        now - Duration::hours(1),
        now + Duration::days(30),
        500,
        1_000,
    )
    .with_venue("Main Hall")
    .with_metadata_locator("ipfs://rust-conf");
    let event_id = ledger.create_event(&organizer, draft).await?;
    let general = ledger
        .add_ticket_type(&organizer, event_id, "General", price, 100)
        .await?;

    let tokens = ledger
        .purchase_ticket(
            &buyer1,
            event_id,
            general,
            1,
            price,
            OriginDomain::new("tickets.example"),
        )
        .await?;
    let token_id = *tokens.first().context("purchase minted no credential")?;
    info!(%token_id, "Primary sale complete");

    ledger
        .set_approval_for_all(&buyer1, ledger.market_identity().clone(), true)
        .await?;
    let listing_id = ledger.list_ticket(&buyer1, token_id, resale_price).await?;
    let settlement = ledger.buy_ticket(&buyer2, listing_id, resale_price).await?;
    info!(
        royalty = %settlement.royalty,
        seller_amount = %settlement.seller_amount,
        "Resale settled"
    );

    let withdrawn = ledger
        .withdraw_funds(&organizer, event_id, organizer.clone())
        .await?;
    info!(%withdrawn, "Primary proceeds withdrawn");

    info!(
        organizer = %ledger.balance_of(&organizer).await,
        buyer1 = %ledger.balance_of(&buyer1).await,
        buyer2 = %ledger.balance_of(&buyer2).await,
        conserved = ledger.value_is_conserved().await,
        "Final balances"
    );

    println!("{}", ledger.journal_json_lines().await?);
    if let Some(scrape) = recorder.render() {
        println!("{scrape}");
    }

    ledger.shutdown(config.shutdown_timeout).await?;
    Ok(())
}
