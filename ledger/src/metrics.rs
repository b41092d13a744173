//! Business metrics for the credential ledger.
//!
//! Store-level series (commands, durations, payouts) are recorded by the
//! runtime. This module adds what only the ledger knows:
//!
//! - `turnstile_tickets_sold_total` - credentials minted by primary sales
//! - `turnstile_primary_revenue_units_total` - value paid in primary sales
//! - `turnstile_resales_total` - settled resale listings
//! - `turnstile_royalties_paid_total` - royalty value credited to organizers
//! - `turnstile_credentials_validated_total` - credentials consumed at the door

use metrics::describe_counter;
use turnstile_core::Amount;

/// Describe every ledger metric. Call once at startup.
pub fn register_ledger_metrics() {
    describe_counter!(
        "turnstile_tickets_sold_total",
        "Total number of credentials minted by primary sales"
    );
    describe_counter!(
        "turnstile_primary_revenue_units_total",
        "Total value paid in primary sales, in the ledger's smallest unit"
    );
    describe_counter!("turnstile_resales_total", "Total number of settled resales");
    describe_counter!(
        "turnstile_royalties_paid_total",
        "Total royalty value credited to organizers, in the ledger's smallest unit"
    );
    describe_counter!(
        "turnstile_credentials_validated_total",
        "Total number of credentials validated"
    );

    tracing::info!("Ledger metrics registered");
}

/// Record a primary sale.
pub fn record_tickets_sold(quantity: usize, paid: Amount) {
    metrics::counter!("turnstile_tickets_sold_total").increment(quantity as u64);
    metrics::counter!("turnstile_primary_revenue_units_total").increment(paid.units());
    tracing::debug!(quantity, %paid, "Recorded tickets_sold metric");
}

/// Record a settled resale.
pub fn record_resale(royalty: Amount) {
    metrics::counter!("turnstile_resales_total").increment(1);
    metrics::counter!("turnstile_royalties_paid_total").increment(royalty.units());
    tracing::debug!(%royalty, "Recorded resale metric");
}

/// Record a validation.
pub fn record_validation() {
    metrics::counter!("turnstile_credentials_validated_total").increment(1);
}
