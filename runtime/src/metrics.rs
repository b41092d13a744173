//! Prometheus metrics for the Store runtime.
//!
//! Store-level series, labelled by command name:
//!
//! - `turnstile_commands_total{command, outcome}` - committed vs rejected
//! - `turnstile_command_duration_seconds{command}` - time inside `send`
//! - `turnstile_journal_entries_total` - notifications appended
//! - `turnstile_payouts_total{kind}` / `turnstile_payout_units_total{kind}`
//!
//! # Example
//!
//! ```rust,no_run
//! use turnstile_runtime::metrics::MetricsRecorder;
//!
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//! // ... run commands ...
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok::<(), turnstile_runtime::metrics::MetricsError>(())
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;
use turnstile_core::{Payout, PayoutKind};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders the scrape text.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test), this
    /// logs a warning and succeeds without a render handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this recorder was not the one installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all runtime metric descriptions.
fn register_metrics() {
    describe_counter!(
        "turnstile_commands_total",
        "Total number of commands by name and outcome (committed, rejected)"
    );
    describe_histogram!(
        "turnstile_command_duration_seconds",
        "Time taken to run a command, including post-commit effects"
    );
    describe_counter!(
        "turnstile_journal_entries_total",
        "Total number of notifications appended to the journal"
    );
    describe_counter!(
        "turnstile_payouts_total",
        "Total number of payouts handed to the payout hook by kind"
    );
    describe_counter!(
        "turnstile_payout_units_total",
        "Total value paid out in the ledger's smallest unit by kind"
    );
}

const fn kind_label(kind: PayoutKind) -> &'static str {
    match kind {
        PayoutKind::Withdrawal => "withdrawal",
        PayoutKind::Royalty => "royalty",
        PayoutKind::SaleProceeds => "sale_proceeds",
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a committed command.
    pub fn record_commit(command: &'static str, notifications: usize, duration: Duration) {
        counter!("turnstile_commands_total", "command" => command, "outcome" => "committed")
            .increment(1);
        counter!("turnstile_journal_entries_total").increment(notifications as u64);
        histogram!("turnstile_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a rejected command.
    pub fn record_rejection(command: &'static str, duration: Duration) {
        counter!("turnstile_commands_total", "command" => command, "outcome" => "rejected")
            .increment(1);
        histogram!("turnstile_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a payout handed to the hook.
    pub fn record_payout(payout: &Payout) {
        let kind = kind_label(payout.kind);
        counter!("turnstile_payouts_total", "kind" => kind).increment(1);
        counter!("turnstile_payout_units_total", "kind" => kind).increment(payout.amount.units());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use turnstile_core::{Amount, Identity};

    #[test]
    fn recorder_starts_uninstalled() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.handle().is_none());
        assert!(recorder.render().is_none());
    }

    #[test]
    fn recorder_renders_store_metrics() {
        let mut recorder = MetricsRecorder::new();
        recorder.install().unwrap();

        StoreMetrics::record_commit("purchase_ticket", 2, Duration::from_millis(1));
        StoreMetrics::record_payout(&Payout::new(
            Identity::new("organizer"),
            Amount::new(20),
            PayoutKind::Royalty,
        ));

        // Another test may have installed the global recorder first.
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("turnstile_commands_total"));
            assert!(rendered.contains("turnstile_payout_units_total"));
        }
    }
}
