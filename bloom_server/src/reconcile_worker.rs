use bloom_engine::{CheckoutApi, OrderManagement, PaymentProvider, SqliteDatabase};
use chrono::{Duration, Utc};
use log::*;
use tokio::task::JoinHandle;

use crate::integrations::stripe::StripeGateway;

/// Starts the reconcile worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, card orders that have been waiting for payment for longer than `stale_after` are checked against
/// the provider. This catches orders whose webhook was lost. When the gateway is not initialized, the sweep is skipped.
pub fn start_reconcile_worker(
    api: CheckoutApi<SqliteDatabase, StripeGateway>,
    interval: std::time::Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Payment reconcile worker started");
        loop {
            timer.tick().await;
            run_reconcile_sweep(&api, stale_after).await;
        }
    })
}

pub async fn run_reconcile_sweep<B, P>(api: &CheckoutApi<B, P>, stale_after: Duration)
where
    B: OrderManagement,
    P: PaymentProvider,
{
    if !api.provider().is_initialized() {
        debug!("🕰️ Payment gateway is not initialized. Skipping the reconcile sweep.");
        return;
    }
    trace!("🕰️ Running payment reconcile sweep");
    match api.reconcile_stale_orders(Utc::now() - stale_after).await {
        Ok(summary) if summary.checked > 0 => {
            info!(
                "🕰️ Checked {} stale orders: {} paid, {} failed, {} unchanged",
                summary.checked, summary.paid, summary.failed, summary.unchanged
            );
        },
        Ok(_) => trace!("🕰️ No stale orders"),
        Err(e) => error!("🕰️ Error running the payment reconcile sweep: {e}"),
    }
}
