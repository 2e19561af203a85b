//! Payment reconciliation.
//!
//! An orphaned payment is a captured payment intent whose order insert
//! failed. Each one needs a manual refund or a manual order.

use threadline_storefront::db::Stores;

use super::{CommandError, connect};

/// Print every orphaned payment, newest first.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn orphans() -> Result<(), CommandError> {
    let pool = connect().await?;
    let orphans = Stores::postgres(&pool).orders.orphaned_payments().await?;

    if orphans.is_empty() {
        tracing::info!("No orphaned payments");
        return Ok(());
    }

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{:<32} {:>12} {:<32} {:<25} ERROR",
            "PAYMENT INTENT", "AMOUNT", "EMAIL", "CAPTURED"
        );
        for orphan in &orphans {
            println!(
                "{:<32} {:>12} {:<32} {:<25} {}",
                orphan.payment_intent_id,
                orphan.amount.to_string(),
                orphan.email.as_deref().unwrap_or("-"),
                orphan.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                orphan.error,
            );
        }
    }

    tracing::warn!(count = orphans.len(), "Orphaned payments need manual reconciliation");
    Ok(())
}
