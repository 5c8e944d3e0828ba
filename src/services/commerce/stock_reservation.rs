/*!
 * Stock reservation
 *
 * Each line is reserved with one conditional decrement; there are no locks
 * and no cached stock. Lines are reserved in cart order and the first line
 * that cannot be satisfied stops the attempt.
 */

use metrics::counter;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::cart_snapshot::QuotedLine;
use crate::db::TransactionContext;
use crate::errors::{CheckoutError, StrandedReservation};
use crate::repositories::CatalogStore;

/// A decrement that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub remaining_stock: i32,
}

/// Reserves every line, appending each applied decrement to `reserved`.
///
/// On failure `reserved` still lists what was applied before the failing
/// line, so degraded callers can report it.
#[instrument(skip_all, fields(lines = lines.len()))]
pub async fn reserve_lines<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    lines: &[QuotedLine],
    reserved: &mut Vec<Reservation>,
) -> Result<(), CheckoutError>
where
    S: CatalogStore + ?Sized,
{
    for line in lines {
        let variant_id = line.quote.resolved_variant_id;
        let record = storage
            .conditional_decrement(ctx, line.product_id, variant_id, line.quantity)
            .await?;

        match record {
            Some(record) => {
                debug!(
                    product_id = %line.product_id,
                    ?variant_id,
                    quantity = line.quantity,
                    remaining = record.stock,
                    "Reserved line"
                );
                reserved.push(Reservation {
                    product_id: line.product_id,
                    variant_id,
                    quantity: line.quantity,
                    remaining_stock: record.stock,
                });
            }
            None => {
                counter!("stateset_checkout.insufficient_stock", 1);
                return Err(CheckoutError::InsufficientStock {
                    product_title: line.quote.title.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Wraps a degraded-mode failure with the reservations it left applied.
pub fn strand(cause: CheckoutError, reserved: &[Reservation]) -> CheckoutError {
    let stranded: Vec<StrandedReservation> = reserved
        .iter()
        .map(|r| StrandedReservation {
            product_id: r.product_id,
            variant_id: r.variant_id,
            quantity: r.quantity,
        })
        .collect();

    for line in &stranded {
        warn!(
            category = "inventory_drift",
            product_id = %line.product_id,
            variant_id = ?line.variant_id,
            quantity = line.quantity,
            cause = %cause,
            "Reservation left applied after failed degraded checkout"
        );
    }
    counter!("stateset_checkout.inventory_drift", stranded.len() as u64);

    CheckoutError::StrandedReservations {
        cause: Box::new(cause),
        stranded,
    }
}
