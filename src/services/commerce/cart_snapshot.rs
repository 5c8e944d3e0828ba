use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::pricing_service::{line_amount, resolve_price, PriceQuote};
use crate::db::TransactionContext;
use crate::errors::{CheckoutError, SelectionError};
use crate::models::{CartLine, CatalogEntry};
use crate::repositories::{CartStore, CatalogStore};

/// A cart line with the catalog entry it refers to.
#[derive(Debug, Clone)]
pub struct SnapshotLine {
    pub line: CartLine,
    pub entry: CatalogEntry,
}

/// Read-only view of a cart at one point in time, in cart order.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    pub user_id: Uuid,
    pub lines: Vec<SnapshotLine>,
}

/// A cart line priced against the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub quote: PriceQuote,
}

impl QuotedLine {
    pub fn line_amount(&self) -> Decimal {
        line_amount(self.quote.unit_price, self.quantity)
    }
}

impl CartSnapshot {
    /// Prices every line. The first invalid selection fails the whole cart.
    pub fn quote(&self) -> Result<Vec<QuotedLine>, CheckoutError> {
        self.lines
            .iter()
            .map(|snapshot| {
                if snapshot.line.quantity < 1 {
                    return Err(CheckoutError::InvalidSelection {
                        product_id: snapshot.line.product_id,
                        reason: SelectionError::InvalidQuantity(snapshot.line.quantity),
                    });
                }
                let quote = resolve_price(&snapshot.entry, snapshot.line.variant_id).map_err(
                    |reason| CheckoutError::InvalidSelection {
                        product_id: snapshot.line.product_id,
                        reason,
                    },
                )?;
                Ok(QuotedLine {
                    product_id: snapshot.line.product_id,
                    quantity: snapshot.line.quantity,
                    quote,
                })
            })
            .collect()
    }
}

pub fn subtotal(lines: &[QuotedLine]) -> Decimal {
    lines.iter().map(QuotedLine::line_amount).sum()
}

/// Loads the user's cart and, in one batch, every product it references.
#[instrument(skip(storage, ctx))]
pub async fn read_snapshot<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    user_id: Uuid,
) -> Result<CartSnapshot, CheckoutError>
where
    S: CartStore + CatalogStore + ?Sized,
{
    let cart_lines = storage.list_lines(ctx, user_id).await?;
    if cart_lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let product_ids = distinct_products(cart_lines.iter().map(|line| line.product_id));
    let entries = load_entries(storage, ctx, &product_ids).await?;
    debug!(
        lines = cart_lines.len(),
        products = entries.len(),
        "Loaded cart snapshot"
    );

    let mut lines = Vec::with_capacity(cart_lines.len());
    for line in cart_lines {
        let entry = match entries.get(&line.product_id) {
            Some(entry) if entry.product.status.is_active() => entry.clone(),
            _ => {
                return Err(CheckoutError::ProductUnavailable {
                    product_id: line.product_id,
                })
            }
        };
        lines.push(SnapshotLine { line, entry });
    }

    Ok(CartSnapshot { user_id, lines })
}

/// Prices `lines` again against the catalog as seen through `ctx`, keeping
/// each line's resolved selection and quantity.
#[instrument(skip_all, fields(lines = lines.len()))]
pub async fn requote<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    lines: &[QuotedLine],
) -> Result<Vec<QuotedLine>, CheckoutError>
where
    S: CatalogStore + ?Sized,
{
    let product_ids = distinct_products(lines.iter().map(|line| line.product_id));
    let entries = load_entries(storage, ctx, &product_ids).await?;

    lines
        .iter()
        .map(|line| {
            let entry = entries
                .get(&line.product_id)
                .filter(|entry| entry.product.status.is_active())
                .ok_or(CheckoutError::ProductUnavailable {
                    product_id: line.product_id,
                })?;
            let quote = resolve_price(entry, line.quote.resolved_variant_id).map_err(|reason| {
                CheckoutError::InvalidSelection {
                    product_id: line.product_id,
                    reason,
                }
            })?;
            Ok(QuotedLine {
                product_id: line.product_id,
                quantity: line.quantity,
                quote,
            })
        })
        .collect()
}

fn distinct_products(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut product_ids: Vec<Uuid> = Vec::new();
    for id in ids {
        if !product_ids.contains(&id) {
            product_ids.push(id);
        }
    }
    product_ids
}

async fn load_entries<S>(
    storage: &S,
    ctx: &mut TransactionContext<'_, S::Session>,
    product_ids: &[Uuid],
) -> Result<HashMap<Uuid, CatalogEntry>, CheckoutError>
where
    S: CatalogStore + ?Sized,
{
    Ok(storage
        .find_products(ctx, product_ids)
        .await?
        .into_iter()
        .map(|entry| (entry.product.id, entry))
        .collect())
}
