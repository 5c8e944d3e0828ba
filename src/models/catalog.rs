//! Catalog documents as checkout sees them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::entities::commerce::cart_line::Model as CartLine;
pub use crate::entities::commerce::product::Model as Product;
pub use crate::entities::commerce::product_variant::Model as Variant;
pub use crate::entities::commerce::ProductStatus;

/// A product together with all of its variants, loaded in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product: Product,
    pub variants: Vec<Variant>,
}

impl CatalogEntry {
    pub fn new(product: Product, variants: Vec<Variant>) -> Self {
        Self { product, variants }
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

/// Stock document returned by a successful conditional write, after the write applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub stock: i32,
}
