pub mod catalog;
pub mod order;

pub use catalog::{CartLine, CatalogEntry, Product, ProductStatus, StockRecord, Variant};
pub use order::{Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, ShippingContact};
