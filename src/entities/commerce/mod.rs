/// Commerce entities module
pub mod cart_line;
pub mod product;
pub mod product_variant;

// Re-export entities
pub use cart_line::{Entity as CartLine, Model as CartLineModel};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
