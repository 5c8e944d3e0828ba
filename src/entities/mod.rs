pub mod commerce;
pub mod order;
