pub mod commerce;
pub mod coupons;
pub mod payment_gateway;
