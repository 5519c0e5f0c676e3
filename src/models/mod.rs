pub mod driver;
pub mod order;
pub mod pricing;
pub mod principal;
pub mod wallet;
