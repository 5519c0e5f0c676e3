pub mod dispatch;
pub mod ledger;
pub mod locks;
pub mod orders;
pub mod pricing;
