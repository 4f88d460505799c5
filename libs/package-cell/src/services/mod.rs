pub mod ledger;
pub mod payment;
pub mod catalog;
