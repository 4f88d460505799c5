pub mod models;
pub mod services;
pub mod handlers;
pub mod router;

pub use models::*;
pub use services::catalog::PackageCatalogService;
pub use services::ledger::PackageLedgerService;
pub use services::payment::PaymentConfirmationService;
