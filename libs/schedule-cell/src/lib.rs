pub mod clock;
pub mod models;
pub mod services;
pub mod handlers;
pub mod router;

pub use models::*;
pub use services::availability::AvailabilityResolver;
pub use services::schedule::WorkScheduleService;
