//! HTTP handlers.

pub mod fiscal_handler;
pub mod health_handler;
pub mod profile_handler;

pub use fiscal_handler::fiscal_routes;
pub use health_handler::health_routes;
pub use profile_handler::profile_routes;
