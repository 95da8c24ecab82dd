//! Service layer - business logic.

pub mod builder;
mod fiscal_service;

pub use fiscal_service::{Emission, EventOutcome, FiscalManager, FiscalService, PollSummary};

#[cfg(any(test, feature = "test-utils"))]
pub use fiscal_service::MockFiscalService;
