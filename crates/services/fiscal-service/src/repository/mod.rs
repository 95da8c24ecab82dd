//! Persistence for the fiscal service.

pub mod entities;
mod fiscal_repository;
#[cfg(any(test, feature = "test-utils"))]
mod memory;

pub use fiscal_repository::{FiscalRepository, FiscalStore};

#[cfg(any(test, feature = "test-utils"))]
pub use fiscal_repository::MockFiscalRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryFiscalStore;
