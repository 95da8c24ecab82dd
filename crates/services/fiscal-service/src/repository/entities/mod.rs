//! SeaORM entities and their mapping to domain records.

pub mod fiscal_document;
pub mod fiscal_event;
pub mod fiscal_inutilization;
pub mod fiscal_profile;
pub mod fiscal_sequence;

use std::fmt::Display;

use common::AppError;

/// A stored row that no longer maps to a domain value.
pub(crate) fn corrupt(table: &str, err: impl Display) -> AppError {
    AppError::Internal(format!("Corrupt {} row: {}", table, err))
}

/// Unsigned domain numbers are stored in signed columns.
pub(crate) fn narrow<T: TryFrom<i64>>(table: &str, value: i64) -> Result<T, AppError> {
    T::try_from(value).map_err(|_| corrupt(table, format!("value {} out of range", value)))
}
