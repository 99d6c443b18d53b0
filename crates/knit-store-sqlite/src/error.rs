//! Error type for `knit-store-sqlite`.
//!
//! Covers opening and schema initialisation. Reconciliation itself reports
//! through [`knit_core::Error`], with backend failures boxed into its
//! `Store` variant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
