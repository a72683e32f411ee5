//! Error type for `tally-store-sqlite`.

use tally_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown role: {0:?}")]
  UnknownRole(String),

  #[error("username already taken: {0}")]
  DuplicateUsername(String),

  /// An evaluation named a member or rubric item that does not exist.
  #[error("evaluation references a missing member or rubric item")]
  UnknownReference,
}

impl StoreError for Error {
  fn is_duplicate(&self) -> bool { matches!(self, Error::DuplicateUsername(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
