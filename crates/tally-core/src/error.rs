//! Error types for `tally-core`.

use thiserror::Error;

use crate::{item::ItemId, member::MemberId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("score must be between 1 and 10, got {0}")]
  ScoreOutOfRange(i64),

  #[error("score must be an integer")]
  ScoreNotNumeric,

  #[error("missing or invalid field: {0}")]
  MissingField(&'static str),

  #[error("invalid period {0:?}, expected YYYY-MM")]
  InvalidPeriod(String),

  #[error("evaluation references unknown member {0}")]
  UnknownMember(MemberId),

  #[error("evaluation references unknown rubric item {0}")]
  UnknownItem(ItemId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
