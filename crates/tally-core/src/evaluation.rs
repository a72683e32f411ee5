//! Evaluation facts and the value types they are built from.
//!
//! A fact is one rater's score for one subject on one rubric item within one
//! calendar month. The store keeps at most one fact per
//! `(evaluator, evaluated, item, period)`; resubmitting replaces the score.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result, item::ItemId, member::MemberId};

pub type FactId = i64;

// ─── Score ───────────────────────────────────────────────────────────────────

/// An integer score in `1..=10`. The only way to build one is through
/// [`Score::new`], so every stored fact is in range.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
  pub const MIN: u8 = 1;
  pub const MAX: u8 = 10;

  pub fn new(value: i64) -> Result<Self> {
    if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
      Ok(Self(value as u8))
    } else {
      Err(Error::ScoreOutOfRange(value))
    }
  }

  /// Parse a score as submitted over HTTP. Integers, whole-valued floats
  /// (`8.0`) and integer strings (as sent by HTML number inputs) are
  /// accepted; anything else is rejected before the range check.
  pub fn from_json(value: &Value) -> Result<Self> {
    let raw = match value {
      Value::Number(n) => match n.as_i64() {
        Some(i) => i,
        None => n
          .as_f64()
          .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
          .map(|f| f as i64)
          .ok_or(Error::ScoreNotNumeric)?,
      },
      Value::String(s) => s.trim().parse().map_err(|_| Error::ScoreNotNumeric)?,
      _ => return Err(Error::ScoreNotNumeric),
    };
    Self::new(raw)
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for Score {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> { Self::new(value) }
}

impl From<Score> for u8 {
  fn from(score: Score) -> Self { score.0 }
}

impl fmt::Display for Score {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// A calendar year-month bucket, written `YYYY-MM`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
  year:  i32,
  month: u32,
}

impl Period {
  pub fn new(year: i32, month: u32) -> Result<Self> {
    if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
      return Err(Error::InvalidPeriod(format!("{year:04}-{month:02}")));
    }
    Ok(Self { year, month })
  }

  /// The period containing `date`.
  pub fn of(date: NaiveDate) -> Self {
    Self { year: date.year(), month: date.month() }
  }

  /// The period containing "now" on the server's local clock.
  pub fn current() -> Self { Self::of(Local::now().date_naive()) }

  /// The month before this one; January wraps to December of the prior year.
  pub fn previous(self) -> Self {
    if self.month == 1 {
      Self { year: self.year - 1, month: 12 }
    } else {
      Self { year: self.year, month: self.month - 1 }
    }
  }

  pub fn year(self) -> i32 { self.year }

  pub fn month(self) -> u32 { self.month }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

impl FromStr for Period {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidPeriod(s.to_owned());
    let (year, month) = s.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4
      || month.len() != 2
      || !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit())
    {
      return Err(invalid());
    }
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;
    Self::new(year, month).map_err(|_| invalid())
  }
}

impl TryFrom<String> for Period {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<Period> for String {
  fn from(p: Period) -> Self { p.to_string() }
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// One stored score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFact {
  pub id:           FactId,
  pub evaluator_id: MemberId,
  pub evaluated_id: MemberId,
  pub item_id:      ItemId,
  pub score:        Score,
  pub period:       Period,
  /// Server-assigned; advances on every resubmission or adjustment.
  pub updated_at:   DateTime<Utc>,
}

impl EvaluationFact {
  pub fn is_self_evaluation(&self) -> bool {
    self.evaluator_id == self.evaluated_id
  }
}

/// One validated score a rater wants to record. The evaluator and period are
/// supplied by the caller's session and clock, never by the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSubmission {
  pub evaluated_id: MemberId,
  pub item_id:      ItemId,
  pub score:        Score,
}

impl ScoreSubmission {
  /// Validate one raw `{evaluated_id, item_id, score}` object.
  pub fn from_json(entry: &Value) -> Result<Self> {
    let evaluated_id = required_id(entry, "evaluated_id")?;
    let item_id = required_id(entry, "item_id")?;
    let score = match entry.get("score") {
      None | Some(Value::Null) => return Err(Error::MissingField("score")),
      Some(v) => Score::from_json(v)?,
    };
    Ok(Self { evaluated_id, item_id, score })
  }
}

fn required_id(entry: &Value, field: &'static str) -> Result<i64> {
  entry
    .get(field)
    .and_then(Value::as_i64)
    .filter(|id| *id > 0)
    .ok_or(Error::MissingField(field))
}

/// Validate a bulk submission entry by entry. Invalid entries are skipped,
/// not reported; the caller only learns how many were accepted.
pub fn validate_bulk(entries: &[Value]) -> Vec<ScoreSubmission> {
  entries
    .iter()
    .filter_map(|entry| ScoreSubmission::from_json(entry).ok())
    .collect()
}
