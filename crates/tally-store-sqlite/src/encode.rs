//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, periods as `YYYY-MM`, roles as
//! their lowercase names.

use chrono::{DateTime, Utc};
use tally_core::{
  evaluation::{EvaluationFact, Score},
  item::RubricItem,
  member::{Member, MemberCredentials, Role},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "admin" => Ok(Role::Admin),
    "user" => Ok(Role::User),
    other => Err(Error::UnknownRole(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const MEMBER_COLUMNS: &str = "id, username, name, team, role, created_at, password_hash";

/// Raw values read directly from a `members` row.
pub struct RawMember {
  pub id:            i64,
  pub username:      String,
  pub name:          String,
  pub team:          String,
  pub role:          String,
  pub created_at:    String,
  pub password_hash: Option<String>,
}

impl RawMember {
  /// Expects the columns in [`MEMBER_COLUMNS`] order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      username:      row.get(1)?,
      name:          row.get(2)?,
      team:          row.get(3)?,
      role:          row.get(4)?,
      created_at:    row.get(5)?,
      password_hash: row.get(6)?,
    })
  }

  pub fn into_credentials(self) -> Result<MemberCredentials> {
    let password_hash = self.password_hash.clone();
    Ok(MemberCredentials { member: self.into_member()?, password_hash })
  }

  pub fn into_member(self) -> Result<Member> {
    Ok(Member {
      id:         self.id,
      username:   self.username,
      name:       self.name,
      team:       self.team,
      role:       decode_role(&self.role)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const ITEM_COLUMNS: &str =
  "id, major_category, minor_category, name, description, display_order";

/// Expects the columns in [`ITEM_COLUMNS`] order.
pub fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RubricItem> {
  Ok(RubricItem {
    id:             row.get(0)?,
    major_category: row.get(1)?,
    minor_category: row.get(2)?,
    name:           row.get(3)?,
    description:    row.get(4)?,
    display_order:  row.get(5)?,
  })
}

pub const FACT_COLUMNS: &str =
  "id, evaluator_id, evaluated_id, item_id, score, year_month, updated_at";

/// Raw values read directly from an `evaluations` row.
pub struct RawFact {
  pub id:           i64,
  pub evaluator_id: i64,
  pub evaluated_id: i64,
  pub item_id:      i64,
  pub score:        i64,
  pub year_month:   String,
  pub updated_at:   String,
}

impl RawFact {
  /// Expects the columns in [`FACT_COLUMNS`] order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      evaluator_id: row.get(1)?,
      evaluated_id: row.get(2)?,
      item_id:      row.get(3)?,
      score:        row.get(4)?,
      year_month:   row.get(5)?,
      updated_at:   row.get(6)?,
    })
  }

  pub fn into_fact(self) -> Result<EvaluationFact> {
    Ok(EvaluationFact {
      id:           self.id,
      evaluator_id: self.evaluator_id,
      evaluated_id: self.evaluated_id,
      item_id:      self.item_id,
      score:        Score::new(self.score)?,
      period:       self.year_month.parse()?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}
