//! [`SqliteStore`] — the SQLite implementation of [`EvaluationStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};

use tally_core::{
  evaluation::{EvaluationFact, FactId, Period, Score, ScoreSubmission},
  item::{ItemId, NewItem, RubricItem},
  member::{Member, MemberCredentials, MemberId, MemberUpdate, NewMember},
  store::{EvaluationQuery, EvaluationStore},
};

use crate::{
  encode::{
    FACT_COLUMNS, ITEM_COLUMNS, MEMBER_COLUMNS, RawFact, RawMember, encode_dt, item_from_row,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally evaluation store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// `true` if `err` is a constraint violation with the given extended code.
fn is_constraint(err: &rusqlite::Error, extended: std::os::raw::c_int) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation && e.extended_code == extended
  )
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_members(&self, sql: String, params: Vec<Value>) -> Result<Vec<Member>> {
    let raws: Vec<RawMember> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMember::into_member).collect()
  }
}

// ─── EvaluationStore impl ────────────────────────────────────────────────────

impl EvaluationStore for SqliteStore {
  type Error = Error;

  // ── Members ───────────────────────────────────────────────────────────────

  async fn add_member(&self, input: NewMember) -> Result<Member> {
    let created_at = encode_dt(Utc::now());
    let role       = input.role.as_str();
    let username   = input.username.clone();
    let sql = format!(
      "INSERT INTO members (username, name, team, role, password_hash, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       RETURNING {MEMBER_COLUMNS}"
    );

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        let inserted = conn.query_row(
          &sql,
          rusqlite::params![
            input.username,
            input.name,
            input.team,
            role,
            input.password_hash,
            created_at,
          ],
          RawMember::from_row,
        );
        match inserted {
          Ok(raw) => Ok(Some(raw)),
          Err(e) if is_constraint(&e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    raw
      .ok_or(Error::DuplicateUsername(username))?
      .into_member()
  }

  async fn get_member(&self, id: MemberId) -> Result<Option<Member>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1");

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], RawMember::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  async fn find_credentials(&self, username: String) -> Result<Option<MemberCredentials>> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE username = ?1");

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![username], RawMember::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMember::into_credentials).transpose()
  }

  async fn list_members(&self) -> Result<Vec<Member>> {
    self
      .query_members(
        format!("SELECT {MEMBER_COLUMNS} FROM members ORDER BY team, name, id"),
        Vec::new(),
      )
      .await
  }

  async fn list_team_members(&self, team: String) -> Result<Vec<Member>> {
    self
      .query_members(
        format!(
          "SELECT {MEMBER_COLUMNS} FROM members
           WHERE team = ?1 AND role = 'user'
           ORDER BY name, id"
        ),
        vec![Value::Text(team)],
      )
      .await
  }

  async fn update_member(&self, id: MemberId, update: MemberUpdate) -> Result<Option<Member>> {
    let sql = format!(
      "UPDATE members SET name = ?1, team = ?2 WHERE id = ?3 RETURNING {MEMBER_COLUMNS}"
    );

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![update.name, update.team, id],
              RawMember::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  async fn delete_member(&self, id: MemberId) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM members WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Rubric items ──────────────────────────────────────────────────────────

  async fn list_items(&self) -> Result<Vec<RubricItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM evaluation_items ORDER BY display_order, id");

    let items = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], item_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(items)
  }

  async fn add_item(&self, input: NewItem) -> Result<RubricItem> {
    let name = input.display_name();
    let sql = format!(
      "INSERT INTO evaluation_items (major_category, minor_category, name, description, display_order)
       VALUES (?1, ?2, ?3, ?4, ?5)
       RETURNING {ITEM_COLUMNS}"
    );

    let item = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &sql,
          rusqlite::params![
            input.major_category,
            input.minor_category,
            name,
            input.description,
            input.display_order,
          ],
          item_from_row,
        )?)
      })
      .await?;
    Ok(item)
  }

  async fn update_item(&self, id: ItemId, input: NewItem) -> Result<Option<RubricItem>> {
    let name = input.display_name();
    let sql = format!(
      "UPDATE evaluation_items
       SET major_category = ?1, minor_category = ?2, name = ?3, description = ?4, display_order = ?5
       WHERE id = ?6
       RETURNING {ITEM_COLUMNS}"
    );

    let item = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![
                input.major_category,
                input.minor_category,
                name,
                input.description,
                input.display_order,
                id,
              ],
              item_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(item)
  }

  async fn delete_item(&self, id: ItemId) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM evaluation_items WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Evaluations ───────────────────────────────────────────────────────────

  async fn upsert_evaluation(
    &self,
    evaluator_id: MemberId,
    submission:   ScoreSubmission,
    period:       Period,
  ) -> Result<EvaluationFact> {
    let score      = i64::from(submission.score.get());
    let period_str = period.to_string();
    let updated_at = encode_dt(Utc::now());
    let sql = format!(
      "INSERT INTO evaluations
         (evaluator_id, evaluated_id, item_id, score, year_month, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       ON CONFLICT (evaluator_id, evaluated_id, item_id, year_month)
       DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at
       RETURNING {FACT_COLUMNS}"
    );

    let raw: Option<RawFact> = self
      .conn
      .call(move |conn| {
        let upserted = conn.query_row(
          &sql,
          rusqlite::params![
            evaluator_id,
            submission.evaluated_id,
            submission.item_id,
            score,
            period_str,
            updated_at,
          ],
          RawFact::from_row,
        );
        match upserted {
          Ok(raw) => Ok(Some(raw)),
          Err(e) if is_constraint(&e, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    raw.ok_or(Error::UnknownReference)?.into_fact()
  }

  async fn list_evaluations(&self, query: &EvaluationQuery) -> Result<Vec<EvaluationFact>> {
    let mut conds: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    let mut push = |cond: &str, value: Value| {
      params.push(value);
      conds.push(format!("{cond} ?{}", params.len()));
    };
    if let Some(id) = query.evaluator_id {
      push("e.evaluator_id =", Value::Integer(id));
    }
    if let Some(id) = query.evaluated_id {
      push("e.evaluated_id =", Value::Integer(id));
    }
    if let Some(team) = &query.team {
      push("m.team =", Value::Text(team.clone()));
    }
    if let Some(period) = query.period {
      push("e.year_month =", Value::Text(period.to_string()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let columns = FACT_COLUMNS
      .split(", ")
      .map(|c| format!("e.{c}"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT {columns}
       FROM evaluations e
       JOIN members m ON m.id = e.evaluated_id
       {where_clause}
       ORDER BY e.id"
    );

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawFact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  async fn adjust_score(&self, fact_id: FactId, score: Score) -> Result<Option<EvaluationFact>> {
    let score      = i64::from(score.get());
    let updated_at = encode_dt(Utc::now());
    let sql = format!(
      "UPDATE evaluations SET score = ?1, updated_at = ?2 WHERE id = ?3 RETURNING {FACT_COLUMNS}"
    );

    let raw: Option<RawFact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![score, updated_at, fact_id],
              RawFact::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFact::into_fact).transpose()
  }
}
