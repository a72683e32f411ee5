//! The `EvaluationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The API layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  evaluation::{EvaluationFact, FactId, Period, Score, ScoreSubmission},
  item::{ItemId, NewItem, RubricItem},
  member::{Member, MemberCredentials, MemberId, MemberUpdate, NewMember},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Filters for [`EvaluationStore::list_evaluations`]. Unset fields do not
/// restrict the result.
#[derive(Debug, Clone, Default)]
pub struct EvaluationQuery {
  /// Facts given by this member.
  pub evaluator_id: Option<MemberId>,
  /// Facts received by this member.
  pub evaluated_id: Option<MemberId>,
  /// Facts whose evaluated member belongs to this team.
  pub team:         Option<String>,
  pub period:       Option<Period>,
}

impl EvaluationQuery {
  pub fn given_by(evaluator_id: MemberId, period: Period) -> Self {
    Self { evaluator_id: Some(evaluator_id), period: Some(period), ..Self::default() }
  }

  pub fn received_by(evaluated_id: MemberId) -> Self {
    Self { evaluated_id: Some(evaluated_id), ..Self::default() }
  }

  pub fn team(team: impl Into<String>, period: Period) -> Self {
    Self { team: Some(team.into()), period: Some(period), ..Self::default() }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Backend error classification the API layer needs beyond `Display`.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// `true` when a write collided with a uniqueness rule, such as a taken
  /// username.
  fn is_duplicate(&self) -> bool { false }
}

/// Abstraction over the Evaluation Store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait EvaluationStore: Send + Sync {
  type Error: StoreError;

  // ── Members ───────────────────────────────────────────────────────────

  /// Persist a new member. Usernames are unique.
  fn add_member(
    &self,
    input: NewMember,
  ) -> impl Future<Output = Result<Member, Self::Error>> + Send + '_;

  /// Retrieve a member by id. Returns `None` if not found.
  fn get_member(
    &self,
    id: MemberId,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  /// Look up a member and its password hash for login.
  fn find_credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<MemberCredentials>, Self::Error>> + Send + '_;

  /// Every member, ordered by team then name.
  fn list_members(
    &self,
  ) -> impl Future<Output = Result<Vec<Member>, Self::Error>> + Send + '_;

  /// `user`-role members of `team`, ordered by name.
  fn list_team_members(
    &self,
    team: String,
  ) -> impl Future<Output = Result<Vec<Member>, Self::Error>> + Send + '_;

  /// Change a member's name and team. Returns `None` if not found.
  fn update_member(
    &self,
    id: MemberId,
    update: MemberUpdate,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  /// Remove a member and every evaluation it gave or received. Returns
  /// whether a member was removed.
  fn delete_member(
    &self,
    id: MemberId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Rubric items ──────────────────────────────────────────────────────

  /// Every rubric item, ordered by display order then id.
  fn list_items(
    &self,
  ) -> impl Future<Output = Result<Vec<RubricItem>, Self::Error>> + Send + '_;

  fn add_item(
    &self,
    input: NewItem,
  ) -> impl Future<Output = Result<RubricItem, Self::Error>> + Send + '_;

  /// Returns `None` if not found.
  fn update_item(
    &self,
    id: ItemId,
    input: NewItem,
  ) -> impl Future<Output = Result<Option<RubricItem>, Self::Error>> + Send + '_;

  /// Remove an item and every evaluation recorded against it.
  fn delete_item(
    &self,
    id: ItemId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Evaluations ───────────────────────────────────────────────────────

  /// Insert a score, or replace the score already recorded for the same
  /// `(evaluator, evaluated, item, period)`. `updated_at` is set by the store.
  fn upsert_evaluation(
    &self,
    evaluator_id: MemberId,
    submission: ScoreSubmission,
    period: Period,
  ) -> impl Future<Output = Result<EvaluationFact, Self::Error>> + Send + '_;

  /// Facts matching `query`, in insertion order.
  fn list_evaluations<'a>(
    &'a self,
    query: &'a EvaluationQuery,
  ) -> impl Future<Output = Result<Vec<EvaluationFact>, Self::Error>> + Send + 'a;

  /// Administrator correction of a single fact. Returns `None` if not found.
  fn adjust_score(
    &self,
    fact_id: FactId,
    score: Score,
  ) -> impl Future<Output = Result<Option<EvaluationFact>, Self::Error>> + Send + '_;
}
