//! The aggregation engine — pure reductions from raw evaluation facts to the
//! view models the API serves.
//!
//! Nothing here performs I/O. Callers fetch a snapshot of facts, members and
//! rubric items from an [`EvaluationStore`](crate::store::EvaluationStore) and
//! pass it in; the same snapshot always yields the same output.
//!
//! Self-evaluations (`evaluator_id == evaluated_id`) are reported only as a
//! side-by-side `self_score`. They never contribute to `others_avg`,
//! `team_avg` or `rank`.

use std::{
  cmp::Reverse,
  collections::{BTreeMap, BTreeSet, HashMap},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Error, Result,
  evaluation::{EvaluationFact, FactId, Period, Score},
  item::{ItemId, RubricItem},
  member::{Member, MemberId},
};

// ─── View models ─────────────────────────────────────────────────────────────

/// A score the requesting member gave out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GivenScore {
  pub fact_id:   FactId,
  pub item_id:   ItemId,
  pub item_name: String,
  pub score:     Score,
}

/// All scores the requesting member gave one colleague in a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalResultGroup {
  pub evaluated_id:   MemberId,
  pub evaluated_name: String,
  pub scores:         Vec<GivenScore>,
}

/// A member's standing on one rubric item within a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalSummaryRow {
  pub item_id:        ItemId,
  pub item_name:      String,
  pub major_category: String,
  pub minor_category: String,
  /// Mean of scores received from other members; `None` until someone rates.
  pub others_avg:     Option<f64>,
  /// Mean of the member's own scores for themself.
  pub self_score:     Option<f64>,
  /// Number of facts behind `others_avg`.
  pub count:          usize,
  /// Mean of the team members' `others_avg`, skipping unrated members.
  pub team_avg:       Option<f64>,
  /// Competition rank within the team; `None` when `others_avg` is `None`.
  pub rank:           Option<usize>,
  /// Team members with at least one received score for this item.
  pub team_total:     usize,
}

/// One member's full summary, used for the per-team administrator view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
  pub member_id:   MemberId,
  pub member_name: String,
  pub rows:        Vec<PersonalSummaryRow>,
}

/// Period-over-period movement of `others_avg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
  Up,
  Down,
  Flat,
}

/// [`PersonalSummaryRow`] without team-relative fields, keyed by period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
  pub period:         Period,
  pub item_id:        ItemId,
  pub item_name:      String,
  pub major_category: String,
  pub minor_category: String,
  pub others_avg:     Option<f64>,
  pub self_score:     Option<f64>,
  pub count:          usize,
  /// Movement against the next-older period in [`MonthlyTrend::periods`].
  pub direction:      Option<TrendDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
  /// Periods with at least one received fact, most recent first.
  pub periods: Vec<Period>,
  /// Rows ordered by period (most recent first), then rubric order.
  pub rows:    Vec<TrendRow>,
}

/// A single stored fact in the administrator matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixCell {
  /// Target for [`EvaluationStore::adjust_score`](crate::store::EvaluationStore::adjust_score).
  pub fact_id:    FactId,
  pub item_id:    ItemId,
  pub item_name:  String,
  pub score:      Score,
  pub period:     Period,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectScores {
  pub evaluated_id:   MemberId,
  pub evaluated_name: String,
  pub cells:          Vec<MatrixCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatorScores {
  pub evaluator_id:   MemberId,
  pub evaluator_name: String,
  pub subjects:       Vec<SubjectScores>,
}

/// All facts whose evaluated member belongs to `team`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamScores {
  pub team:       String,
  pub evaluators: Vec<EvaluatorScores>,
}

// ─── Accumulators ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
  sum:   u32,
  count: usize,
}

impl Mean {
  fn push(&mut self, score: Score) {
    self.sum += u32::from(score.get());
    self.count += 1;
  }

  fn value(self) -> Option<f64> {
    (self.count > 0).then(|| f64::from(self.sum) / self.count as f64)
  }
}

/// Received scores for one member on one item, split by rater.
#[derive(Debug, Clone, Copy, Default)]
struct Split {
  others: Mean,
  own:    Mean,
}

impl Split {
  fn push(&mut self, fact: &EvaluationFact) {
    if fact.is_self_evaluation() {
      self.own.push(fact.score);
    } else {
      self.others.push(fact.score);
    }
  }
}

type Splits = HashMap<(MemberId, ItemId), Split>;

fn split_by_subject<'a>(facts: impl IntoIterator<Item = &'a EvaluationFact>) -> Splits {
  let mut splits = Splits::new();
  for fact in facts {
    splits
      .entry((fact.evaluated_id, fact.item_id))
      .or_default()
      .push(fact);
  }
  splits
}

fn rubric_order(items: &[RubricItem]) -> Vec<&RubricItem> {
  let mut sorted: Vec<&RubricItem> = items.iter().collect();
  sorted.sort_by_key(|item| (item.display_order, item.id));
  sorted
}

// ─── Personal results ────────────────────────────────────────────────────────

/// The scores `subject_id` gave out during `period`, grouped by the member
/// who received them.
///
/// Groups are ordered by evaluated member name, scores by rubric order. A
/// fact referring to a member or item missing from the snapshot is rejected.
pub fn monthly_personal_results(
  facts: &[EvaluationFact],
  members: &[Member],
  items: &[RubricItem],
  subject_id: MemberId,
  period: Period,
) -> Result<Vec<PersonalResultGroup>> {
  let members: HashMap<MemberId, &Member> = members.iter().map(|m| (m.id, m)).collect();
  let items: HashMap<ItemId, &RubricItem> = items.iter().map(|i| (i.id, i)).collect();

  let mut groups: BTreeMap<(&str, MemberId), Vec<(i64, GivenScore)>> = BTreeMap::new();
  for fact in facts
    .iter()
    .filter(|f| f.evaluator_id == subject_id && f.period == period)
  {
    let evaluated = members
      .get(&fact.evaluated_id)
      .ok_or(Error::UnknownMember(fact.evaluated_id))?;
    let item = items.get(&fact.item_id).ok_or(Error::UnknownItem(fact.item_id))?;

    groups
      .entry((evaluated.name.as_str(), evaluated.id))
      .or_default()
      .push((item.display_order, GivenScore {
        fact_id:   fact.id,
        item_id:   item.id,
        item_name: item.name.clone(),
        score:     fact.score,
      }));
  }

  Ok(
    groups
      .into_iter()
      .map(|((name, evaluated_id), mut scores)| {
        scores.sort_by_key(|(order, s)| (*order, s.item_id));
        PersonalResultGroup {
          evaluated_id,
          evaluated_name: name.to_owned(),
          scores: scores.into_iter().map(|(_, s)| s).collect(),
        }
      })
      .collect(),
  )
}

// ─── Team summary ────────────────────────────────────────────────────────────

/// `subject_id`'s standing among `team_member_ids` on every rubric item for
/// `period`.
///
/// The comparison set for `team_avg`, `rank` and `team_total` is every id in
/// `team_member_ids` (the subject included, when listed) that received at
/// least one score from someone else for the item.
pub fn team_summary(
  facts: &[EvaluationFact],
  subject_id: MemberId,
  team_member_ids: &[MemberId],
  items: &[RubricItem],
  period: Period,
) -> Vec<PersonalSummaryRow> {
  let splits = split_by_subject(facts.iter().filter(|f| f.period == period));
  let team: BTreeSet<MemberId> = team_member_ids.iter().copied().collect();
  summary_rows(&splits, subject_id, &team, &rubric_order(items))
}

/// [`team_summary`] for every member of a team.
pub fn team_overview(
  facts: &[EvaluationFact],
  team_members: &[Member],
  items: &[RubricItem],
  period: Period,
) -> Vec<MemberSummary> {
  let splits = split_by_subject(facts.iter().filter(|f| f.period == period));
  let team: BTreeSet<MemberId> = team_members.iter().map(|m| m.id).collect();
  let items = rubric_order(items);

  team_members
    .iter()
    .map(|member| MemberSummary {
      member_id:   member.id,
      member_name: member.name.clone(),
      rows:        summary_rows(&splits, member.id, &team, &items),
    })
    .collect()
}

fn summary_rows(
  splits: &Splits,
  subject_id: MemberId,
  team: &BTreeSet<MemberId>,
  items: &[&RubricItem],
) -> Vec<PersonalSummaryRow> {
  items
    .iter()
    .map(|item| {
      let mine = splits.get(&(subject_id, item.id)).copied().unwrap_or_default();
      let others_avg = mine.others.value();

      let comparison: Vec<f64> = team
        .iter()
        .filter_map(|id| splits.get(&(*id, item.id)))
        .filter_map(|split| split.others.value())
        .collect();

      let team_avg = (!comparison.is_empty())
        .then(|| comparison.iter().sum::<f64>() / comparison.len() as f64);
      let rank =
        others_avg.map(|avg| 1 + comparison.iter().filter(|other| **other > avg).count());

      PersonalSummaryRow {
        item_id: item.id,
        item_name: item.name.clone(),
        major_category: item.major_category.clone(),
        minor_category: item.minor_category.clone(),
        others_avg,
        self_score: mine.own.value(),
        count: mine.others.count,
        team_avg,
        rank,
        team_total: comparison.len(),
      }
    })
    .collect()
}

// ─── Trend ───────────────────────────────────────────────────────────────────

/// Direction of `current - previous`; `None` if either side is missing.
pub fn trend_direction(current: Option<f64>, previous: Option<f64>) -> Option<TrendDirection> {
  let delta = current? - previous?;
  Some(if delta > 0.0 {
    TrendDirection::Up
  } else if delta < 0.0 {
    TrendDirection::Down
  } else {
    TrendDirection::Flat
  })
}

/// The self/others split of [`team_summary`], repeated for every period in
/// which `subject_id` received at least one score. No team comparison.
pub fn monthly_trend(
  facts: &[EvaluationFact],
  subject_id: MemberId,
  items: &[RubricItem],
) -> MonthlyTrend {
  let received: Vec<&EvaluationFact> =
    facts.iter().filter(|f| f.evaluated_id == subject_id).collect();

  let periods: Vec<Period> = received
    .iter()
    .map(|f| f.period)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .rev()
    .collect();

  let mut by_period: HashMap<(Period, ItemId), Split> = HashMap::new();
  for fact in &received {
    by_period.entry((fact.period, fact.item_id)).or_default().push(fact);
  }
  let lookup = |period: Period, item: ItemId| {
    by_period.get(&(period, item)).copied().unwrap_or_default()
  };

  let items = rubric_order(items);
  let mut rows = Vec::with_capacity(periods.len() * items.len());
  for (idx, period) in periods.iter().enumerate() {
    let older = periods.get(idx + 1).copied();
    for item in &items {
      let split = lookup(*period, item.id);
      let others_avg = split.others.value();
      let previous = older.and_then(|p| lookup(p, item.id).others.value());

      rows.push(TrendRow {
        period: *period,
        item_id: item.id,
        item_name: item.name.clone(),
        major_category: item.major_category.clone(),
        minor_category: item.minor_category.clone(),
        others_avg,
        self_score: split.own.value(),
        count: split.others.count,
        direction: trend_direction(others_avg, previous),
      });
    }
  }

  MonthlyTrend { periods, rows }
}

// ─── Administrator matrix ────────────────────────────────────────────────────

/// Regroup every fact as team → evaluator → evaluated member → cells, with
/// no averaging.
///
/// The team is the evaluated member's team. Teams and people are sorted by
/// name; cells by rubric order, then most recent period first.
pub fn admin_score_matrix(
  facts: &[EvaluationFact],
  members: &[Member],
  items: &[RubricItem],
) -> Result<Vec<TeamScores>> {
  let members: HashMap<MemberId, &Member> = members.iter().map(|m| (m.id, m)).collect();
  let items: HashMap<ItemId, &RubricItem> = items.iter().map(|i| (i.id, i)).collect();

  type Cells = Vec<((i64, ItemId, Reverse<Period>), MatrixCell)>;
  type Subjects<'a> = BTreeMap<(&'a str, MemberId), Cells>;
  let mut teams: BTreeMap<&str, BTreeMap<(&str, MemberId), Subjects<'_>>> = BTreeMap::new();

  for fact in facts {
    let evaluator = members
      .get(&fact.evaluator_id)
      .ok_or(Error::UnknownMember(fact.evaluator_id))?;
    let evaluated = members
      .get(&fact.evaluated_id)
      .ok_or(Error::UnknownMember(fact.evaluated_id))?;
    let item = items.get(&fact.item_id).ok_or(Error::UnknownItem(fact.item_id))?;

    teams
      .entry(evaluated.team.as_str())
      .or_default()
      .entry((evaluator.name.as_str(), evaluator.id))
      .or_default()
      .entry((evaluated.name.as_str(), evaluated.id))
      .or_default()
      .push(((item.display_order, item.id, Reverse(fact.period)), MatrixCell {
        fact_id:    fact.id,
        item_id:    item.id,
        item_name:  item.name.clone(),
        score:      fact.score,
        period:     fact.period,
        updated_at: fact.updated_at,
      }));
  }

  Ok(
    teams
      .into_iter()
      .map(|(team, evaluators)| TeamScores {
        team:       team.to_owned(),
        evaluators: evaluators
          .into_iter()
          .map(|((evaluator_name, evaluator_id), subjects)| EvaluatorScores {
            evaluator_id,
            evaluator_name: evaluator_name.to_owned(),
            subjects: subjects
              .into_iter()
              .map(|((evaluated_name, evaluated_id), mut cells)| {
                cells.sort_by_key(|(key, _)| *key);
                SubjectScores {
                  evaluated_id,
                  evaluated_name: evaluated_name.to_owned(),
                  cells: cells.into_iter().map(|(_, cell)| cell).collect(),
                }
              })
              .collect(),
          })
          .collect(),
      })
      .collect(),
  )
}
