//! Rubric items — the fixed set of dimensions every member is scored on.

use serde::{Deserialize, Serialize};

pub type ItemId = i64;

/// Display order given to items created without one.
pub const DEFAULT_DISPLAY_ORDER: i64 = 999;

/// One evaluation dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
  pub id:             ItemId,
  pub major_category: String,
  pub minor_category: String,
  /// Always `"{major_category} - {minor_category}"`.
  pub name:           String,
  pub description:    String,
  pub display_order:  i64,
}

/// Input to [`crate::store::EvaluationStore::add_item`] and
/// [`crate::store::EvaluationStore::update_item`].
#[derive(Debug, Clone)]
pub struct NewItem {
  pub major_category: String,
  pub minor_category: String,
  pub description:    String,
  pub display_order:  i64,
}

impl NewItem {
  pub fn new(major: impl Into<String>, minor: impl Into<String>) -> Self {
    Self {
      major_category: major.into(),
      minor_category: minor.into(),
      description:    String::new(),
      display_order:  DEFAULT_DISPLAY_ORDER,
    }
  }

  /// The composed display name stored alongside the categories.
  pub fn display_name(&self) -> String {
    format!("{} - {}", self.major_category, self.minor_category)
  }
}
