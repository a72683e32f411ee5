//! Members — the people who rate each other and the administrators who
//! manage them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MemberId = i64;

/// What a member is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  #[default]
  User,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Admin => "admin",
      Self::User => "user",
    }
  }

  pub fn is_admin(&self) -> bool { matches!(self, Self::Admin) }
}

/// A person on the roster. Only `user`-role members take part in team
/// statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
  pub id:         MemberId,
  pub username:   String,
  /// Display name.
  pub name:       String,
  pub team:       String,
  pub role:       Role,
  pub created_at: DateTime<Utc>,
}

/// A member together with its stored password hash. Only the login path
/// should ever see this.
#[derive(Debug, Clone)]
pub struct MemberCredentials {
  pub member:        Member,
  /// argon2 PHC string; `None` means the member cannot log in.
  pub password_hash: Option<String>,
}

/// Input to [`crate::store::EvaluationStore::add_member`].
#[derive(Debug, Clone)]
pub struct NewMember {
  pub username:      String,
  pub name:          String,
  pub team:          String,
  pub role:          Role,
  pub password_hash: Option<String>,
}

impl NewMember {
  /// A `user`-role member without login credentials.
  pub fn user(
    username: impl Into<String>,
    name: impl Into<String>,
    team: impl Into<String>,
  ) -> Self {
    Self {
      username:      username.into(),
      name:          name.into(),
      team:          team.into(),
      role:          Role::User,
      password_hash: None,
    }
  }
}

/// Editable roster fields.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberUpdate {
  pub name: String,
  pub team: String,
}
