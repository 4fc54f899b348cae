//! Users, groups and the request principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::acl::Sid;

/// Group every activated account is added to.
pub const REGISTERED_USERS_GROUP: &str = "Registered Users";
/// Group holding forum administrators.
pub const ADMINISTRATORS_GROUP: &str = "Administrators";

// ─── Language ────────────────────────────────────────────────────────────────

/// Interface language of a user; drives the locale set after login.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  #[default]
  English,
  Russian,
  Ukrainian,
  Spanish,
}

impl Language {
  pub fn locale(&self) -> &'static str {
    match self {
      Self::English => "en",
      Self::Russian => "ru",
      Self::Ukrainian => "uk",
      Self::Spanish => "es",
    }
  }

  /// Map a locale tag such as `ru-RU` or `es` to a language. Unknown tags
  /// fall back to English.
  pub fn by_locale(tag: &str) -> Self {
    let primary = tag
      .split(['-', '_'])
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();
    match primary.as_str() {
      "ru" => Self::Russian,
      "uk" => Self::Ukrainian,
      "es" => Self::Spanish,
      _ => Self::English,
    }
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:             i64,
  pub username:       String,
  pub email:          String,
  /// Argon2 PHC string.
  #[serde(skip_serializing, default)]
  pub password_hash:  String,
  pub language:       Language,
  /// Accounts stay disabled until activated through the mailed link.
  pub enabled:        bool,
  #[serde(skip_serializing, default)]
  pub activation_key: Uuid,
  pub registered_at:  DateTime<Utc>,
  pub last_login:     Option<DateTime<Utc>>,
  /// Row version for optimistic locking; bumped on every login.
  pub version:        i64,
  pub group_ids:      Vec<i64>,
}

/// Input to [`crate::store::UserDao::add_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username:      String,
  pub email:         String,
  pub password_hash: String,
  pub language:      Language,
  pub enabled:       bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  pub id:   i64,
  pub name: String,
}

// ─── Principal ───────────────────────────────────────────────────────────────

/// The identity a request acts as. Passed explicitly into every service
/// operation; there is exactly one anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
  #[default]
  Anonymous,
  User(User),
}

impl Principal {
  pub fn is_anonymous(&self) -> bool { matches!(self, Self::Anonymous) }

  pub fn user(&self) -> Option<&User> {
    match self {
      Self::Anonymous => None,
      Self::User(u) => Some(u),
    }
  }

  pub fn user_id(&self) -> Option<i64> { self.user().map(|u| u.id) }

  pub fn username(&self) -> &str {
    self.user().map_or("anonymous", |u| u.username.as_str())
  }

  pub fn language(&self) -> Language {
    self.user().map(|u| u.language).unwrap_or_default()
  }

  /// Every security identity an ACL entry may name to reach this principal.
  pub fn sids(&self) -> Vec<Sid> {
    match self {
      Self::Anonymous => vec![Sid::Anonymous],
      Self::User(u) => std::iter::once(Sid::User(u.id))
        .chain(u.group_ids.iter().copied().map(Sid::Group))
        .collect(),
    }
  }
}
