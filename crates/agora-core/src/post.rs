//! Posts: the fundamental unit of conversation inside a topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted post body, in characters.
pub const MAX_POST_LENGTH: usize = 20_000;

/// A post owned by exactly one topic. Author and creation time never change;
/// the body may be edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id:          i64,
  pub topic_id:    i64,
  pub author_id:   i64,
  pub content:     String,
  pub created_at:  DateTime<Utc>,
  pub modified_at: Option<DateTime<Utc>>,
}

impl Post {
  pub fn is_authored_by(&self, user_id: i64) -> bool { self.author_id == user_id }
}
