//! Topics and the optional poll attached to them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Topic ───────────────────────────────────────────────────────────────────

/// A discussion thread owned by exactly one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
  pub id:            i64,
  pub branch_id:     i64,
  pub title:         String,
  /// User id of the author of the first post.
  pub topic_starter: i64,
  pub created_at:    DateTime<Utc>,
  /// Bumped whenever the topic or one of its posts changes.
  pub modified_at:   DateTime<Utc>,
  pub closed:        bool,
  pub sticky:        bool,
  pub announcement:  bool,
  /// Code-review topics are created by a dedicated flow and cannot be edited
  /// through the regular topic form.
  pub code_review:   bool,
  pub poll:          Option<Poll>,
}

impl Topic {
  pub fn is_started_by(&self, user_id: i64) -> bool { self.topic_starter == user_id }
}

/// Input to [`crate::store::TopicDao::create_topic`].
#[derive(Debug, Clone, Default)]
pub struct NewTopic {
  pub title:        String,
  /// Body of the first post.
  pub body:         String,
  pub sticky:       bool,
  pub announcement: bool,
  pub code_review:  bool,
  pub poll:         Option<NewPoll>,
}

/// Longest accepted topic title, in characters.
pub const MAX_TITLE_LENGTH: usize = 120;

// ─── Poll ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
  pub id:               i64,
  pub topic_id:         i64,
  pub title:            String,
  /// Votes are rejected after this moment. `None` means the poll never ends.
  pub ending_date:      Option<DateTime<Utc>>,
  pub multiple_answers: bool,
  pub items:            Vec<PollItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollItem {
  pub id:    i64,
  pub name:  String,
  pub votes: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewPoll {
  pub title:            String,
  pub items:            Vec<String>,
  pub ending_date:      Option<DateTime<Utc>>,
  pub multiple_answers: bool,
}

impl Poll {
  pub fn is_active(&self, now: DateTime<Utc>) -> bool {
    self.ending_date.is_none_or(|end| now < end)
  }

  pub fn total_votes(&self) -> i64 { self.items.iter().map(|i| i.votes).sum() }

  /// Check that `item_ids` is an acceptable ballot for this poll at `now`.
  pub fn validate_ballot(&self, item_ids: &[i64], now: DateTime<Utc>) -> Result<()> {
    if !self.is_active(now) {
      return Err(Error::InvalidState(format!("poll {} has ended", self.id)));
    }
    if item_ids.is_empty() {
      return Err(Error::InvalidState("no poll item selected".into()));
    }
    if !self.multiple_answers && item_ids.len() > 1 {
      return Err(Error::InvalidState(format!(
        "poll {} accepts a single answer",
        self.id
      )));
    }
    if item_ids.iter().collect::<BTreeSet<_>>().len() != item_ids.len() {
      return Err(Error::InvalidState(format!("poll {}: an item was selected twice", self.id)));
    }
    if let Some(unknown) =
      item_ids.iter().find(|id| !self.items.iter().any(|item| item.id == **id))
    {
      return Err(Error::not_found("poll item", unknown));
    }
    Ok(())
  }
}
