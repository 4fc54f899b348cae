//! Sections and branches, the organisational units of the forum.

use serde::{Deserialize, Serialize};

/// A named group of branches. Has no behaviour beyond containment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
  pub id:          i64,
  pub name:        String,
  pub description: Option<String>,
  pub position:    i32,
  /// Ordered by `position`.
  pub branches:    Vec<Branch>,
}

/// A forum sub-board. Exclusively owns its topics; deleting a branch deletes
/// every topic in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
  pub id:          i64,
  pub section_id:  i64,
  pub name:        String,
  pub description: Option<String>,
  pub position:    i32,
  /// Transient; filled by the statistics query, never persisted.
  #[serde(default)]
  pub topic_count: i64,
  /// Transient; filled by the statistics query, never persisted.
  #[serde(default)]
  pub post_count:  i64,
}
