//! Private messages and their per-side deletion lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivateMessageStatus {
  Draft,
  Sent,
  /// The recipient removed it; still visible in the author's outbox.
  DeletedFromInbox,
  /// The author removed it; still visible in the recipient's inbox.
  DeletedFromOutbox,
}

/// A directed message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
  pub id:           i64,
  pub author_id:    i64,
  pub recipient_id: i64,
  pub title:        String,
  pub body:         String,
  pub created_at:   DateTime<Utc>,
  pub read:         bool,
  pub status:       PrivateMessageStatus,
}

/// Input to [`crate::store::MessageDao::add_message`].
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub author_id:    i64,
  pub recipient_id: i64,
  pub title:        String,
  pub body:         String,
  pub status:       PrivateMessageStatus,
}

/// The mailbox folder a message is listed in for a given user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
  Inbox,
  Outbox,
  Drafts,
}

impl fmt::Display for Folder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Inbox => "inbox",
      Self::Outbox => "outbox",
      Self::Drafts => "drafts",
    })
  }
}

/// What deleting a message on behalf of one user does to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
  /// Nobody can see the message any more; drop the row.
  Remove,
  /// The other side still sees it.
  MarkAs(PrivateMessageStatus),
}

/// Result of deleting a batch of messages for one user. Anything but
/// `Done` means nothing was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDeletion {
  /// Every message was handled; carries the folder of the last one.
  Done(Folder),
  Missing(i64),
  NotVisible(i64),
}

impl PrivateMessage {
  pub fn is_draft(&self) -> bool { self.status == PrivateMessageStatus::Draft }

  pub fn is_visible_to(&self, user_id: i64) -> bool {
    use PrivateMessageStatus::*;
    let author = self.author_id == user_id;
    let recipient = self.recipient_id == user_id;
    match self.status {
      Draft | DeletedFromInbox => author,
      Sent => author || recipient,
      DeletedFromOutbox => recipient,
    }
  }

  /// The folder this message shows up in for `user_id`.
  pub fn folder_for(&self, user_id: i64) -> Folder {
    if self.is_draft() {
      Folder::Drafts
    } else if self.recipient_id == user_id {
      Folder::Inbox
    } else {
      Folder::Outbox
    }
  }

  /// Decide the transition for `user_id` deleting this message, or `None`
  /// when the message is not visible to that user.
  pub fn deletion_by(&self, user_id: i64) -> Option<Deletion> {
    use PrivateMessageStatus::*;
    if !self.is_visible_to(user_id) {
      return None;
    }
    let author = self.author_id == user_id;
    let recipient = self.recipient_id == user_id;
    let deletion = match self.status {
      Draft => Deletion::Remove,
      Sent if author && recipient => Deletion::Remove,
      Sent if recipient => Deletion::MarkAs(DeletedFromInbox),
      Sent => Deletion::MarkAs(DeletedFromOutbox),
      DeletedFromInbox | DeletedFromOutbox => Deletion::Remove,
    };
    Some(deletion)
  }
}
