//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 strings (microseconds,
//! `Z` suffix) so that lexical order is chronological. Enums are stored as their
//! lowercase (or SCREAMING_SNAKE for message status) names. UUIDs are stored as
//! hyphenated lowercase strings.

use agora_core::{
  acl::{AccessControlEntry, ObjectIdentity, ObjectType, Sid},
  message::{PrivateMessage, PrivateMessageStatus},
  post::Post,
  topic::{Poll, PollItem, Topic},
  user::{Language, User},
};
use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current instant at storage precision, so values handed back to callers
/// compare equal to what a later read returns.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Language ────────────────────────────────────────────────────────────────

pub fn encode_language(l: Language) -> &'static str {
  match l {
    Language::English => "english",
    Language::Russian => "russian",
    Language::Ukrainian => "ukrainian",
    Language::Spanish => "spanish",
  }
}

pub fn decode_language(s: &str) -> Result<Language> {
  match s {
    "english" => Ok(Language::English),
    "russian" => Ok(Language::Russian),
    "ukrainian" => Ok(Language::Ukrainian),
    "spanish" => Ok(Language::Spanish),
    other => Err(Error::Decode(format!("unknown language: {other:?}"))),
  }
}

// ─── PrivateMessageStatus ────────────────────────────────────────────────────

pub fn encode_status(s: PrivateMessageStatus) -> &'static str {
  match s {
    PrivateMessageStatus::Draft => "DRAFT",
    PrivateMessageStatus::Sent => "SENT",
    PrivateMessageStatus::DeletedFromInbox => "DELETED_FROM_INBOX",
    PrivateMessageStatus::DeletedFromOutbox => "DELETED_FROM_OUTBOX",
  }
}

pub fn decode_status(s: &str) -> Result<PrivateMessageStatus> {
  match s {
    "DRAFT" => Ok(PrivateMessageStatus::Draft),
    "SENT" => Ok(PrivateMessageStatus::Sent),
    "DELETED_FROM_INBOX" => Ok(PrivateMessageStatus::DeletedFromInbox),
    "DELETED_FROM_OUTBOX" => Ok(PrivateMessageStatus::DeletedFromOutbox),
    other => Err(Error::Decode(format!("unknown message status: {other:?}"))),
  }
}

// ─── Sid ─────────────────────────────────────────────────────────────────────

pub fn encode_sid(sid: Sid) -> (&'static str, Option<i64>) {
  match sid {
    Sid::Anonymous => ("anonymous", None),
    Sid::User(id) => ("user", Some(id)),
    Sid::Group(id) => ("group", Some(id)),
  }
}

pub fn decode_sid(kind: &str, id: Option<i64>) -> Result<Sid> {
  match (kind, id) {
    ("anonymous", _) => Ok(Sid::Anonymous),
    ("user", Some(id)) => Ok(Sid::User(id)),
    ("group", Some(id)) => Ok(Sid::Group(id)),
    (other, id) => Err(Error::Decode(format!("bad sid: {other:?} {id:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawUser::from_row`].
pub const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.language, \
   u.enabled, u.activation_key, u.registered_at, u.last_login, u.version";

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub id:             i64,
  pub username:       String,
  pub email:          String,
  pub password_hash:  String,
  pub language:       String,
  pub enabled:        bool,
  pub activation_key: String,
  pub registered_at:  String,
  pub last_login:     Option<String>,
  pub version:        i64,
  pub group_ids:      Vec<i64>,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      username:       row.get(1)?,
      email:          row.get(2)?,
      password_hash:  row.get(3)?,
      language:       row.get(4)?,
      enabled:        row.get(5)?,
      activation_key: row.get(6)?,
      registered_at:  row.get(7)?,
      last_login:     row.get(8)?,
      version:        row.get(9)?,
      group_ids:      Vec::new(),
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:             self.id,
      username:       self.username,
      email:          self.email,
      password_hash:  self.password_hash,
      language:       decode_language(&self.language)?,
      enabled:        self.enabled,
      activation_key: decode_uuid(&self.activation_key)?,
      registered_at:  decode_dt(&self.registered_at)?,
      last_login:     decode_opt_dt(self.last_login)?,
      version:        self.version,
      group_ids:      self.group_ids,
    })
  }
}

/// Column list matching [`RawTopic::from_row`].
pub const TOPIC_COLUMNS: &str = "id, branch_id, title, topic_starter, created_at, modified_at, \
   closed, sticky, announcement, code_review";

pub struct RawTopic {
  pub id:            i64,
  pub branch_id:     i64,
  pub title:         String,
  pub topic_starter: i64,
  pub created_at:    String,
  pub modified_at:   String,
  pub closed:        bool,
  pub sticky:        bool,
  pub announcement:  bool,
  pub code_review:   bool,
  pub poll:          Option<RawPoll>,
}

impl RawTopic {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      branch_id:     row.get(1)?,
      title:         row.get(2)?,
      topic_starter: row.get(3)?,
      created_at:    row.get(4)?,
      modified_at:   row.get(5)?,
      closed:        row.get(6)?,
      sticky:        row.get(7)?,
      announcement:  row.get(8)?,
      code_review:   row.get(9)?,
      poll:          None,
    })
  }

  pub fn into_topic(self) -> Result<Topic> {
    Ok(Topic {
      id:            self.id,
      branch_id:     self.branch_id,
      title:         self.title,
      topic_starter: self.topic_starter,
      created_at:    decode_dt(&self.created_at)?,
      modified_at:   decode_dt(&self.modified_at)?,
      closed:        self.closed,
      sticky:        self.sticky,
      announcement:  self.announcement,
      code_review:   self.code_review,
      poll:          self.poll.map(RawPoll::into_poll).transpose()?,
    })
  }
}

pub struct RawPoll {
  pub id:               i64,
  pub topic_id:         i64,
  pub title:            String,
  pub ending_date:      Option<String>,
  pub multiple_answers: bool,
  pub items:            Vec<PollItem>,
}

impl RawPoll {
  pub fn into_poll(self) -> Result<Poll> {
    Ok(Poll {
      id:               self.id,
      topic_id:         self.topic_id,
      title:            self.title,
      ending_date:      decode_opt_dt(self.ending_date)?,
      multiple_answers: self.multiple_answers,
      items:            self.items,
    })
  }
}

/// Column list matching [`RawPost::from_row`].
pub const POST_COLUMNS: &str = "id, topic_id, author_id, content, created_at, modified_at";

pub struct RawPost {
  pub id:          i64,
  pub topic_id:    i64,
  pub author_id:   i64,
  pub content:     String,
  pub created_at:  String,
  pub modified_at: Option<String>,
}

impl RawPost {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      topic_id:    row.get(1)?,
      author_id:   row.get(2)?,
      content:     row.get(3)?,
      created_at:  row.get(4)?,
      modified_at: row.get(5)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    Ok(Post {
      id:          self.id,
      topic_id:    self.topic_id,
      author_id:   self.author_id,
      content:     self.content,
      created_at:  decode_dt(&self.created_at)?,
      modified_at: decode_opt_dt(self.modified_at)?,
    })
  }
}

/// Column list matching [`RawMessage::from_row`].
pub const MESSAGE_COLUMNS: &str =
  "id, author_id, recipient_id, title, body, created_at, read, status";

pub struct RawMessage {
  pub id:           i64,
  pub author_id:    i64,
  pub recipient_id: i64,
  pub title:        String,
  pub body:         String,
  pub created_at:   String,
  pub read:         bool,
  pub status:       String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      author_id:    row.get(1)?,
      recipient_id: row.get(2)?,
      title:        row.get(3)?,
      body:         row.get(4)?,
      created_at:   row.get(5)?,
      read:         row.get(6)?,
      status:       row.get(7)?,
    })
  }

  pub fn into_message(self) -> Result<PrivateMessage> {
    Ok(PrivateMessage {
      id:           self.id,
      author_id:    self.author_id,
      recipient_id: self.recipient_id,
      title:        self.title,
      body:         self.body,
      created_at:   decode_dt(&self.created_at)?,
      read:         self.read,
      status:       decode_status(&self.status)?,
    })
  }
}

pub struct RawAclEntry {
  pub object_type: String,
  pub object_id:   i64,
  pub sid_kind:    String,
  pub sid_id:      Option<i64>,
  pub permission:  String,
  pub granting:    bool,
}

impl RawAclEntry {
  pub fn into_entry(self) -> Result<AccessControlEntry> {
    let kind: ObjectType = self
      .object_type
      .parse()
      .map_err(|_| Error::Decode(format!("unknown object type: {:?}", self.object_type)))?;
    Ok(AccessControlEntry {
      identity:   ObjectIdentity::new(self.object_id, kind),
      recipient:  decode_sid(&self.sid_kind, self.sid_id)?,
      permission: self
        .permission
        .parse()
        .map_err(|e: agora_core::Error| Error::Decode(e.to_string()))?,
      granting:   self.granting,
    })
  }
}
