//! Data-access traits, one per entity.
//!
//! The traits are implemented by storage backends (e.g. `agora-store-sqlite`).
//! Services depend on [`ForumStore`], not on any concrete backend.
//!
//! Every DAO shares the backend's error type through [`Dao`]. All methods
//! return `Send` futures so implementations can be used from a multi-threaded
//! async runtime (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  acl::{AccessControlEntry, ObjectIdentity},
  forum::{Branch, Section},
  message::{BatchDeletion, NewMessage, PrivateMessage},
  page::{Page, PageRequest},
  post::Post,
  topic::{NewTopic, Poll, Topic},
  user::{Group, NewUser, User},
};

/// Errors produced by a backend. Services need to tell optimistic-locking
/// conflicts apart from every other failure.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn is_version_conflict(&self) -> bool;
}

/// Common supertrait binding every DAO of a backend to one error type.
pub trait Dao: Send + Sync {
  type Error: StoreError;
}

// ─── Sections & branches ─────────────────────────────────────────────────────

pub trait SectionDao: Dao {
  fn add_section(
    &self,
    name: String,
    description: Option<String>,
    position: i32,
  ) -> impl Future<Output = Result<Section, Self::Error>> + Send + '_;

  fn section_exists(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Retrieve a section with its branches ordered by position.
  fn get_section(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Section>, Self::Error>> + Send + '_;

  fn list_sections(
    &self,
  ) -> impl Future<Output = Result<Vec<Section>, Self::Error>> + Send + '_;
}

pub trait BranchDao: Dao {
  fn add_branch(
    &self,
    section_id: i64,
    name: String,
    description: Option<String>,
    position: i32,
  ) -> impl Future<Output = Result<Branch, Self::Error>> + Send + '_;

  fn branch_exists(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Counters on the returned branch are zero; see
  /// [`count_topics_in_branch`](Self::count_topics_in_branch).
  fn get_branch(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Branch>, Self::Error>> + Send + '_;

  fn update_branch(
    &self,
    id: i64,
    name: String,
    description: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn count_topics_in_branch(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn count_posts_in_branch(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;
}

// ─── Topics, polls & posts ───────────────────────────────────────────────────

pub trait TopicDao: Dao {
  /// Persist a topic, its first post and its poll (if any) atomically.
  fn create_topic(
    &self,
    branch_id: i64,
    starter_id: i64,
    input: NewTopic,
  ) -> impl Future<Output = Result<(Topic, Post), Self::Error>> + Send + '_;

  fn topic_exists(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Retrieve a topic with its poll loaded.
  fn get_topic(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Topic>, Self::Error>> + Send + '_;

  /// Topics of a branch: sticky first, then most recently modified.
  fn list_topics(
    &self,
    branch_id: i64,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<Topic>, Self::Error>> + Send + '_;

  fn topic_ids_in_branch(
    &self,
    branch_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  /// Write back the mutable topic columns (branch, title, flags) and bump
  /// `modified_at`.
  fn update_topic(
    &self,
    topic: Topic,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a topic together with its posts, poll and subscriptions.
  fn delete_topic(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn subscribe(
    &self,
    topic_id: i64,
    user_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn unsubscribe(
    &self,
    topic_id: i64,
    user_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn subscribers(
    &self,
    topic_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;
}

pub trait PollDao: Dao {
  fn has_voted(
    &self,
    poll_id: i64,
    user_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Count one vote per item and remember that `user_id` voted. Returns the
  /// updated poll.
  fn record_votes(
    &self,
    poll_id: i64,
    user_id: i64,
    item_ids: Vec<i64>,
  ) -> impl Future<Output = Result<Poll, Self::Error>> + Send + '_;
}

pub trait PostDao: Dao {
  /// Append a post and bump the topic's `modified_at`.
  fn add_post(
    &self,
    topic_id: i64,
    author_id: i64,
    content: String,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  fn post_exists(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_post(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  /// Posts of a topic in creation order.
  fn list_posts(
    &self,
    topic_id: i64,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<Post>, Self::Error>> + Send + '_;

  fn first_post_id(
    &self,
    topic_id: i64,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + '_;

  fn update_post(
    &self,
    id: i64,
    content: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn delete_post(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Users, groups & sessions ────────────────────────────────────────────────

pub trait UserDao: Dao {
  fn add_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn user_exists(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn get_user_by_username(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn get_user_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn get_user_by_activation_key(
    &self,
    key: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn activate_user(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn update_password(
    &self,
    id: i64,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Stamp `last_login` and bump the row version.
  ///
  /// Fails with a version-conflict error (see
  /// [`StoreError::is_version_conflict`]) when the stored version is no
  /// longer `expected_version`.
  fn record_login(
    &self,
    id: i64,
    expected_version: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Usernames containing `pattern`, alphabetically, at most `limit`.
  fn usernames_like(
    &self,
    pattern: String,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}

pub trait GroupDao: Dao {
  fn add_group(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Group, Self::Error>> + Send + '_;

  fn get_group_by_name(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Option<Group>, Self::Error>> + Send + '_;

  fn add_group_member(
    &self,
    group_id: i64,
    user_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

pub trait SessionDao: Dao {
  /// Store a session valid until `expires_at`. Sessions that have already
  /// expired are dropped on the way.
  fn create_session(
    &self,
    token: Uuid,
    user_id: i64,
    remember_me: bool,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The user owning the unexpired session `token`, if any.
  fn session_user(
    &self,
    token: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn delete_session(
    &self,
    token: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Private messages ────────────────────────────────────────────────────────

pub trait MessageDao: Dao {
  fn add_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<PrivateMessage, Self::Error>> + Send + '_;

  fn get_message(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<PrivateMessage>, Self::Error>> + Send + '_;

  /// Write back recipient, title, body, read flag and status.
  fn update_message(
    &self,
    message: PrivateMessage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete `ids` on behalf of `user_id` in one transaction, soft-deleting
  /// messages the other side still sees. Rolls back on the first id that
  /// is missing or not visible to the user.
  fn delete_messages(
    &self,
    user_id: i64,
    ids: Vec<i64>,
  ) -> impl Future<Output = Result<BatchDeletion, Self::Error>> + Send + '_;

  /// Messages received by `user_id` that the recipient has not deleted.
  fn inbox(
    &self,
    user_id: i64,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<PrivateMessage>, Self::Error>> + Send + '_;

  /// Messages sent by `user_id` that the author has not deleted.
  fn outbox(
    &self,
    user_id: i64,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<PrivateMessage>, Self::Error>> + Send + '_;

  fn drafts(
    &self,
    user_id: i64,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<PrivateMessage>, Self::Error>> + Send + '_;
}

// ─── ACL ─────────────────────────────────────────────────────────────────────

pub trait AclDao: Dao {
  fn add_entry(
    &self,
    entry: AccessControlEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The full entry list of `identity`, in insertion order.
  fn entries_for(
    &self,
    identity: ObjectIdentity,
  ) -> impl Future<Output = Result<Vec<AccessControlEntry>, Self::Error>> + Send + '_;

  fn delete_entries(
    &self,
    identity: ObjectIdentity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Aggregate ───────────────────────────────────────────────────────────────

/// A backend implementing every DAO.
pub trait ForumStore:
  SectionDao
  + BranchDao
  + TopicDao
  + PollDao
  + PostDao
  + UserDao
  + GroupDao
  + SessionDao
  + MessageDao
  + AclDao
{
}

impl<T> ForumStore for T where
  T: SectionDao
    + BranchDao
    + TopicDao
    + PollDao
    + PostDao
    + UserDao
    + GroupDao
    + SessionDao
    + MessageDao
    + AclDao
{
}
