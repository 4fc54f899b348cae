//! Topic service: creating, replying to, editing, moving, closing and
//! deleting topics, plus subscriptions and poll voting.

use std::{future::Future, sync::Arc};

use chrono::Utc;

use agora_core::{
  Error, Result,
  acl::BranchPermission,
  forum::Branch,
  page::{Page, PageRequest},
  post::Post,
  store::ForumStore,
  topic::{MAX_TITLE_LENGTH, NewTopic, Poll, Topic},
  user::Principal,
  validation::ValidationErrors,
};

use crate::{
  permission::{PermissionService, require_user},
  post::check_content,
};

/// Removes a topic without any permission check. Implemented by
/// [`TopicService`]; the branch service depends on this seam only.
pub trait SilentTopicDeletion: Send + Sync {
  fn delete_topic_silent(&self, topic_id: i64) -> impl Future<Output = Result<()>> + Send;
}

fn check_title(errors: &mut ValidationErrors, title: &str) {
  if title.trim().is_empty() {
    errors.add("title", "blank");
  } else if title.chars().count() > MAX_TITLE_LENGTH {
    errors.add("title", "too_long");
  }
}

fn validate_new_topic(input: &NewTopic) -> Result<()> {
  let mut errors = ValidationErrors::new();
  check_title(&mut errors, &input.title);
  check_content(&mut errors, "body", &input.body);
  if let Some(poll) = &input.poll {
    if poll.title.trim().is_empty() {
      errors.add("poll.title", "blank");
    }
    let items = poll.items.iter().filter(|i| !i.trim().is_empty()).count();
    if items < 2 || items != poll.items.len() {
      errors.add("poll.items", "at_least_two_non_blank");
    }
    if poll.ending_date.is_some_and(|end| end <= Utc::now()) {
      errors.add("poll.ending_date", "in_past");
    }
  }
  errors.into_result()
}

pub struct TopicService<S> {
  store:       Arc<S>,
  permissions: PermissionService<S>,
}

impl<S> Clone for TopicService<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), permissions: self.permissions.clone() }
  }
}

impl<S: ForumStore> TopicService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { permissions: PermissionService::new(store.clone()), store }
  }

  // ── Fetch ─────────────────────────────────────────────────────────────────

  pub async fn get(&self, id: i64) -> Result<Topic> {
    if !self.store.topic_exists(id).await.map_err(Error::store)? {
      return Err(Error::not_found("topic", id));
    }
    self
      .store
      .get_topic(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("topic", id))
  }

  pub async fn check_view_topic_permission(&self, principal: &Principal, branch_id: i64) -> Result<()> {
    self
      .permissions
      .check_branch_permission(principal, branch_id, BranchPermission::ViewTopics)
      .await
  }

  /// A topic with one page of its posts.
  pub async fn get_posts_page(
    &self,
    principal: &Principal,
    topic_id: i64,
    page: PageRequest,
  ) -> Result<(Topic, Page<Post>)> {
    let topic = self.get(topic_id).await?;
    self.check_view_topic_permission(principal, topic.branch_id).await?;
    let posts = self
      .store
      .list_posts(topic_id, page)
      .await
      .map_err(Error::store)?;
    Ok((topic, posts))
  }

  /// Topics of a branch, sticky first.
  pub async fn get_topics_page(
    &self,
    principal: &Principal,
    branch_id: i64,
    page: PageRequest,
  ) -> Result<Page<Topic>> {
    if !self.store.branch_exists(branch_id).await.map_err(Error::store)? {
      return Err(Error::not_found("branch", branch_id));
    }
    self.check_view_topic_permission(principal, branch_id).await?;
    self
      .store
      .list_topics(branch_id, page)
      .await
      .map_err(Error::store)
  }

  async fn branch(&self, id: i64) -> Result<Branch> {
    self
      .store
      .get_branch(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("branch", id))
  }

  // ── Modification ──────────────────────────────────────────────────────────

  /// Open a new topic. The starter is subscribed to it.
  pub async fn create_topic(
    &self,
    principal: &Principal,
    branch_id: i64,
    input: NewTopic,
  ) -> Result<(Topic, Post)> {
    let user = require_user(principal)?;
    let branch = self.branch(branch_id).await?;
    self
      .permissions
      .check_branch_permission(principal, branch.id, BranchPermission::CreateTopics)
      .await?;
    if input.poll.is_some() {
      self
        .permissions
        .check_branch_permission(principal, branch.id, BranchPermission::CreatePolls)
        .await?;
    }
    validate_new_topic(&input)?;

    let (topic, post) = self
      .store
      .create_topic(branch.id, user.id, input)
      .await
      .map_err(Error::store)?;
    self
      .store
      .subscribe(topic.id, user.id)
      .await
      .map_err(Error::store)?;
    tracing::info!(topic = topic.id, branch = branch.id, user = %user.username, "topic created");
    Ok((topic, post))
  }

  pub async fn reply_to_topic(&self, principal: &Principal, topic_id: i64, body: String) -> Result<Post> {
    let user = require_user(principal)?;
    let topic = self.get(topic_id).await?;
    self
      .permissions
      .check_branch_permission(principal, topic.branch_id, BranchPermission::CreatePosts)
      .await?;
    if topic.closed {
      return Err(Error::InvalidState(format!("topic {topic_id} is closed")));
    }
    let mut errors = ValidationErrors::new();
    check_content(&mut errors, "body", &body);
    errors.into_result()?;

    let post = self
      .store
      .add_post(topic_id, user.id, body)
      .await
      .map_err(Error::store)?;
    let subscribers = self.store.subscribers(topic_id).await.map_err(Error::store)?;
    tracing::debug!(
      topic = topic_id,
      post = post.id,
      subscribers = subscribers.iter().filter(|id| **id != user.id).count(),
      "reply posted"
    );
    Ok(post)
  }

  /// Edit the title and first post of a topic. `notify` toggles the editor's
  /// subscription.
  pub async fn update_topic(
    &self,
    principal: &Principal,
    topic_id: i64,
    title: String,
    body: String,
    notify: bool,
  ) -> Result<Topic> {
    let user = require_user(principal)?;
    let mut topic = self.get(topic_id).await?;
    if topic.code_review {
      return Err(Error::InvalidState(format!(
        "code review topic {topic_id} cannot be edited"
      )));
    }
    let permission = if topic.is_started_by(user.id) {
      BranchPermission::EditOwnPosts
    } else {
      BranchPermission::EditOthersPosts
    };
    self
      .permissions
      .check_branch_permission(principal, topic.branch_id, permission)
      .await?;

    let mut errors = ValidationErrors::new();
    check_title(&mut errors, &title);
    check_content(&mut errors, "body", &body);
    errors.into_result()?;

    let first_post = self
      .store
      .first_post_id(topic_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("post", format!("first of topic {topic_id}")))?;

    topic.title = title;
    self
      .store
      .update_topic(topic)
      .await
      .map_err(Error::store)?;
    self
      .store
      .update_post(first_post, body)
      .await
      .map_err(Error::store)?;

    let subscription = if notify {
      self.store.subscribe(topic_id, user.id).await
    } else {
      self.store.unsubscribe(topic_id, user.id).await
    };
    subscription.map_err(Error::store)?;

    self.get(topic_id).await
  }

  pub async fn move_topic(&self, principal: &Principal, topic_id: i64, branch_id: i64) -> Result<Topic> {
    let mut topic = self.get(topic_id).await?;
    self
      .permissions
      .check_branch_permission(principal, topic.branch_id, BranchPermission::MoveTopics)
      .await?;
    let target = self.branch(branch_id).await?;

    let from = topic.branch_id;
    topic.branch_id = target.id;
    self
      .store
      .update_topic(topic)
      .await
      .map_err(Error::store)?;
    tracing::info!(topic = topic_id, from, to = target.id, "topic moved");
    self.get(topic_id).await
  }

  pub async fn close_topic(&self, principal: &Principal, topic_id: i64) -> Result<Topic> {
    self.set_closed(principal, topic_id, true).await
  }

  pub async fn open_topic(&self, principal: &Principal, topic_id: i64) -> Result<Topic> {
    self.set_closed(principal, topic_id, false).await
  }

  async fn set_closed(&self, principal: &Principal, topic_id: i64, closed: bool) -> Result<Topic> {
    let mut topic = self.get(topic_id).await?;
    self
      .permissions
      .check_branch_permission(principal, topic.branch_id, BranchPermission::CloseTopics)
      .await?;
    if topic.closed != closed {
      topic.closed = closed;
      self
        .store
        .update_topic(topic)
        .await
        .map_err(Error::store)?;
    }
    self.get(topic_id).await
  }

  /// Delete a topic and return the branch it was in.
  ///
  /// The starter may delete with `DELETE_OWN_POSTS`; everyone else needs
  /// `DELETE_OTHERS_POSTS`.
  pub async fn delete_topic(&self, principal: &Principal, topic_id: i64) -> Result<Branch> {
    let topic = self.get(topic_id).await?;
    let own = principal.user_id().is_some_and(|id| topic.is_started_by(id))
      && self
        .permissions
        .has_branch_permission(principal, topic.branch_id, BranchPermission::DeleteOwnPosts)
        .await?;
    if !own {
      self
        .permissions
        .check_branch_permission(principal, topic.branch_id, BranchPermission::DeleteOthersPosts)
        .await?;
    }
    let branch = self.branch(topic.branch_id).await?;
    self.store.delete_topic(topic_id).await.map_err(Error::store)?;
    tracing::info!(topic = topic_id, branch = branch.id, "topic deleted");
    Ok(branch)
  }

  pub async fn subscribe(&self, principal: &Principal, topic_id: i64) -> Result<()> {
    let user = require_user(principal)?;
    let topic = self.get(topic_id).await?;
    self.check_view_topic_permission(principal, topic.branch_id).await?;
    self.store.subscribe(topic_id, user.id).await.map_err(Error::store)
  }

  pub async fn unsubscribe(&self, principal: &Principal, topic_id: i64) -> Result<()> {
    let user = require_user(principal)?;
    self.get(topic_id).await?;
    self.store.unsubscribe(topic_id, user.id).await.map_err(Error::store)
  }

  /// Cast the principal's ballot on the topic's poll.
  pub async fn vote(&self, principal: &Principal, topic_id: i64, item_ids: Vec<i64>) -> Result<Poll> {
    let user = require_user(principal)?;
    let topic = self.get(topic_id).await?;
    self.check_view_topic_permission(principal, topic.branch_id).await?;
    let poll = topic
      .poll
      .ok_or_else(|| Error::not_found("poll", format!("of topic {topic_id}")))?;

    poll.validate_ballot(&item_ids, Utc::now())?;
    if self.store.has_voted(poll.id, user.id).await.map_err(Error::store)? {
      return Err(Error::InvalidState(format!(
        "{} already voted in poll {}",
        user.username, poll.id
      )));
    }
    self
      .store
      .record_votes(poll.id, user.id, item_ids)
      .await
      .map_err(Error::store)
  }
}

impl<S: ForumStore> SilentTopicDeletion for TopicService<S> {
  async fn delete_topic_silent(&self, topic_id: i64) -> Result<()> {
    self.get(topic_id).await?;
    self.store.delete_topic(topic_id).await.map_err(Error::store)?;
    tracing::debug!(topic = topic_id, "topic deleted silently");
    Ok(())
  }
}
