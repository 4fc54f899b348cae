//! Post service: editing and deleting single posts.

use std::sync::Arc;

use agora_core::{
  Error, Result,
  acl::BranchPermission,
  post::{MAX_POST_LENGTH, Post},
  store::ForumStore,
  user::Principal,
  validation::ValidationErrors,
};

use crate::permission::{PermissionService, require_user};

/// Record a violation on `field` unless `content` is non-blank and at most
/// [`MAX_POST_LENGTH`] characters.
pub(crate) fn check_content(errors: &mut ValidationErrors, field: &str, content: &str) {
  if content.trim().is_empty() {
    errors.add(field, "blank");
  } else if content.chars().count() > MAX_POST_LENGTH {
    errors.add(field, "too_long");
  }
}

/// Outcome of [`PostService::delete_post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedPost {
  /// A reply was removed; the topic remains.
  Reply { topic_id: i64 },
  /// The first post was removed and the whole topic with it.
  Topic { topic_id: i64, branch_id: i64 },
}

impl DeletedPost {
  pub fn topic_id(&self) -> i64 {
    match self {
      Self::Reply { topic_id } | Self::Topic { topic_id, .. } => *topic_id,
    }
  }
}

pub struct PostService<S> {
  store:       Arc<S>,
  permissions: PermissionService<S>,
}

impl<S> Clone for PostService<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), permissions: self.permissions.clone() }
  }
}

impl<S: ForumStore> PostService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { permissions: PermissionService::new(store.clone()), store }
  }

  pub async fn get(&self, id: i64) -> Result<Post> {
    if !self.store.post_exists(id).await.map_err(Error::store)? {
      return Err(Error::not_found("post", id));
    }
    self
      .store
      .get_post(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("post", id))
  }

  /// Branch of the topic `post` belongs to.
  async fn branch_of(&self, post: &Post) -> Result<i64> {
    let topic = self
      .store
      .get_topic(post.topic_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("topic", post.topic_id))?;
    Ok(topic.branch_id)
  }

  pub async fn update_post(&self, principal: &Principal, post_id: i64, content: String) -> Result<Post> {
    let user = require_user(principal)?;
    let post = self.get(post_id).await?;
    let branch_id = self.branch_of(&post).await?;

    let permission = if post.is_authored_by(user.id) {
      BranchPermission::EditOwnPosts
    } else {
      BranchPermission::EditOthersPosts
    };
    self
      .permissions
      .check_branch_permission(principal, branch_id, permission)
      .await?;

    let mut errors = ValidationErrors::new();
    check_content(&mut errors, "content", &content);
    errors.into_result()?;

    self
      .store
      .update_post(post_id, content)
      .await
      .map_err(Error::store)?;
    self.get(post_id).await
  }

  /// Delete a post. Removing the first post of a topic removes the topic.
  pub async fn delete_post(&self, principal: &Principal, post_id: i64) -> Result<DeletedPost> {
    let user = require_user(principal)?;
    let post = self.get(post_id).await?;
    let branch_id = self.branch_of(&post).await?;

    let permission = if post.is_authored_by(user.id) {
      BranchPermission::DeleteOwnPosts
    } else {
      BranchPermission::DeleteOthersPosts
    };
    self
      .permissions
      .check_branch_permission(principal, branch_id, permission)
      .await?;

    let first = self
      .store
      .first_post_id(post.topic_id)
      .await
      .map_err(Error::store)?;
    if first == Some(post_id) {
      self
        .store
        .delete_topic(post.topic_id)
        .await
        .map_err(Error::store)?;
      tracing::info!(post = post_id, topic = post.topic_id, "first post deleted with its topic");
      return Ok(DeletedPost::Topic { topic_id: post.topic_id, branch_id });
    }

    self.store.delete_post(post_id).await.map_err(Error::store)?;
    tracing::debug!(post = post_id, topic = post.topic_id, "post deleted");
    Ok(DeletedPost::Reply { topic_id: post.topic_id })
  }
}

#[cfg(test)]
mod tests {
  use agora_core::topic::NewTopic;

  use super::*;
  use crate::testing::fixture;

  fn topic() -> NewTopic {
    NewTopic { title: "Hello".into(), body: "first".into(), ..Default::default() }
  }

  #[tokio::test]
  async fn authors_edit_their_own_posts() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let bob = fx.member("bob").await;
    let root = fx.admin("root").await;
    let (created, _) = fx.forum.topics.create_topic(&alice, fx.branch_id, topic()).await.unwrap();
    let reply = fx.forum.topics.reply_to_topic(&bob, created.id, "reply".into()).await.unwrap();
    let posts = &fx.forum.posts;

    let edited = posts.update_post(&bob, reply.id, "fixed typo".into()).await.unwrap();
    assert_eq!(edited.content, "fixed typo");
    assert!(edited.modified_at.is_some());

    assert!(matches!(
      posts.update_post(&alice, reply.id, "hijack".into()).await,
      Err(Error::AccessDenied(_))
    ));
    posts.update_post(&root, reply.id, "moderated".into()).await.unwrap();

    let Err(Error::Validation(errors)) = posts.update_post(&bob, reply.id, "".into()).await else {
      panic!("expected validation error");
    };
    assert!(errors.has_field("content"));
    assert!(posts.update_post(&bob, 999, "x".into()).await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn deleting_a_reply_keeps_the_topic() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let bob = fx.member("bob").await;
    let (created, _) = fx.forum.topics.create_topic(&alice, fx.branch_id, topic()).await.unwrap();
    let reply = fx.forum.topics.reply_to_topic(&bob, created.id, "reply".into()).await.unwrap();

    assert!(matches!(
      fx.forum.posts.delete_post(&alice, reply.id).await,
      Err(Error::AccessDenied(_))
    ));
    let deleted = fx.forum.posts.delete_post(&bob, reply.id).await.unwrap();
    assert_eq!(deleted, DeletedPost::Reply { topic_id: created.id });
    assert!(fx.forum.topics.get(created.id).await.is_ok());
    assert!(fx.forum.posts.get(reply.id).await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn deleting_the_first_post_deletes_the_topic() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let (created, first) = fx.forum.topics.create_topic(&alice, fx.branch_id, topic()).await.unwrap();
    fx.forum.topics.reply_to_topic(&alice, created.id, "more".into()).await.unwrap();

    let deleted = fx.forum.posts.delete_post(&alice, first.id).await.unwrap();
    assert_eq!(deleted, DeletedPost::Topic { topic_id: created.id, branch_id: fx.branch_id });
    assert_eq!(deleted.topic_id(), created.id);
    assert!(fx.forum.topics.get(created.id).await.unwrap_err().is_not_found());
  }
}
