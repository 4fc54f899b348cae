//! Private messaging between users.
//!
//! Every mutating operation requires `SEND_PRIVATE_MESSAGES` on the acting
//! user's profile.

use std::sync::Arc;

use agora_core::{
  Error, Result,
  acl::ProfilePermission,
  message::{BatchDeletion, Folder, NewMessage, PrivateMessage, PrivateMessageStatus},
  page::{Page, PageRequest},
  store::ForumStore,
  user::{Principal, User},
  validation::ValidationErrors,
};

use crate::permission::{PermissionService, require_user};

pub const MAX_MESSAGE_TITLE_LENGTH: usize = 255;
pub const MAX_MESSAGE_BODY_LENGTH: usize = 20_000;

pub struct PrivateMessageService<S> {
  store:       Arc<S>,
  permissions: PermissionService<S>,
}

impl<S> Clone for PrivateMessageService<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), permissions: self.permissions.clone() }
  }
}

fn check_message(errors: &mut ValidationErrors, title: &str, body: &str) {
  if title.trim().is_empty() {
    errors.add("title", "blank");
  } else if title.chars().count() > MAX_MESSAGE_TITLE_LENGTH {
    errors.add("title", "too_long");
  }
  if body.trim().is_empty() {
    errors.add("body", "blank");
  } else if body.chars().count() > MAX_MESSAGE_BODY_LENGTH {
    errors.add("body", "too_long");
  }
}

impl<S: ForumStore> PrivateMessageService<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { permissions: PermissionService::new(store.clone()), store }
  }

  /// The acting user, provided they may send private messages.
  pub async fn check_permissions_to_send<'p>(&self, principal: &'p Principal) -> Result<&'p User> {
    let user = require_user(principal)?;
    self
      .permissions
      .check_profile_permission(principal, ProfilePermission::SendPrivateMessages)
      .await?;
    Ok(user)
  }

  /// Validate the fields of a message and resolve its recipient.
  async fn prepare(&self, title: &str, body: &str, recipient: &str) -> Result<User> {
    let mut errors = ValidationErrors::new();
    check_message(&mut errors, title, body);
    let recipient = self
      .store
      .get_user_by_username(recipient.trim().to_owned())
      .await
      .map_err(Error::store)?;
    if recipient.is_none() {
      errors.add("recipient", "unknown");
    }
    errors.into_result()?;
    recipient.ok_or_else(|| Error::not_found("user", "recipient"))
  }

  pub async fn send_message(
    &self,
    principal: &Principal,
    title: String,
    body: String,
    recipient: &str,
  ) -> Result<PrivateMessage> {
    let author = self.check_permissions_to_send(principal).await?;
    let recipient = self.prepare(&title, &body, recipient).await?;
    let message = self
      .store
      .add_message(NewMessage {
        author_id: author.id,
        recipient_id: recipient.id,
        title,
        body,
        status: PrivateMessageStatus::Sent,
      })
      .await
      .map_err(Error::store)?;
    tracing::debug!(message = message.id, from = author.id, to = recipient.id, "message sent");
    Ok(message)
  }

  /// A draft owned by `author_id`.
  async fn own_draft(&self, author_id: i64, id: i64) -> Result<PrivateMessage> {
    let message = self.find(id).await?;
    if !message.is_draft() || message.author_id != author_id {
      return Err(Error::not_found("draft", id));
    }
    Ok(message)
  }

  async fn find(&self, id: i64) -> Result<PrivateMessage> {
    self
      .store
      .get_message(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("private message", id))
  }

  /// Store a new draft, or overwrite draft `id`.
  pub async fn save_draft(
    &self,
    principal: &Principal,
    id: Option<i64>,
    recipient: &str,
    title: String,
    body: String,
  ) -> Result<PrivateMessage> {
    let author = self.check_permissions_to_send(principal).await?;
    let recipient = self.prepare(&title, &body, recipient).await?;

    let Some(id) = id else {
      return self
        .store
        .add_message(NewMessage {
          author_id: author.id,
          recipient_id: recipient.id,
          title,
          body,
          status: PrivateMessageStatus::Draft,
        })
        .await
        .map_err(Error::store);
    };

    let mut draft = self.own_draft(author.id, id).await?;
    draft.recipient_id = recipient.id;
    draft.title = title;
    draft.body = body;
    self
      .store
      .update_message(draft.clone())
      .await
      .map_err(Error::store)?;
    Ok(draft)
  }

  /// Turn draft `id` into a sent message with the given final content.
  pub async fn send_draft(
    &self,
    principal: &Principal,
    id: i64,
    title: String,
    body: String,
    recipient: &str,
  ) -> Result<PrivateMessage> {
    let author = self.check_permissions_to_send(principal).await?;
    let mut draft = self.own_draft(author.id, id).await?;
    let recipient = self.prepare(&title, &body, recipient).await?;

    draft.recipient_id = recipient.id;
    draft.title = title;
    draft.body = body;
    draft.status = PrivateMessageStatus::Sent;
    self
      .store
      .update_message(draft.clone())
      .await
      .map_err(Error::store)?;
    tracing::debug!(message = id, to = recipient.id, "draft sent");
    Ok(draft)
  }

  /// Read a message. Only its author and recipient see it, and not after
  /// deleting it from their folder. The recipient reading marks it read.
  pub async fn get(&self, principal: &Principal, id: i64) -> Result<PrivateMessage> {
    let user = require_user(principal)?;
    let mut message = self.find(id).await?;
    if !message.is_visible_to(user.id) {
      return Err(Error::AccessDenied(format!("message {id} is not visible to {}", user.username)));
    }
    if !message.read && !message.is_draft() && message.recipient_id == user.id {
      message.read = true;
      self
        .store
        .update_message(message.clone())
        .await
        .map_err(Error::store)?;
    }
    Ok(message)
  }

  pub async fn inbox(&self, principal: &Principal, page: PageRequest) -> Result<Page<PrivateMessage>> {
    let user = require_user(principal)?;
    self.store.inbox(user.id, page).await.map_err(Error::store)
  }

  pub async fn outbox(&self, principal: &Principal, page: PageRequest) -> Result<Page<PrivateMessage>> {
    let user = require_user(principal)?;
    self.store.outbox(user.id, page).await.map_err(Error::store)
  }

  pub async fn drafts(&self, principal: &Principal, page: PageRequest) -> Result<Page<PrivateMessage>> {
    let user = require_user(principal)?;
    self.store.drafts(user.id, page).await.map_err(Error::store)
  }

  /// Delete messages on behalf of the principal and return the folder to go
  /// back to, which is the folder of the last deleted message. Either every
  /// message is deleted or none is.
  pub async fn delete(&self, principal: &Principal, ids: &[i64]) -> Result<Folder> {
    let user = self.check_permissions_to_send(principal).await?;
    let outcome = self
      .store
      .delete_messages(user.id, ids.to_vec())
      .await
      .map_err(Error::store)?;
    match outcome {
      BatchDeletion::Done(folder) => Ok(folder),
      BatchDeletion::Missing(id) => Err(Error::not_found("private message", id)),
      BatchDeletion::NotVisible(id) => Err(Error::AccessDenied(format!(
        "message {id} is not visible to {}",
        user.username
      ))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::fixture;

  const PAGE: PageRequest = PageRequest { number: 1, size: 20 };

  #[tokio::test]
  async fn sending_requires_the_profile_permission() {
    let fx = fixture().await;
    fx.member("bob").await;
    let mute = fx.plain_user("mute").await;

    let err = fx
      .forum
      .messages
      .send_message(&mute, "hi".into(), "there".into(), "bob")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));

    let err = fx
      .forum
      .messages
      .send_message(&Principal::Anonymous, "hi".into(), "there".into(), "bob")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
  }

  #[tokio::test]
  async fn sent_message_shows_in_both_folders_and_reading_marks_it_read() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let bob = fx.member("bob").await;
    let pm = &fx.forum.messages;

    let sent = pm.send_message(&alice, "hi".into(), "there".into(), "bob").await.unwrap();
    assert_eq!(pm.inbox(&bob, PAGE).await.unwrap().total, 1);
    assert_eq!(pm.outbox(&alice, PAGE).await.unwrap().total, 1);

    assert!(!pm.get(&alice, sent.id).await.unwrap().read);
    assert!(pm.get(&bob, sent.id).await.unwrap().read);

    let carol = fx.member("carol").await;
    assert!(matches!(pm.get(&carol, sent.id).await, Err(Error::AccessDenied(_))));
  }

  #[tokio::test]
  async fn unknown_recipient_is_a_validation_error() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let err = fx
      .forum
      .messages
      .send_message(&alice, "".into(), "body".into(), "ghost")
      .await
      .unwrap_err();
    let Error::Validation(errors) = err else { panic!("expected validation error") };
    assert!(errors.has_field("recipient"));
    assert!(errors.has_field("title"));
  }

  #[tokio::test]
  async fn drafts_can_be_saved_updated_and_sent() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let bob = fx.member("bob").await;
    let pm = &fx.forum.messages;

    let draft = pm
      .save_draft(&alice, None, "bob", "draft".into(), "v1".into())
      .await
      .unwrap();
    assert!(draft.is_draft());
    assert_eq!(pm.drafts(&alice, PAGE).await.unwrap().total, 1);
    assert_eq!(pm.inbox(&bob, PAGE).await.unwrap().total, 0);
    assert!(matches!(pm.get(&bob, draft.id).await, Err(Error::AccessDenied(_))));

    let updated = pm
      .save_draft(&alice, Some(draft.id), "bob", "draft".into(), "v2".into())
      .await
      .unwrap();
    assert_eq!(updated.id, draft.id);

    let err = pm
      .save_draft(&bob, Some(draft.id), "alice", "mine".into(), "x".into())
      .await
      .unwrap_err();
    assert!(err.is_not_found());

    let sent = pm
      .send_draft(&alice, draft.id, "final".into(), "v3".into(), "bob")
      .await
      .unwrap();
    assert_eq!(sent.status, PrivateMessageStatus::Sent);
    assert_eq!(pm.drafts(&alice, PAGE).await.unwrap().total, 0);
    let inbox = pm.inbox(&bob, PAGE).await.unwrap();
    assert_eq!(inbox.content[0].body, "v3");
  }

  #[tokio::test]
  async fn deleting_hides_per_side_and_removes_when_both_sides_deleted() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let bob = fx.member("bob").await;
    let pm = &fx.forum.messages;

    let sent = pm.send_message(&alice, "hi".into(), "there".into(), "bob").await.unwrap();

    assert_eq!(pm.delete(&bob, &[sent.id]).await.unwrap(), Folder::Inbox);
    assert_eq!(pm.inbox(&bob, PAGE).await.unwrap().total, 0);
    assert_eq!(pm.outbox(&alice, PAGE).await.unwrap().total, 1);
    assert!(matches!(pm.get(&bob, sent.id).await, Err(Error::AccessDenied(_))));

    assert_eq!(pm.delete(&alice, &[sent.id]).await.unwrap(), Folder::Outbox);
    assert!(pm.get(&alice, sent.id).await.unwrap_err().is_not_found());

    let draft = pm.save_draft(&alice, None, "bob", "d".into(), "b".into()).await.unwrap();
    assert_eq!(pm.delete(&alice, &[draft.id]).await.unwrap(), Folder::Drafts);
    assert!(pm.get(&alice, draft.id).await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn failed_batch_delete_keeps_every_message() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    fx.member("bob").await;
    let carol = fx.member("carol").await;
    let pm = &fx.forum.messages;

    let mine = pm.send_message(&alice, "hi".into(), "there".into(), "bob").await.unwrap();
    let theirs = pm.send_message(&carol, "yo".into(), "there".into(), "bob").await.unwrap();

    let err = pm.delete(&alice, &[mine.id, theirs.id]).await.unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
    assert!(pm.delete(&alice, &[mine.id, 999]).await.unwrap_err().is_not_found());
    assert_eq!(pm.outbox(&alice, PAGE).await.unwrap().total, 1);
  }
}
