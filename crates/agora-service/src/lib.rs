//! Transactional services of the Agora forum.
//!
//! Every service is generic over a [`ForumStore`] backend and takes the acting
//! [`Principal`](agora_core::user::Principal) as an explicit argument. The
//! [`Forum`] bundle wires all of them onto one store.

#![allow(async_fn_in_trait)]

pub mod bootstrap;
pub mod branch;
pub mod mail;
pub mod message;
pub mod password;
pub mod permission;
pub mod plugin;
pub mod post;
pub mod topic;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use agora_core::store::ForumStore;

use crate::{
  branch::BranchService, mail::Mailer, message::PrivateMessageService,
  permission::PermissionService, plugin::PluginRegistry, post::PostService,
  topic::TopicService,
  user::{SessionLifetimes, UserService},
};

/// All services of one forum, sharing a single store.
pub struct Forum<S> {
  pub permissions: PermissionService<S>,
  pub branches:    BranchService<S, TopicService<S>>,
  pub topics:      TopicService<S>,
  pub posts:       PostService<S>,
  pub users:       UserService<S>,
  pub messages:    PrivateMessageService<S>,
  pub plugins:     Arc<PluginRegistry>,
}

impl<S: ForumStore> Forum<S> {
  /// `base_url` prefixes the links placed in outgoing mail.
  pub fn new(
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
    plugins: PluginRegistry,
    base_url: impl Into<String>,
  ) -> Self {
    let plugins = Arc::new(plugins);
    let topics = TopicService::new(store.clone());
    Self {
      permissions: PermissionService::new(store.clone()),
      branches:    BranchService::new(store.clone(), topics.clone()),
      topics,
      posts:       PostService::new(store.clone()),
      users:       UserService::new(store.clone(), mailer, plugins.clone(), base_url),
      messages:    PrivateMessageService::new(store),
      plugins,
    }
  }

  pub fn with_session_lifetimes(mut self, sessions: SessionLifetimes) -> Self {
    self.users = self.users.with_session_lifetimes(sessions);
    self
  }
}
