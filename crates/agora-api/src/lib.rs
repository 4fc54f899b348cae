//! HTTP layer of the Agora forum.
//!
//! Exposes an axum [`Router`] over an [`agora_service::Forum`]. Handlers
//! answer with JSON view models, the `SUCCESS`/`FAIL` envelope or
//! `303 See Other` redirects. The acting user comes from the session cookie.

pub mod error;
pub mod etag;
pub mod forum;
pub mod messages;
pub mod response;
pub mod session;
pub mod users;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use agora_core::store::ForumStore;
use agora_service::Forum;
use axum::{
  Router,
  routing::{any, get, post},
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Web-layer settings, filled from the server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Page size of topic, post and message listings.
  pub page_size:        u32,
  pub session_cookie:   String,
  /// Lifetime of a "remember me" session cookie.
  pub remember_me_days: u32,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self { page_size: 20, session_cookie: "agora_session".into(), remember_me_days: 14 }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub forum:  Arc<Forum<S>>,
  pub config: Arc<ApiConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self { Self { forum: self.forum.clone(), config: self.config.clone() } }
}

impl<S> AppState<S> {
  pub fn new(forum: Forum<S>, config: ApiConfig) -> Self {
    Self { forum: Arc::new(forum), config: Arc::new(config) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the forum router.
pub fn router<S: ForumStore + 'static>(state: AppState<S>) -> Router {
  Router::new()
    // Users
    .route("/user/new", get(users::registration_page::<S>).post(users::register::<S>))
    .route(
      "/user/new_ajax",
      get(users::registration_plugins::<S>).post(users::register_ajax::<S>),
    )
    .route("/user/activate/{uuid}", get(users::activate::<S>))
    .route("/login", get(users::login_page).post(users::login::<S>))
    .route("/login_ajax", post(users::login_ajax::<S>))
    .route("/logout", get(users::logout::<S>))
    .route(
      "/password/restore",
      get(users::restore_password_page).post(users::restore_password::<S>),
    )
    .route("/plugin/{plugin_id}/{action}", any(users::plugin_action::<S>))
    .route("/usernames", post(users::usernames::<S>))
    // Sections & branches
    .route("/sections", get(forum::sections::<S>))
    .route("/sections/{id}/available", get(forum::available_in_section::<S>))
    .route("/branches/available", get(forum::available_branches::<S>))
    .route("/branches/{id}", get(forum::branch::<S>))
    .route("/branches/{id}/edit", post(forum::edit_branch::<S>))
    .route("/branches/{id}/topics", post(forum::create_topic::<S>))
    .route("/branches/{id}/topics/delete", post(forum::delete_all_topics::<S>))
    // Topics & posts
    .route("/topics/{id}", get(forum::topic::<S>))
    .route("/topics/{id}/posts", post(forum::reply::<S>))
    .route("/topics/{id}/edit", post(forum::edit_topic::<S>))
    .route("/topics/{id}/move", post(forum::move_topic::<S>))
    .route("/topics/{id}/close", post(forum::close_topic::<S>))
    .route("/topics/{id}/open", post(forum::open_topic::<S>))
    .route("/topics/{id}/delete", post(forum::delete_topic::<S>))
    .route("/topics/{id}/vote", post(forum::vote::<S>))
    .route("/posts/{id}/edit", post(forum::edit_post::<S>))
    .route("/posts/{id}/delete", post(forum::delete_post::<S>))
    // Private messages
    .route("/inbox", get(messages::inbox::<S>))
    .route("/outbox", get(messages::outbox::<S>))
    .route("/drafts", get(messages::drafts::<S>))
    .route("/pm/new", get(messages::new_message::<S>))
    .route("/pm/send", post(messages::send::<S>))
    .route("/pm/draft", post(messages::save_draft::<S>))
    .route("/pm/delete", post(messages::delete::<S>))
    .route("/pm/{id}", get(messages::show::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
