//! Private-message folders, composing and deleting.

use agora_core::{
  Error, message::PrivateMessage, page::Page, store::ForumStore, validation::ValidationErrors,
};
use axum::{
  Form,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
  AppState,
  error::ApiError,
  forum::PageParams,
  response::{View, see_other},
  session::CurrentUser,
};

fn folder_view(view: &'static str, page: Page<PrivateMessage>) -> View {
  let total_pages = page.total_pages();
  View::new(view, json!({ "messages": page, "total_pages": total_pages }))
}

/// `GET /inbox[?page=n]`
pub async fn inbox<S: ForumStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<PageParams>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let page = params.request_size(state.config.page_size);
  let messages = state.forum.messages.inbox(&user.principal, page).await?;
  Ok(folder_view("pm/inbox", messages))
}

/// `GET /outbox[?page=n]`
pub async fn outbox<S: ForumStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<PageParams>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let page = params.request_size(state.config.page_size);
  let messages = state.forum.messages.outbox(&user.principal, page).await?;
  Ok(folder_view("pm/outbox", messages))
}

/// `GET /drafts[?page=n]`
pub async fn drafts<S: ForumStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<PageParams>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let page = params.request_size(state.config.page_size);
  let messages = state.forum.messages.drafts(&user.principal, page).await?;
  Ok(folder_view("pm/drafts", messages))
}

#[derive(Debug, Default, Deserialize)]
pub struct ComposeParams {
  /// Pre-filled recipient.
  pub recipient: Option<String>,
}

/// `GET /pm/new[?recipient=name]`
pub async fn new_message<S: ForumStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<ComposeParams>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  state.forum.messages.check_permissions_to_send(&user.principal).await?;
  Ok(View::new(
    "pm/pmForm",
    json!({ "recipient": params.recipient.unwrap_or_default(), "title": "", "body": "" }),
  ))
}

/// `GET /pm/{id}`: drafts open in the compose form.
pub async fn show<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let message = state.forum.messages.get(&user.principal, id).await?;
  if message.is_draft() {
    let recipient = state.forum.users.get(message.recipient_id).await?;
    return Ok(View::new(
      "pm/pmForm",
      json!({
        "id": message.id,
        "recipient": recipient.username,
        "title": message.title,
        "body": message.body,
      }),
    ));
  }
  Ok(View::new("pm/showPm", json!({ "message": message })))
}

#[derive(Debug, Deserialize)]
pub struct MessageForm {
  /// Set when the form was opened from a draft.
  #[serde(default)]
  pub id:        Option<i64>,
  pub recipient: String,
  pub title:     String,
  pub body:      String,
}

impl MessageForm {
  fn echo(&self, errors: &ValidationErrors) -> View {
    View::new(
      "pm/pmForm",
      json!({
        "id": self.id,
        "recipient": self.recipient,
        "title": self.title,
        "body": self.body,
        "errors": errors,
      }),
    )
  }
}

/// `POST /pm/send`: sends a fresh message or a draft when `id` is set.
pub async fn send<S: ForumStore>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
  let pm = &state.forum.messages;
  let outcome = match form.id {
    Some(id) => {
      pm.send_draft(&user.principal, id, form.title.clone(), form.body.clone(), &form.recipient)
        .await
    }
    None => {
      pm.send_message(&user.principal, form.title.clone(), form.body.clone(), &form.recipient)
        .await
    }
  };
  match outcome {
    Ok(_) => Ok(see_other("/outbox")),
    Err(Error::Validation(errors)) => Ok(form.echo(&errors).into_response()),
    Err(e) => Err(e.into()),
  }
}

/// `POST /pm/draft`
pub async fn save_draft<S: ForumStore>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
  let outcome = state
    .forum
    .messages
    .save_draft(&user.principal, form.id, &form.recipient, form.title.clone(), form.body.clone())
    .await;
  match outcome {
    Ok(_) => Ok(see_other("/drafts")),
    Err(Error::Validation(errors)) => Ok(form.echo(&errors).into_response()),
    Err(e) => Err(e.into()),
  }
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
  /// Comma-separated message ids.
  pub ids: String,
}

/// `POST /pm/delete`: back to the folder the messages were in.
pub async fn delete<S: ForumStore>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Form(form): Form<DeleteForm>,
) -> Result<Response, ApiError> {
  let ids = form
    .ids
    .split(',')
    .map(str::trim)
    .filter(|id| !id.is_empty())
    .map(|id| id.parse::<i64>().map_err(|_| ApiError::BadRequest(format!("message id {id:?}"))))
    .collect::<Result<Vec<_>, _>>()?;
  let folder = state.forum.messages.delete(&user.principal, &ids).await?;
  Ok(see_other(&format!("/{folder}")))
}
