//! Registration, login, password recovery, activation and plugin actions.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`/`POST` | `/user/new` | `registration` view; plugin failures redirect with `reg_error` |
//! | `GET`/`POST` | `/user/new_ajax` | JSON envelope |
//! | `GET`  | `/user/activate/{uuid}` | redirect to `/login` |
//! | `GET`/`POST` | `/login` | sets session and `lang` cookies |
//! | `POST` | `/login_ajax` | JSON envelope |
//! | `GET`  | `/logout` | |
//! | `GET`/`POST` | `/password/restore` | `restorePassword` view |
//! | any    | `/plugin/{plugin_id}/{action}` | forwarded to an extended plugin |
//! | `POST` | `/usernames` | `pattern` form field |

use std::collections::BTreeMap;

use agora_core::{Error, store::ForumStore, validation::ValidationErrors};
use agora_service::{
  plugin::{Capability, PluginRequest},
  user::{RegisterUser, Session},
};
use axum::{
  Form,
  extract::{Path, Query, State},
  http::{HeaderMap, Method, StatusCode, header},
  response::{AppendHeaders, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
  AppState,
  error::ApiError,
  response::{JsonResponse, View, custom_error, see_other},
  session::{CurrentUser, expired_session_cookie, lang_cookie, request_language, session_cookie},
};

const AUTH_SERVICE_FAIL_URL: &str = "/login?login_error=3";
const REG_SERVICE_CONNECTION_ERROR_URL: &str = "/user/new?reg_error=1";
const REG_SERVICE_UNEXPECTED_ERROR_URL: &str = "/user/new?reg_error=2";

fn registration_plugin_ids<S: ForumStore>(state: &AppState<S>) -> Vec<&str> {
  state.forum.plugins.ids_with(Capability::Registration)
}

// ─── Registration ─────────────────────────────────────────────────────────────

/// `GET /user/new`
pub async fn registration_page<S: ForumStore>(State(state): State<AppState<S>>) -> View {
  View::new(
    "registration",
    json!({ "new_user": RegisterUser::default(), "registration_plugins": registration_plugin_ids(&state) }),
  )
}

/// `POST /user/new`
pub async fn register<S: ForumStore>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Form(form): Form<RegisterUser>,
) -> Result<Response, ApiError> {
  let echo = RegisterUser { password: String::new(), password_confirm: String::new(), ..form.clone() };
  match state.forum.users.register(form, request_language(&headers)).await {
    Ok(_) => Ok(View::new("afterRegistration", json!({})).into_response()),
    Err(Error::PluginConnection) => Ok(see_other(REG_SERVICE_CONNECTION_ERROR_URL)),
    Err(Error::PluginUnexpected) => Ok(see_other(REG_SERVICE_UNEXPECTED_ERROR_URL)),
    Err(Error::Validation(errors)) => Ok(
      View::new(
        "registration",
        json!({
          "new_user": echo,
          "errors": errors,
          "registration_plugins": registration_plugin_ids(&state),
        }),
      )
      .into_response(),
    ),
    Err(e) => Err(e.into()),
  }
}

/// `GET /user/new_ajax`: the ids of the registration plugins.
pub async fn registration_plugins<S: ForumStore>(
  State(state): State<AppState<S>>,
) -> JsonResponse {
  JsonResponse::success_with(registration_plugin_ids(&state))
}

/// `POST /user/new_ajax`
pub async fn register_ajax<S: ForumStore>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  Form(form): Form<RegisterUser>,
) -> Result<JsonResponse, ApiError> {
  match state.forum.users.register(form, request_language(&headers)).await {
    Ok(_) => Ok(JsonResponse::success()),
    Err(e @ (Error::PluginConnection | Error::PluginUnexpected)) => Ok(custom_error(&e)),
    Err(Error::Validation(errors)) => Ok(JsonResponse::fail_with(errors)),
    Err(e) => Err(e.into()),
  }
}

/// `GET /user/activate/{uuid}`
pub async fn activate<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(uuid): Path<String>,
) -> Result<Response, ApiError> {
  match state.forum.users.activate_account(&uuid).await {
    Ok(_) => Ok(see_other("/login")),
    Err(e) if e.is_not_found() => Ok(View::new("errors/activationExpired", json!({})).into_response()),
    Err(e) => Err(e.into()),
  }
}

// ─── Login ────────────────────────────────────────────────────────────────────

fn referer(headers: &HeaderMap) -> String {
  headers
    .get(header::REFERER)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("/")
    .to_owned()
}

/// `GET /login`: signed-in users go straight back where they came from.
pub async fn login_page(user: CurrentUser, headers: HeaderMap) -> Response {
  let referer = referer(&headers);
  if user.principal.is_anonymous() {
    View::new("login", json!({ "referer": referer })).into_response()
  } else {
    see_other(&referer)
  }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
  pub username:    String,
  pub password:    String,
  #[serde(default)]
  pub referer:     Option<String>,
  /// `"on"` when the remember-me box is ticked.
  #[serde(default)]
  pub remember_me: Option<String>,
}

impl LoginForm {
  fn remember_me(&self) -> bool { self.remember_me.as_deref() == Some("on") }
}

/// The session and locale cookies for a fresh login.
fn login_cookies<S>(state: &AppState<S>, session: &Session) -> AppendHeaders<[(header::HeaderName, String); 2]> {
  AppendHeaders([
    (header::SET_COOKIE, session_cookie(&state.config, session.token, session.remember_me)),
    (header::SET_COOKIE, lang_cookie(session.user.language)),
  ])
}

/// `POST /login`
pub async fn login<S: ForumStore>(
  State(state): State<AppState<S>>,
  Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
  let referer = form.referer.clone().unwrap_or_else(|| "/".into());
  let outcome = state
    .forum
    .users
    .login_with_lock_handling(&form.username, &form.password, form.remember_me())
    .await;
  match outcome {
    Ok(Some(session)) => Ok((login_cookies(&state, &session), see_other(&referer)).into_response()),
    Ok(None) => Ok(
      View::new(
        "login",
        json!({ "username": form.username, "login_error": 1, "referer": referer }),
      )
      .into_response(),
    ),
    Err(Error::PluginConnection | Error::PluginUnexpected) => Ok(see_other(AUTH_SERVICE_FAIL_URL)),
    Err(e) => Err(e.into()),
  }
}

/// `POST /login_ajax`
pub async fn login_ajax<S: ForumStore>(
  State(state): State<AppState<S>>,
  Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
  let outcome = state
    .forum
    .users
    .login_with_lock_handling(&form.username, &form.password, form.remember_me())
    .await;
  match outcome {
    Ok(Some(session)) => {
      Ok((login_cookies(&state, &session), JsonResponse::success()).into_response())
    }
    Ok(None) => Ok(JsonResponse::fail().into_response()),
    Err(e @ (Error::PluginConnection | Error::PluginUnexpected)) => {
      Ok(custom_error(&e).into_response())
    }
    Err(e) => Err(e.into()),
  }
}

/// `GET /logout`
pub async fn logout<S: ForumStore>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  if let Some(token) = user.token {
    state.forum.users.logout(token).await?;
  }
  Ok(
    (
      AppendHeaders([(header::SET_COOKIE, expired_session_cookie(&state.config))]),
      see_other("/"),
    )
      .into_response(),
  )
}

// ─── Password recovery ────────────────────────────────────────────────────────

/// `GET /password/restore`
pub async fn restore_password_page() -> View {
  View::new("restorePassword", json!({ "email": "" }))
}

#[derive(Debug, Deserialize)]
pub struct RestorePasswordForm {
  pub email: String,
}

/// `POST /password/restore`
pub async fn restore_password<S: ForumStore>(
  State(state): State<AppState<S>>,
  Form(form): Form<RestorePasswordForm>,
) -> Result<View, ApiError> {
  let errors = match state.forum.users.restore_password(&form.email).await {
    Ok(()) => {
      return Ok(View::new(
        "restorePassword",
        json!({ "email": form.email, "message": "label.restorePassword.completed" }),
      ));
    }
    Err(Error::Validation(errors)) => errors,
    Err(Error::MailingFailed(reason)) => {
      tracing::warn!(%reason, "password recovery mail failed");
      ValidationErrors::single("email", "email.failed")
    }
    Err(e) => return Err(e.into()),
  };
  Ok(View::new("restorePassword", json!({ "email": form.email, "errors": errors })))
}

// ─── Plugins & lookups ────────────────────────────────────────────────────────

/// `/plugin/{plugin_id}/{action}`: forward to an extended plugin. An unknown
/// plugin is logged and answered with an empty response.
pub async fn plugin_action<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path((plugin_id, action)): Path<(String, String)>,
  method: Method,
  Query(query): Query<BTreeMap<String, String>>,
  body: String,
) -> Result<Response, ApiError> {
  let plugin = match state.forum.plugins.get_plugin_by_id(&plugin_id, Capability::Extended) {
    Ok(plugin) => plugin,
    Err(e) if e.is_not_found() => {
      tracing::error!(%plugin_id, %action, "cannot perform action: plugin not found");
      return Ok(StatusCode::OK.into_response());
    }
    Err(e) => return Err(e.into()),
  };
  let Some(extended) = plugin.as_extended() else {
    return Ok(StatusCode::OK.into_response());
  };

  let request = PluginRequest { method: method.to_string(), query, body };
  let reply = extended.do_action(&plugin_id, &action, request).map_err(Error::from)?;
  let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
  Ok((status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UsernamesForm {
  pub pattern: String,
}

/// `POST /usernames`
pub async fn usernames<S: ForumStore>(
  State(state): State<AppState<S>>,
  Form(form): Form<UsernamesForm>,
) -> Result<JsonResponse, ApiError> {
  let names = state.forum.users.get_usernames(&form.pattern).await?;
  Ok(JsonResponse::success_with(names))
}
