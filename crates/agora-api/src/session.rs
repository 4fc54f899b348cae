//! Session-cookie extractor and the cookies set on login.

use agora_core::{
  store::ForumStore,
  user::{Language, Principal},
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use uuid::Uuid;

use crate::{ApiConfig, AppState, error::ApiError};

/// Name of the cookie carrying the interface locale.
pub const LANG_COOKIE: &str = "lang";

/// The principal behind the request's session cookie. Anonymous when there
/// is no cookie or the session is unknown.
#[derive(Debug, Clone)]
pub struct CurrentUser {
  pub principal: Principal,
  pub token:     Option<Uuid>,
}

impl<S: ForumStore + 'static> FromRequestParts<AppState<S>> for CurrentUser {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let token = cookie(&parts.headers, &state.config.session_cookie)
      .and_then(|value| Uuid::parse_str(value).ok());
    let principal = state.forum.users.current_user(token).await?;
    Ok(Self { principal, token })
  }
}

/// Value of cookie `name` from the `Cookie` headers.
pub fn cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(key, _)| *key == name)
    .map(|(_, value)| value)
}

/// The language a request asks for: the `lang` cookie, then the first
/// `Accept-Language` tag.
pub fn request_language(headers: &HeaderMap) -> Language {
  let tag = cookie(headers, LANG_COOKIE).or_else(|| {
    headers
      .get(header::ACCEPT_LANGUAGE)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split([',', ';']).next())
  });
  tag.map(Language::by_locale).unwrap_or_default()
}

pub fn session_cookie(config: &ApiConfig, token: Uuid, remember_me: bool) -> String {
  let mut cookie = format!("{}={token}; Path=/; HttpOnly; SameSite=Lax", config.session_cookie);
  if remember_me {
    cookie.push_str(&format!("; Max-Age={}", u64::from(config.remember_me_days) * 86_400));
  }
  cookie
}

pub fn expired_session_cookie(config: &ApiConfig) -> String {
  format!("{}=; Path=/; HttpOnly; Max-Age=0", config.session_cookie)
}

pub fn lang_cookie(language: Language) -> String {
  format!("{LANG_COOKIE}={}; Path=/", language.locale())
}
