//! Response shapes shared by the controllers: view models, the JSON status
//! envelope and `303 See Other` redirects.

use agora_core::Error;
use axum::{
  Json,
  response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

/// A named view with its model, standing in for a rendered page.
#[derive(Debug, Serialize)]
pub struct View {
  pub view:  &'static str,
  pub model: Value,
}

impl View {
  pub fn new(view: &'static str, model: Value) -> Self { Self { view, model } }
}

impl IntoResponse for View {
  fn into_response(self) -> Response { Json(self).into_response() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JsonStatus {
  Success,
  Fail,
}

/// `{"status": "SUCCESS" | "FAIL", "result": ...}`
#[derive(Debug, Serialize)]
pub struct JsonResponse {
  pub status: JsonStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
}

impl JsonResponse {
  pub fn success() -> Self { Self { status: JsonStatus::Success, result: None } }

  pub fn fail() -> Self { Self { status: JsonStatus::Fail, result: None } }

  pub fn success_with(result: impl Serialize) -> Self {
    Self { status: JsonStatus::Success, result: serde_json::to_value(result).ok() }
  }

  pub fn fail_with(result: impl Serialize) -> Self {
    Self { status: JsonStatus::Fail, result: serde_json::to_value(result).ok() }
  }
}

impl IntoResponse for JsonResponse {
  fn into_response(self) -> Response { Json(self).into_response() }
}

/// `FAIL` envelope naming the plugin failure as `customError`.
pub fn custom_error(error: &Error) -> JsonResponse {
  let code = match error {
    Error::PluginConnection => "connectionError",
    _ => "unexpectedError",
  };
  JsonResponse::fail_with(json!({ "customError": code }))
}

pub fn see_other(location: &str) -> Response { Redirect::to(location).into_response() }
