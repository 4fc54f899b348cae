//! Registry of pre-registered plugins.
//!
//! A plugin advertises what it can do through the `as_*` accessors; a
//! [`Capability`] filter on lookup replaces any runtime type inspection.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use agora_core::{Error, Result, validation::ValidationErrors};

use crate::user::RegisterUser;

/// Failure reported by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
  /// The service backing the plugin could not be reached.
  #[error("no connection to plugin service")]
  NoConnection,

  #[error("unexpected plugin error: {0}")]
  Unexpected(String),
}

impl From<PluginError> for Error {
  fn from(e: PluginError) -> Self {
    match e {
      PluginError::NoConnection => Error::PluginConnection,
      PluginError::Unexpected(reason) => {
        tracing::warn!(%reason, "plugin failed");
        Error::PluginUnexpected
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
  Registration,
  Authentication,
  Extended,
}

/// Identity details vouched for by an authentication plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
  pub username: String,
  pub email:    String,
}

/// The parts of an HTTP request forwarded to an extended plugin action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginRequest {
  pub method: String,
  pub query:  BTreeMap<String, String>,
  pub body:   String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResponse {
  pub status:       u16,
  pub content_type: String,
  pub body:         String,
}

impl PluginResponse {
  pub fn ok(content_type: impl Into<String>, body: impl Into<String>) -> Self {
    Self { status: 200, content_type: content_type.into(), body: body.into() }
  }
}

pub trait RegistrationPlugin: Send + Sync {
  /// Validate and register `form` with the external service. Field problems
  /// come back as validation errors; transport problems as [`PluginError`].
  fn register_user(&self, form: &RegisterUser) -> Result<ValidationErrors, PluginError>;
}

pub trait AuthenticationPlugin: Send + Sync {
  /// `Ok(None)` means the credentials were rejected.
  fn authenticate(
    &self,
    username: &str,
    password: &str,
  ) -> Result<Option<AuthenticatedUser>, PluginError>;
}

pub trait ExtendedPlugin: Send + Sync {
  fn do_action(
    &self,
    plugin_id: &str,
    action: &str,
    request: PluginRequest,
  ) -> Result<PluginResponse, PluginError>;
}

pub trait Plugin: Send + Sync {
  fn name(&self) -> &str;

  fn as_registration(&self) -> Option<&dyn RegistrationPlugin> { None }

  fn as_authentication(&self) -> Option<&dyn AuthenticationPlugin> { None }

  fn as_extended(&self) -> Option<&dyn ExtendedPlugin> { None }

  fn offers(&self, capability: Capability) -> bool {
    match capability {
      Capability::Registration => self.as_registration().is_some(),
      Capability::Authentication => self.as_authentication().is_some(),
      Capability::Extended => self.as_extended().is_some(),
    }
  }
}

#[derive(Default)]
pub struct PluginRegistry {
  plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
  pub fn new() -> Self { Self::default() }

  pub fn register(&mut self, id: impl Into<String>, plugin: Arc<dyn Plugin>) {
    let id = id.into();
    tracing::info!(plugin = %id, name = plugin.name(), "plugin registered");
    self.plugins.insert(id, plugin);
  }

  pub fn with(mut self, id: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
    self.register(id, plugin);
    self
  }

  /// The plugin registered as `id`, provided it offers `capability`.
  pub fn get_plugin_by_id(&self, id: &str, capability: Capability) -> Result<Arc<dyn Plugin>> {
    self
      .plugins
      .get(id)
      .filter(|p| p.offers(capability))
      .cloned()
      .ok_or_else(|| Error::not_found("plugin", id))
  }

  /// Ids of the plugins offering `capability`, in id order.
  pub fn ids_with(&self, capability: Capability) -> Vec<&str> {
    self
      .plugins
      .iter()
      .filter(|(_, p)| p.offers(capability))
      .map(|(id, _)| id.as_str())
      .collect()
  }

  pub fn registration_plugins(&self) -> impl Iterator<Item = (&str, &dyn RegistrationPlugin)> {
    self
      .plugins
      .iter()
      .filter_map(|(id, p)| p.as_registration().map(|r| (id.as_str(), r)))
  }

  pub fn authentication_plugins(
    &self,
  ) -> impl Iterator<Item = (&str, &dyn AuthenticationPlugin)> {
    self
      .plugins
      .iter()
      .filter_map(|(id, p)| p.as_authentication().map(|a| (id.as_str(), a)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Echo;

  impl ExtendedPlugin for Echo {
    fn do_action(
      &self,
      plugin_id: &str,
      action: &str,
      request: PluginRequest,
    ) -> Result<PluginResponse, PluginError> {
      Ok(PluginResponse::ok("text/plain", format!("{plugin_id}/{action}:{}", request.body)))
    }
  }

  impl Plugin for Echo {
    fn name(&self) -> &str { "echo" }

    fn as_extended(&self) -> Option<&dyn ExtendedPlugin> { Some(self) }
  }

  #[test]
  fn lookup_filters_by_capability() {
    let registry = PluginRegistry::new().with("7", Arc::new(Echo));

    let plugin = registry.get_plugin_by_id("7", Capability::Extended).unwrap();
    let response = plugin
      .as_extended()
      .unwrap()
      .do_action("7", "ping", PluginRequest { body: "x".into(), ..Default::default() })
      .unwrap();
    assert_eq!(response.body, "7/ping:x");

    assert!(matches!(
      registry.get_plugin_by_id("7", Capability::Registration),
      Err(e) if e.is_not_found()
    ));
    assert!(matches!(
      registry.get_plugin_by_id("8", Capability::Extended),
      Err(e) if e.is_not_found()
    ));
    assert_eq!(registry.ids_with(Capability::Extended), ["7"]);
    assert_eq!(registry.registration_plugins().count(), 0);
  }

  #[test]
  fn plugin_errors_map_to_domain_errors() {
    assert!(matches!(Error::from(PluginError::NoConnection), Error::PluginConnection));
    assert!(matches!(
      Error::from(PluginError::Unexpected("boom".into())),
      Error::PluginUnexpected
    ));
  }
}
