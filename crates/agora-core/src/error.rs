//! Error types for `agora-core`.

use thiserror::Error;

use crate::{store::StoreError, validation::ValidationErrors};

#[derive(Debug, Error)]
pub enum Error {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("access denied: {0}")]
  AccessDenied(String),

  /// The permission name does not belong to a family the caller supports.
  #[error("unsupported permission: {0:?}")]
  UnsupportedPermission(String),

  #[error("validation failed: {0}")]
  Validation(ValidationErrors),

  /// A versioned row changed between read and write.
  #[error("row version conflict")]
  VersionConflict,

  #[error("plugin is not reachable")]
  PluginConnection,

  #[error("plugin failed unexpectedly")]
  PluginUnexpected,

  #[error("mailing failed: {0}")]
  MailingFailed(String),

  #[error("invalid state: {0}")]
  InvalidState(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    Self::NotFound { entity, id: id.to_string() }
  }

  /// Lift a backend error, keeping optimistic-locking conflicts
  /// distinguishable from other failures.
  pub fn store<E: StoreError>(e: E) -> Self {
    if e.is_version_conflict() {
      Self::VersionConflict
    } else {
      Self::Store(Box::new(e))
    }
  }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
