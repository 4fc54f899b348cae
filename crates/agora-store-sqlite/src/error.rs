//! Error type for `agora-store-sqlite`.

use agora_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),

  /// An update addressed a row that does not exist.
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: i64 },

  /// The row version moved since it was read.
  #[error("version conflict on {entity} {id}")]
  VersionConflict { entity: &'static str, id: i64 },
}

impl StoreError for Error {
  fn is_version_conflict(&self) -> bool { matches!(self, Self::VersionConflict { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
