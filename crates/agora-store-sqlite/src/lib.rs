//! SQLite backend for the Agora forum.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod acl;
mod encode;
mod messages;
mod schema;
mod store;
mod topics;
mod users;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
