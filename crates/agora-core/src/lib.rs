//! Core types and trait definitions for the Agora forum.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Services, storage backends and the web layer all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod acl;
pub mod error;
pub mod forum;
pub mod message;
pub mod page;
pub mod post;
pub mod store;
pub mod topic;
pub mod user;
pub mod validation;

pub use error::{Error, Result};
