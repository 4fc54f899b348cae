//! Field-level validation failures, surfaced inline by the web layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single rejected form field with a message code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  pub field: String,
  pub code:  String,
}

/// An ordered collection of [`FieldError`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
  pub fn new() -> Self { Self::default() }

  pub fn add(&mut self, field: impl Into<String>, code: impl Into<String>) {
    self.0.push(FieldError { field: field.into(), code: code.into() });
  }

  pub fn single(field: impl Into<String>, code: impl Into<String>) -> Self {
    let mut errors = Self::new();
    errors.add(field, code);
    errors
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn has_field(&self, field: &str) -> bool {
    self.0.iter().any(|e| e.field == field)
  }

  pub fn errors(&self) -> &[FieldError] { &self.0 }

  pub fn extend(&mut self, other: ValidationErrors) { self.0.extend(other.0); }

  /// `Ok(())` when nothing was rejected, otherwise [`Error::Validation`].
  pub fn into_result(self) -> Result<()> {
    if self.is_empty() { Ok(()) } else { Err(Error::Validation(self)) }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> =
      self.0.iter().map(|e| format!("{}: {}", e.field, e.code)).collect();
    f.write_str(&parts.join(", "))
  }
}
