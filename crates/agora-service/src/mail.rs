//! Outgoing mail seam.
//!
//! Delivering mail is outside the forum's concern; services hand a [`Mail`] to
//! a [`Mailer`] and only care whether the hand-off failed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
  pub to:      String,
  pub subject: String,
  pub body:    String,
}

#[derive(Debug, Error)]
#[error("mail to {to} failed: {reason}")]
pub struct MailError {
  pub to:     String,
  pub reason: String,
}

pub trait Mailer: Send + Sync {
  fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Writes every mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
  fn send(&self, mail: Mail) -> Result<(), MailError> {
    tracing::info!(to = %mail.to, subject = %mail.subject, "mail");
    tracing::debug!(body = %mail.body);
    Ok(())
  }
}
