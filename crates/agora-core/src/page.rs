//! Pagination request and result types.

use serde::{Deserialize, Serialize};

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub number: u32,
  pub size:   u32,
}

impl PageRequest {
  pub fn new(number: u32, size: u32) -> Self {
    Self { number: number.max(1), size: size.max(1) }
  }

  /// Parse a page number as sent in a query string. Anything that is not a
  /// positive integer falls back to the first page.
  pub fn parse(number: Option<&str>, size: u32) -> Self {
    let number = number
      .and_then(|s| s.trim().parse::<u32>().ok())
      .unwrap_or(1);
    Self::new(number, size)
  }

  pub fn offset(&self) -> u64 { u64::from(self.number.saturating_sub(1)) * u64::from(self.size) }
}

/// One page of results plus the total element count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub content: Vec<T>,
  pub number:  u32,
  pub size:    u32,
  pub total:   u64,
}

impl<T> Page<T> {
  pub fn new(content: Vec<T>, request: PageRequest, total: u64) -> Self {
    Self { content, number: request.number, size: request.size, total }
  }

  pub fn total_pages(&self) -> u64 {
    if self.size == 0 { 0 } else { self.total.div_ceil(u64::from(self.size)) }
  }
}
