//! ETag computation for topic pages.
//!
//! The tag is a SHA-256 hash over the topic's modification time, its poll
//! tallies and the `(id, modified)` pairs of the posts on the page, so any
//! edit, reply or vote changes it.

use agora_core::{page::Page, post::Post, topic::Topic};
use sha2::{Digest, Sha256};

pub fn topic_page_etag(topic: &Topic, posts: &Page<Post>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(topic.id.to_le_bytes());
  hasher.update(topic.modified_at.timestamp_micros().to_le_bytes());
  hasher.update([u8::from(topic.closed)]);
  if let Some(poll) = &topic.poll {
    for item in &poll.items {
      hasher.update(item.id.to_le_bytes());
      hasher.update(item.votes.to_le_bytes());
    }
  }
  hasher.update(posts.number.to_le_bytes());
  hasher.update(posts.total.to_le_bytes());
  for post in &posts.content {
    let modified = post.modified_at.unwrap_or(post.created_at);
    hasher.update(post.id.to_le_bytes());
    hasher.update(modified.timestamp_micros().to_le_bytes());
  }
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Whether an `If-None-Match` value names `etag`, quoted or not.
pub fn matches(if_none_match: &str, etag: &str) -> bool {
  let etag = etag.trim_matches('"');
  if_none_match
    .split(',')
    .map(|candidate| candidate.trim().trim_start_matches("W/").trim_matches('"'))
    .any(|candidate| candidate == "*" || candidate == etag)
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use agora_core::page::PageRequest;

  use super::*;

  fn topic() -> Topic {
    let ts = Utc.timestamp_opt(1_000, 0).unwrap();
    Topic {
      id:            1,
      branch_id:     1,
      title:         "Hello".into(),
      topic_starter: 1,
      created_at:    ts,
      modified_at:   ts,
      closed:        false,
      sticky:        false,
      announcement:  false,
      code_review:   false,
      poll:          None,
    }
  }

  fn post(id: i64, edited: Option<i64>) -> Post {
    Post {
      id,
      topic_id: 1,
      author_id: 1,
      content: "text".into(),
      created_at: Utc.timestamp_opt(1_000, 0).unwrap(),
      modified_at: edited.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
    }
  }

  fn page(posts: Vec<Post>) -> Page<Post> {
    let total = posts.len() as u64;
    Page::new(posts, PageRequest::new(1, 20), total)
  }

  #[test]
  fn editing_a_post_changes_the_tag() {
    let before = topic_page_etag(&topic(), &page(vec![post(1, None)]));
    let after = topic_page_etag(&topic(), &page(vec![post(1, Some(2_000))]));
    assert_ne!(before, after);
    assert_eq!(before, topic_page_etag(&topic(), &page(vec![post(1, None)])));
  }

  #[test]
  fn if_none_match_accepts_bare_weak_and_listed_tags() {
    let etag = topic_page_etag(&topic(), &page(vec![]));
    let bare = etag.trim_matches('"').to_owned();
    assert!(matches(&etag, &etag));
    assert!(matches(&bare, &etag));
    assert!(matches(&format!("\"other\", W/{etag}"), &etag));
    assert!(!matches("\"other\"", &etag));
  }
}
