//! Topic, poll and post DAOs.

use rusqlite::OptionalExtension as _;

use agora_core::{
  page::{Page, PageRequest},
  post::Post,
  store::{PollDao, PostDao, TopicDao},
  topic::{NewTopic, Poll, PollItem, Topic},
};

use crate::{
  Error, Result,
  encode::{POST_COLUMNS, RawPoll, RawPost, RawTopic, TOPIC_COLUMNS, encode_dt, now},
  store::{SqliteStore, count_to_total, expect_row, limit_offset},
};

// ─── Row loading ─────────────────────────────────────────────────────────────

fn load_poll_items(conn: &rusqlite::Connection, poll_id: i64) -> rusqlite::Result<Vec<PollItem>> {
  let mut stmt =
    conn.prepare("SELECT id, name, votes FROM poll_items WHERE poll_id = ?1 ORDER BY id")?;
  stmt
    .query_map(rusqlite::params![poll_id], |row| {
      Ok(PollItem { id: row.get(0)?, name: row.get(1)?, votes: row.get(2)? })
    })?
    .collect()
}

/// Load a poll selected by `column` (`id` or `topic_id`).
fn load_poll(
  conn: &rusqlite::Connection,
  column: &str,
  value: i64,
) -> rusqlite::Result<Option<RawPoll>> {
  let poll = conn
    .query_row(
      &format!(
        "SELECT id, topic_id, title, ending_date, multiple_answers FROM polls WHERE {column} = ?1"
      ),
      rusqlite::params![value],
      |row| {
        Ok(RawPoll {
          id:               row.get(0)?,
          topic_id:         row.get(1)?,
          title:            row.get(2)?,
          ending_date:      row.get(3)?,
          multiple_answers: row.get(4)?,
          items:            Vec::new(),
        })
      },
    )
    .optional()?;
  let Some(mut poll) = poll else { return Ok(None) };
  poll.items = load_poll_items(conn, poll.id)?;
  Ok(Some(poll))
}

fn load_topic(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<RawTopic>> {
  let topic = conn
    .query_row(
      &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
      rusqlite::params![id],
      RawTopic::from_row,
    )
    .optional()?;
  let Some(mut topic) = topic else { return Ok(None) };
  topic.poll = load_poll(conn, "topic_id", topic.id)?;
  Ok(Some(topic))
}

fn load_post(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<RawPost>> {
  conn
    .query_row(
      &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
      rusqlite::params![id],
      RawPost::from_row,
    )
    .optional()
}

// ─── Topics ──────────────────────────────────────────────────────────────────

impl TopicDao for SqliteStore {
  async fn create_topic(
    &self,
    branch_id: i64,
    starter_id: i64,
    input: NewTopic,
  ) -> Result<(Topic, Post)> {
    let at_str = encode_dt(now());

    let (raw_topic, raw_post) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO topics (
             branch_id, title, topic_starter, created_at, modified_at,
             sticky, announcement, code_review
           ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            branch_id,
            input.title,
            starter_id,
            at_str,
            input.sticky,
            input.announcement,
            input.code_review,
          ],
        )?;
        let topic_id = tx.last_insert_rowid();

        tx.execute(
          "INSERT INTO posts (topic_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![topic_id, starter_id, input.body, at_str],
        )?;
        let post_id = tx.last_insert_rowid();

        if let Some(poll) = &input.poll {
          let ending = poll.ending_date.map(encode_dt);
          tx.execute(
            "INSERT INTO polls (topic_id, title, ending_date, multiple_answers)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![topic_id, poll.title, ending, poll.multiple_answers],
          )?;
          let poll_id = tx.last_insert_rowid();
          for item in &poll.items {
            tx.execute(
              "INSERT INTO poll_items (poll_id, name) VALUES (?1, ?2)",
              rusqlite::params![poll_id, item],
            )?;
          }
        }

        let topic = load_topic(&tx, topic_id)?;
        let post = load_post(&tx, post_id)?;
        tx.commit()?;
        Ok((topic, post))
      })
      .await?;

    let topic = raw_topic
      .ok_or(Error::NotFound { entity: "topic", id: 0 })?
      .into_topic()?;
    let post = raw_post
      .ok_or(Error::NotFound { entity: "post", id: 0 })?
      .into_post()?;
    tracing::debug!(topic = topic.id, branch = branch_id, "topic created");
    Ok((topic, post))
  }

  async fn topic_exists(&self, id: i64) -> Result<bool> {
    self.row_exists("topics", id).await
  }

  async fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
    let raw = self.conn.call(move |conn| Ok(load_topic(conn, id)?)).await?;
    raw.map(RawTopic::into_topic).transpose()
  }

  async fn list_topics(&self, branch_id: i64, page: PageRequest) -> Result<Page<Topic>> {
    let (limit, offset) = limit_offset(page);

    let (raws, total): (Vec<RawTopic>, i64) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          "SELECT COUNT(*) FROM topics WHERE branch_id = ?1",
          rusqlite::params![branch_id],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {TOPIC_COLUMNS} FROM topics WHERE branch_id = ?1
           ORDER BY sticky DESC, modified_at DESC, id DESC
           LIMIT ?2 OFFSET ?3"
        ))?;
        let mut raws = stmt
          .query_map(rusqlite::params![branch_id, limit, offset], RawTopic::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for raw in &mut raws {
          raw.poll = load_poll(conn, "topic_id", raw.id)?;
        }
        Ok((raws, total))
      })
      .await?;

    let topics = raws
      .into_iter()
      .map(RawTopic::into_topic)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(topics, page, count_to_total(total)))
  }

  async fn topic_ids_in_branch(&self, branch_id: i64) -> Result<Vec<i64>> {
    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT id FROM topics WHERE branch_id = ?1 ORDER BY id")?;
        let ids = stmt
          .query_map(rusqlite::params![branch_id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }

  async fn update_topic(&self, topic: Topic) -> Result<()> {
    let id = topic.id;
    let at_str = encode_dt(now());

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE topics SET branch_id = ?2, title = ?3, closed = ?4, sticky = ?5,
             announcement = ?6, code_review = ?7, modified_at = ?8
           WHERE id = ?1",
          rusqlite::params![
            topic.id,
            topic.branch_id,
            topic.title,
            topic.closed,
            topic.sticky,
            topic.announcement,
            topic.code_review,
            at_str,
          ],
        )?)
      })
      .await?;
    expect_row(affected, "topic", id)
  }

  async fn delete_topic(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM topics WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
      })
      .await?;
    tracing::debug!(topic = id, "topic deleted");
    Ok(())
  }

  async fn subscribe(&self, topic_id: i64, user_id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO topic_subscriptions (topic_id, user_id) VALUES (?1, ?2)",
          rusqlite::params![topic_id, user_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn unsubscribe(&self, topic_id: i64, user_id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM topic_subscriptions WHERE topic_id = ?1 AND user_id = ?2",
          rusqlite::params![topic_id, user_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn subscribers(&self, topic_id: i64) -> Result<Vec<i64>> {
    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT user_id FROM topic_subscriptions WHERE topic_id = ?1 ORDER BY user_id",
        )?;
        let ids = stmt
          .query_map(rusqlite::params![topic_id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids)
  }
}

// ─── Polls ───────────────────────────────────────────────────────────────────

impl PollDao for SqliteStore {
  async fn has_voted(&self, poll_id: i64, user_id: i64) -> Result<bool> {
    let voted = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM poll_voters WHERE poll_id = ?1 AND user_id = ?2",
            rusqlite::params![poll_id, user_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;
    Ok(voted)
  }

  async fn record_votes(&self, poll_id: i64, user_id: i64, item_ids: Vec<i64>) -> Result<Poll> {
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO poll_voters (poll_id, user_id) VALUES (?1, ?2)",
          rusqlite::params![poll_id, user_id],
        )?;
        for item_id in &item_ids {
          tx.execute(
            "UPDATE poll_items SET votes = votes + 1 WHERE id = ?1 AND poll_id = ?2",
            rusqlite::params![item_id, poll_id],
          )?;
        }
        let poll = load_poll(&tx, "id", poll_id)?;
        tx.commit()?;
        Ok(poll)
      })
      .await?;

    raw
      .ok_or(Error::NotFound { entity: "poll", id: poll_id })?
      .into_poll()
  }
}

// ─── Posts ───────────────────────────────────────────────────────────────────

impl PostDao for SqliteStore {
  async fn add_post(&self, topic_id: i64, author_id: i64, content: String) -> Result<Post> {
    let at_str = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO posts (topic_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![topic_id, author_id, content, at_str],
        )?;
        let post_id = tx.last_insert_rowid();
        tx.execute(
          "UPDATE topics SET modified_at = ?2 WHERE id = ?1",
          rusqlite::params![topic_id, at_str],
        )?;
        let post = load_post(&tx, post_id)?;
        tx.commit()?;
        Ok(post)
      })
      .await?;

    raw
      .ok_or(Error::NotFound { entity: "post", id: 0 })?
      .into_post()
  }

  async fn post_exists(&self, id: i64) -> Result<bool> {
    self.row_exists("posts", id).await
  }

  async fn get_post(&self, id: i64) -> Result<Option<Post>> {
    let raw = self.conn.call(move |conn| Ok(load_post(conn, id)?)).await?;
    raw.map(RawPost::into_post).transpose()
  }

  async fn list_posts(&self, topic_id: i64, page: PageRequest) -> Result<Page<Post>> {
    let (limit, offset) = limit_offset(page);

    let (raws, total): (Vec<RawPost>, i64) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          "SELECT COUNT(*) FROM posts WHERE topic_id = ?1",
          rusqlite::params![topic_id],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {POST_COLUMNS} FROM posts WHERE topic_id = ?1
           ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
        ))?;
        let raws = stmt
          .query_map(rusqlite::params![topic_id, limit, offset], RawPost::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((raws, total))
      })
      .await?;

    let posts = raws
      .into_iter()
      .map(RawPost::into_post)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(posts, page, count_to_total(total)))
  }

  async fn first_post_id(&self, topic_id: i64) -> Result<Option<i64>> {
    let id = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id FROM posts WHERE topic_id = ?1 ORDER BY created_at, id LIMIT 1",
            rusqlite::params![topic_id],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;
    Ok(id)
  }

  async fn update_post(&self, id: i64, content: String) -> Result<()> {
    let at_str = encode_dt(now());

    let affected = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let affected = tx.execute(
          "UPDATE posts SET content = ?2, modified_at = ?3 WHERE id = ?1",
          rusqlite::params![id, content, at_str],
        )?;
        tx.execute(
          "UPDATE topics SET modified_at = ?2
           WHERE id = (SELECT topic_id FROM posts WHERE id = ?1)",
          rusqlite::params![id, at_str],
        )?;
        tx.commit()?;
        Ok(affected)
      })
      .await?;
    expect_row(affected, "post", id)
  }

  async fn delete_post(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM posts WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
