//! Private message DAO.

use rusqlite::OptionalExtension as _;

use agora_core::{
  message::{BatchDeletion, Deletion, Folder, NewMessage, PrivateMessage},
  page::{Page, PageRequest},
  store::MessageDao,
};

use crate::{
  Result,
  encode::{MESSAGE_COLUMNS, RawMessage, encode_dt, encode_status, now},
  store::{SqliteStore, count_to_total, expect_row, limit_offset},
};

/// The folder queries: owning column and the statuses still visible there.
const INBOX: &str = "recipient_id = ?1 AND status IN ('SENT', 'DELETED_FROM_OUTBOX')";
const OUTBOX: &str = "author_id = ?1 AND status IN ('SENT', 'DELETED_FROM_INBOX')";
const DRAFTS: &str = "author_id = ?1 AND status = 'DRAFT'";

impl SqliteStore {
  async fn message_folder(
    &self,
    condition: &'static str,
    user_id: i64,
    page: PageRequest,
  ) -> Result<Page<PrivateMessage>> {
    let (limit, offset) = limit_offset(page);

    let (raws, total): (Vec<RawMessage>, i64) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM private_messages WHERE {condition}"),
          rusqlite::params![user_id],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM private_messages WHERE {condition}
           ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let raws = stmt
          .query_map(rusqlite::params![user_id, limit, offset], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((raws, total))
      })
      .await?;

    let messages = raws
      .into_iter()
      .map(RawMessage::into_message)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(messages, page, count_to_total(total)))
  }
}

impl MessageDao for SqliteStore {
  async fn add_message(&self, input: NewMessage) -> Result<PrivateMessage> {
    let created_at = now();
    let at_str = encode_dt(created_at);
    let status = encode_status(input.status);
    let (author_id, recipient_id) = (input.author_id, input.recipient_id);
    let (title, body) = (input.title.clone(), input.body.clone());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO private_messages (author_id, recipient_id, title, body, created_at, status)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![author_id, recipient_id, title, body, at_str, status],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(PrivateMessage {
      id,
      author_id: input.author_id,
      recipient_id: input.recipient_id,
      title: input.title,
      body: input.body,
      created_at,
      read: false,
      status: input.status,
    })
  }

  async fn get_message(&self, id: i64) -> Result<Option<PrivateMessage>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM private_messages WHERE id = ?1"),
            rusqlite::params![id],
            RawMessage::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawMessage::into_message).transpose()
  }

  async fn update_message(&self, message: PrivateMessage) -> Result<()> {
    let id = message.id;
    let status = encode_status(message.status);

    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE private_messages
           SET recipient_id = ?2, title = ?3, body = ?4, read = ?5, status = ?6
           WHERE id = ?1",
          rusqlite::params![
            message.id,
            message.recipient_id,
            message.title,
            message.body,
            message.read,
            status,
          ],
        )?)
      })
      .await?;
    expect_row(affected, "private message", id)
  }

  async fn delete_messages(&self, user_id: i64, ids: Vec<i64>) -> Result<BatchDeletion> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut folder = Folder::Inbox;
        for id in ids {
          let raw = tx
            .query_row(
              &format!("SELECT {MESSAGE_COLUMNS} FROM private_messages WHERE id = ?1"),
              rusqlite::params![id],
              RawMessage::from_row,
            )
            .optional()?;
          let Some(raw) = raw else {
            return Ok(Ok(BatchDeletion::Missing(id)));
          };
          let message = match raw.into_message() {
            Ok(message) => message,
            Err(e) => return Ok(Err(e)),
          };
          let Some(deletion) = message.deletion_by(user_id) else {
            return Ok(Ok(BatchDeletion::NotVisible(id)));
          };
          folder = message.folder_for(user_id);
          match deletion {
            Deletion::Remove => {
              tx.execute("DELETE FROM private_messages WHERE id = ?1", rusqlite::params![id])?
            }
            Deletion::MarkAs(status) => tx.execute(
              "UPDATE private_messages SET status = ?2 WHERE id = ?1",
              rusqlite::params![id, encode_status(status)],
            )?,
          };
        }
        tx.commit()?;
        Ok(Ok(BatchDeletion::Done(folder)))
      })
      .await?;
    outcome
  }

  async fn inbox(&self, user_id: i64, page: PageRequest) -> Result<Page<PrivateMessage>> {
    self.message_folder(INBOX, user_id, page).await
  }

  async fn outbox(&self, user_id: i64, page: PageRequest) -> Result<Page<PrivateMessage>> {
    self.message_folder(OUTBOX, user_id, page).await
  }

  async fn drafts(&self, user_id: i64, page: PageRequest) -> Result<Page<PrivateMessage>> {
    self.message_folder(DRAFTS, user_id, page).await
  }
}
