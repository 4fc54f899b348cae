//! User, group and session DAOs.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use uuid::Uuid;

use agora_core::{
  store::{GroupDao, SessionDao, UserDao},
  user::{Group, NewUser, User},
};

use crate::{
  Error, Result,
  encode::{RawUser, USER_COLUMNS, encode_dt, encode_language, encode_uuid, now},
  store::{SqliteStore, expect_row},
};

fn load_group_ids(conn: &rusqlite::Connection, user_id: i64) -> rusqlite::Result<Vec<i64>> {
  let mut stmt =
    conn.prepare("SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY group_id")?;
  stmt
    .query_map(rusqlite::params![user_id], |r| r.get(0))?
    .collect()
}

/// Load the first user matching `condition` (a `WHERE` clause over `u` and
/// optional joins) with its group memberships.
fn load_user(
  conn: &rusqlite::Connection,
  from: &str,
  condition: &str,
  value: Value,
) -> rusqlite::Result<Option<RawUser>> {
  let raw = conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM {from} WHERE {condition}"),
      rusqlite::params![value],
      RawUser::from_row,
    )
    .optional()?;
  let Some(mut raw) = raw else { return Ok(None) };
  raw.group_ids = load_group_ids(conn, raw.id)?;
  Ok(Some(raw))
}

impl SqliteStore {
  async fn find_user(
    &self,
    from: &'static str,
    condition: &'static str,
    value: Value,
  ) -> Result<Option<User>> {
    let raw = self
      .conn
      .call(move |conn| Ok(load_user(conn, from, condition, value)?))
      .await?;
    raw.map(RawUser::into_user).transpose()
  }
}

/// Escape `LIKE` wildcards so `pattern` matches literally.
fn escape_like(pattern: &str) -> String {
  let mut out = String::with_capacity(pattern.len());
  for c in pattern.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

// ─── Users ───────────────────────────────────────────────────────────────────

impl UserDao for SqliteStore {
  async fn add_user(&self, input: NewUser) -> Result<User> {
    let user = User {
      id:             0,
      username:       input.username,
      email:          input.email,
      password_hash:  input.password_hash,
      language:       input.language,
      enabled:        input.enabled,
      activation_key: Uuid::new_v4(),
      registered_at:  now(),
      last_login:     None,
      version:        0,
      group_ids:      Vec::new(),
    };

    let username = user.username.clone();
    let email = user.email.clone();
    let hash = user.password_hash.clone();
    let language = encode_language(user.language);
    let enabled = user.enabled;
    let key_str = encode_uuid(user.activation_key);
    let at_str = encode_dt(user.registered_at);

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (
             username, email, password_hash, language, enabled, activation_key, registered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![username, email, hash, language, enabled, key_str, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::debug!(user = id, "user added");
    Ok(User { id, ..user })
  }

  async fn user_exists(&self, id: i64) -> Result<bool> {
    self.row_exists("users", id).await
  }

  async fn get_user(&self, id: i64) -> Result<Option<User>> {
    self.find_user("users u", "u.id = ?1", Value::Integer(id)).await
  }

  async fn get_user_by_username(&self, username: String) -> Result<Option<User>> {
    self
      .find_user("users u", "u.username = ?1", Value::Text(username))
      .await
  }

  async fn get_user_by_email(&self, email: String) -> Result<Option<User>> {
    self
      .find_user("users u", "u.email = ?1 COLLATE NOCASE", Value::Text(email))
      .await
  }

  async fn get_user_by_activation_key(&self, key: Uuid) -> Result<Option<User>> {
    self
      .find_user("users u", "u.activation_key = ?1", Value::Text(encode_uuid(key)))
      .await
  }

  async fn activate_user(&self, id: i64) -> Result<()> {
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET enabled = 1, version = version + 1 WHERE id = ?1",
          rusqlite::params![id],
        )?)
      })
      .await?;
    expect_row(affected, "user", id)
  }

  async fn update_password(&self, id: i64, password_hash: String) -> Result<()> {
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET password_hash = ?2, version = version + 1 WHERE id = ?1",
          rusqlite::params![id, password_hash],
        )?)
      })
      .await?;
    expect_row(affected, "user", id)
  }

  async fn record_login(&self, id: i64, expected_version: i64) -> Result<()> {
    let at_str = encode_dt(now());

    let (affected, exists) = self
      .conn
      .call(move |conn| {
        let affected = conn.execute(
          "UPDATE users SET last_login = ?3, version = version + 1
           WHERE id = ?1 AND version = ?2",
          rusqlite::params![id, expected_version, at_str],
        )?;
        if affected > 0 {
          return Ok((affected, true));
        }
        let exists = conn
          .query_row("SELECT 1 FROM users WHERE id = ?1", rusqlite::params![id], |_| Ok(true))
          .optional()?
          .unwrap_or(false);
        Ok((affected, exists))
      })
      .await?;

    match (affected, exists) {
      (0, false) => Err(Error::NotFound { entity: "user", id }),
      (0, true) => Err(Error::VersionConflict { entity: "user", id }),
      _ => Ok(()),
    }
  }

  async fn usernames_like(&self, pattern: String, limit: usize) -> Result<Vec<String>> {
    let like = format!("%{}%", escape_like(&pattern));
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT username FROM users WHERE username LIKE ?1 ESCAPE '\\'
           ORDER BY username LIMIT ?2",
        )?;
        let names = stmt
          .query_map(rusqlite::params![like, limit], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await?;
    Ok(names)
  }
}

// ─── Groups ──────────────────────────────────────────────────────────────────

impl GroupDao for SqliteStore {
  async fn add_group(&self, name: String) -> Result<Group> {
    let group = self
      .conn
      .call(move |conn| {
        conn.execute("INSERT INTO user_groups (name) VALUES (?1)", rusqlite::params![name])?;
        Ok(Group { id: conn.last_insert_rowid(), name })
      })
      .await?;
    Ok(group)
  }

  async fn get_group_by_name(&self, name: String) -> Result<Option<Group>> {
    let group = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name FROM user_groups WHERE name = ?1",
            rusqlite::params![name],
            |r| Ok(Group { id: r.get(0)?, name: r.get(1)? }),
          )
          .optional()?)
      })
      .await?;
    Ok(group)
  }

  async fn add_group_member(&self, group_id: i64, user_id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
          rusqlite::params![group_id, user_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

impl SessionDao for SqliteStore {
  async fn create_session(
    &self,
    token: Uuid,
    user_id: i64,
    remember_me: bool,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let token_str = encode_uuid(token);
    let at_str = encode_dt(now());
    let expires_str = encode_dt(expires_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sessions WHERE expires_at <= ?1", rusqlite::params![at_str])?;
        tx.execute(
          "INSERT INTO sessions (token, user_id, remember_me, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![token_str, user_id, remember_me, at_str, expires_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn session_user(&self, token: Uuid) -> Result<Option<User>> {
    let token_str = encode_uuid(token);
    let at_str = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let user_id: Option<i64> = conn
          .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > ?2",
            rusqlite::params![token_str, at_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(user_id) = user_id else { return Ok(None) };
        Ok(load_user(conn, "users u", "u.id = ?1", Value::Integer(user_id))?)
      })
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn delete_session(&self, token: Uuid) -> Result<()> {
    let token_str = encode_uuid(token);
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM sessions WHERE token = ?1", rusqlite::params![token_str])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
