//! [`SqliteStore`], the SQLite implementation of the Agora DAO traits.
//!
//! Sections and branches live here; the remaining DAOs are split across the
//! sibling modules by entity.

use std::path::Path;

use rusqlite::OptionalExtension as _;

use agora_core::{
  forum::{Branch, Section},
  page::PageRequest,
  store::{BranchDao, Dao, SectionDao},
};

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Agora forum store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("schema initialised");
    Ok(())
  }

  /// `SELECT 1 FROM <table> WHERE id = ?1`.
  pub(crate) async fn row_exists(&self, table: &'static str, id: i64) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;
    Ok(exists)
  }
}

/// Turn an affected-row count into [`Error::NotFound`] when nothing matched.
pub(crate) fn expect_row(affected: usize, entity: &'static str, id: i64) -> Result<()> {
  if affected == 0 {
    return Err(Error::NotFound { entity, id });
  }
  Ok(())
}

/// Bind values for `LIMIT ?n OFFSET ?m`.
pub(crate) fn limit_offset(page: PageRequest) -> (i64, i64) {
  (
    i64::from(page.size),
    i64::try_from(page.offset()).unwrap_or(i64::MAX),
  )
}

pub(crate) fn count_to_total(count: i64) -> u64 { u64::try_from(count).unwrap_or(0) }

impl Dao for SqliteStore {
  type Error = Error;
}

// ─── Sections ────────────────────────────────────────────────────────────────

fn branch_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Branch> {
  Ok(Branch {
    id:          row.get(0)?,
    section_id:  row.get(1)?,
    name:        row.get(2)?,
    description: row.get(3)?,
    position:    row.get(4)?,
    topic_count: 0,
    post_count:  0,
  })
}

fn load_branches(conn: &rusqlite::Connection, section_id: i64) -> rusqlite::Result<Vec<Branch>> {
  let mut stmt = conn.prepare(
    "SELECT id, section_id, name, description, position FROM branches
     WHERE section_id = ?1 ORDER BY position, id",
  )?;
  stmt
    .query_map(rusqlite::params![section_id], branch_from_row)?
    .collect()
}

fn section_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
  Ok(Section {
    id:          row.get(0)?,
    name:        row.get(1)?,
    description: row.get(2)?,
    position:    row.get(3)?,
    branches:    Vec::new(),
  })
}

impl SectionDao for SqliteStore {
  async fn add_section(
    &self,
    name: String,
    description: Option<String>,
    position: i32,
  ) -> Result<Section> {
    let section = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sections (name, description, position) VALUES (?1, ?2, ?3)",
          rusqlite::params![name, description, position],
        )?;
        Ok(Section {
          id: conn.last_insert_rowid(),
          name,
          description,
          position,
          branches: Vec::new(),
        })
      })
      .await?;
    Ok(section)
  }

  async fn section_exists(&self, id: i64) -> Result<bool> {
    self.row_exists("sections", id).await
  }

  async fn get_section(&self, id: i64) -> Result<Option<Section>> {
    let section = self
      .conn
      .call(move |conn| {
        let section = conn
          .query_row(
            "SELECT id, name, description, position FROM sections WHERE id = ?1",
            rusqlite::params![id],
            section_from_row,
          )
          .optional()?;
        let Some(mut section) = section else { return Ok(None) };
        section.branches = load_branches(conn, section.id)?;
        Ok(Some(section))
      })
      .await?;
    Ok(section)
  }

  async fn list_sections(&self) -> Result<Vec<Section>> {
    let sections = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, name, description, position FROM sections ORDER BY position, id",
        )?;
        let mut sections = stmt
          .query_map([], section_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for section in &mut sections {
          section.branches = load_branches(conn, section.id)?;
        }
        Ok(sections)
      })
      .await?;
    Ok(sections)
  }
}

// ─── Branches ────────────────────────────────────────────────────────────────

impl BranchDao for SqliteStore {
  async fn add_branch(
    &self,
    section_id: i64,
    name: String,
    description: Option<String>,
    position: i32,
  ) -> Result<Branch> {
    let branch = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO branches (section_id, name, description, position)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![section_id, name, description, position],
        )?;
        Ok(Branch {
          id: conn.last_insert_rowid(),
          section_id,
          name,
          description,
          position,
          topic_count: 0,
          post_count: 0,
        })
      })
      .await?;
    Ok(branch)
  }

  async fn branch_exists(&self, id: i64) -> Result<bool> {
    self.row_exists("branches", id).await
  }

  async fn get_branch(&self, id: i64) -> Result<Option<Branch>> {
    let branch = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, section_id, name, description, position FROM branches WHERE id = ?1",
            rusqlite::params![id],
            branch_from_row,
          )
          .optional()?)
      })
      .await?;
    Ok(branch)
  }

  async fn update_branch(
    &self,
    id: i64,
    name: String,
    description: Option<String>,
  ) -> Result<()> {
    let affected = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE branches SET name = ?2, description = ?3 WHERE id = ?1",
          rusqlite::params![id, name, description],
        )?)
      })
      .await?;
    expect_row(affected, "branch", id)
  }

  async fn count_topics_in_branch(&self, id: i64) -> Result<i64> {
    let count = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM topics WHERE branch_id = ?1",
          rusqlite::params![id],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count)
  }

  async fn count_posts_in_branch(&self, id: i64) -> Result<i64> {
    let count = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM posts p JOIN topics t ON t.id = p.topic_id
           WHERE t.branch_id = ?1",
          rusqlite::params![id],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count)
  }
}
