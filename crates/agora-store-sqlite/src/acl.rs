//! Access-control entry DAO.

use agora_core::{
  acl::{AccessControlEntry, ObjectIdentity},
  store::AclDao,
};

use crate::{
  Result,
  encode::{RawAclEntry, encode_sid},
  store::SqliteStore,
};

impl AclDao for SqliteStore {
  async fn add_entry(&self, entry: AccessControlEntry) -> Result<()> {
    let object_type = entry.identity.kind.to_string();
    let (sid_kind, sid_id) = encode_sid(entry.recipient);
    let permission = entry.permission.to_string();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO acl_entries (object_type, object_id, sid_kind, sid_id, permission, granting)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            object_type,
            entry.identity.id,
            sid_kind,
            sid_id,
            permission,
            entry.granting,
          ],
        )?;
        Ok(())
      })
      .await?;
    tracing::debug!(object = %entry.identity, permission = %entry.permission, "acl entry added");
    Ok(())
  }

  async fn entries_for(&self, identity: ObjectIdentity) -> Result<Vec<AccessControlEntry>> {
    let object_type = identity.kind.to_string();

    let raws: Vec<RawAclEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT object_type, object_id, sid_kind, sid_id, permission, granting
           FROM acl_entries WHERE object_type = ?1 AND object_id = ?2 ORDER BY id",
        )?;
        let raws = stmt
          .query_map(rusqlite::params![object_type, identity.id], |row| {
            Ok(RawAclEntry {
              object_type: row.get(0)?,
              object_id:   row.get(1)?,
              sid_kind:    row.get(2)?,
              sid_id:      row.get(3)?,
              permission:  row.get(4)?,
              granting:    row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(raws)
      })
      .await?;

    raws.into_iter().map(RawAclEntry::into_entry).collect()
  }

  async fn delete_entries(&self, identity: ObjectIdentity) -> Result<()> {
    let object_type = identity.kind.to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM acl_entries WHERE object_type = ?1 AND object_id = ?2",
          rusqlite::params![object_type, identity.id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
