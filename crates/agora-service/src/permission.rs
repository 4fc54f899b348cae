//! Permission evaluation against the per-object ACL.
//!
//! The decision policy itself lives in [`agora_core::acl`]. The generic
//! [`PermissionService::has_permission`] decides over the object's whole
//! entry list; the typed checks only see the entries addressed to the
//! principal's sids.

use std::sync::Arc;

use agora_core::{
  Error, Result,
  acl::{
    AccessControlEntry, BranchPermission, GeneralPermission, ObjectIdentity, Permission,
    ProfilePermission, evaluate, evaluate_entries,
  },
  store::ForumStore,
  user::{Principal, User},
};

/// The authenticated user behind `principal`, or [`Error::AccessDenied`].
pub fn require_user(principal: &Principal) -> Result<&User> {
  principal
    .user()
    .ok_or_else(|| Error::AccessDenied("authentication required".into()))
}

pub struct PermissionService<S> {
  store: Arc<S>,
}

impl<S> Clone for PermissionService<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: ForumStore> PermissionService<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Decide whether `principal` holds `permission_name` on the object
  /// `(target_id, target_type)`.
  ///
  /// Only `GeneralPermission.*` names are accepted here; anything else fails
  /// with [`Error::UnsupportedPermission`]. A deny entry for the permission
  /// anywhere in the object's list refuses it.
  pub async fn has_permission(
    &self,
    principal: &Principal,
    target_id: i64,
    target_type: &str,
    permission_name: &str,
  ) -> Result<bool> {
    let identity = ObjectIdentity::resolve(target_id, target_type)?;
    let permission: Permission = permission_name.parse()?;
    if !matches!(permission, Permission::General(_)) {
      return Err(Error::UnsupportedPermission(format!(
        "{permission_name} is not a {} name",
        Permission::GENERAL
      )));
    }
    let entries = self.entries(identity).await?;
    let granted = evaluate_entries(&entries, permission);
    tracing::trace!(
      principal = principal.username(),
      object = %identity,
      %permission,
      granted,
      "permission evaluated on the full list"
    );
    Ok(granted)
  }

  pub async fn has_general_permission(
    &self,
    principal: &Principal,
    identity: ObjectIdentity,
    permission: GeneralPermission,
  ) -> Result<bool> {
    self.evaluate(principal, identity, permission.into()).await
  }

  pub async fn check_general_permission(
    &self,
    principal: &Principal,
    identity: ObjectIdentity,
    permission: GeneralPermission,
  ) -> Result<()> {
    let granted = self.has_general_permission(principal, identity, permission).await?;
    deny_unless(granted, principal, identity, permission.into())
  }

  pub async fn has_branch_permission(
    &self,
    principal: &Principal,
    branch_id: i64,
    permission: BranchPermission,
  ) -> Result<bool> {
    self
      .evaluate(principal, ObjectIdentity::branch(branch_id), permission.into())
      .await
  }

  pub async fn check_branch_permission(
    &self,
    principal: &Principal,
    branch_id: i64,
    permission: BranchPermission,
  ) -> Result<()> {
    let granted = self.has_branch_permission(principal, branch_id, permission).await?;
    deny_unless(granted, principal, ObjectIdentity::branch(branch_id), permission.into())
  }

  /// Profile permissions live on the user's own identity; the anonymous
  /// principal never holds one.
  pub async fn has_profile_permission(
    &self,
    principal: &Principal,
    permission: ProfilePermission,
  ) -> Result<bool> {
    let Some(user_id) = principal.user_id() else { return Ok(false) };
    self
      .evaluate(principal, ObjectIdentity::user(user_id), permission.into())
      .await
  }

  pub async fn check_profile_permission(
    &self,
    principal: &Principal,
    permission: ProfilePermission,
  ) -> Result<()> {
    let granted = self.has_profile_permission(principal, permission).await?;
    let identity = ObjectIdentity::user(principal.user_id().unwrap_or_default());
    deny_unless(granted, principal, identity, permission.into())
  }

  async fn evaluate(
    &self,
    principal: &Principal,
    identity: ObjectIdentity,
    permission: Permission,
  ) -> Result<bool> {
    let entries = self.entries(identity).await?;
    let granted = evaluate(&entries, &principal.sids(), permission);
    tracing::trace!(
      principal = principal.username(),
      object = %identity,
      %permission,
      granted,
      "permission evaluated"
    );
    Ok(granted)
  }

  async fn entries(&self, identity: ObjectIdentity) -> Result<Vec<AccessControlEntry>> {
    self.store.entries_for(identity).await.map_err(Error::store)
  }
}

fn deny_unless(
  granted: bool,
  principal: &Principal,
  identity: ObjectIdentity,
  permission: Permission,
) -> Result<()> {
  if granted {
    return Ok(());
  }
  Err(Error::AccessDenied(format!(
    "{} lacks {permission} on {identity}",
    principal.username()
  )))
}

#[cfg(test)]
mod tests {
  use agora_core::{
    acl::Sid,
    store::AclDao,
    user::Language,
  };
  use agora_store_sqlite::SqliteStore;
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;

  fn member(id: i64, groups: &[i64]) -> Principal {
    Principal::User(User {
      id,
      username: format!("user{id}"),
      email: format!("user{id}@example.org"),
      password_hash: String::new(),
      language: Language::English,
      enabled: true,
      activation_key: Uuid::new_v4(),
      registered_at: Utc::now(),
      last_login: None,
      version: 0,
      group_ids: groups.to_vec(),
    })
  }

  async fn service() -> (Arc<SqliteStore>, PermissionService<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    (store.clone(), PermissionService::new(store))
  }

  #[tokio::test]
  async fn deny_entry_overrides_grant_for_the_same_permission() {
    let (store, perms) = service().await;
    let branch = ObjectIdentity::branch(1);
    store
      .add_entry(AccessControlEntry::grant(branch, Sid::Group(3), GeneralPermission::Write))
      .await
      .unwrap();
    store
      .add_entry(AccessControlEntry::deny(branch, Sid::User(9), GeneralPermission::Write))
      .await
      .unwrap();

    for user in [member(9, &[3]), member(8, &[3]), Principal::Anonymous] {
      assert!(!perms.has_permission(&user, 1, "Branch", "GeneralPermission.WRITE").await.unwrap());
    }
    assert!(!perms.has_permission(&member(8, &[]), 1, "Branch", "GeneralPermission.READ").await.unwrap());
  }

  #[tokio::test]
  async fn typed_checks_only_see_entries_for_the_principal() {
    let (store, perms) = service().await;
    let branch = ObjectIdentity::branch(1);
    store
      .add_entry(AccessControlEntry::grant(branch, Sid::Group(3), GeneralPermission::Admin))
      .await
      .unwrap();
    store
      .add_entry(AccessControlEntry::deny(branch, Sid::User(9), GeneralPermission::Admin))
      .await
      .unwrap();

    let admin = GeneralPermission::Admin;
    assert!(!perms.has_general_permission(&member(9, &[3]), branch, admin).await.unwrap());
    assert!(perms.has_general_permission(&member(8, &[3]), branch, admin).await.unwrap());
    assert!(!perms.has_general_permission(&member(7, &[]), branch, admin).await.unwrap());
  }

  #[tokio::test]
  async fn no_entries_deny_and_single_grant_allows() {
    let (store, perms) = service().await;
    let user = member(1, &[]);
    assert!(!perms.has_permission(&user, 5, "Topic", "GeneralPermission.READ").await.unwrap());

    store
      .add_entry(AccessControlEntry::grant(
        ObjectIdentity::resolve(5, "Topic").unwrap(),
        Sid::User(1),
        GeneralPermission::Read,
      ))
      .await
      .unwrap();
    assert!(perms.has_permission(&user, 5, "Topic", "GeneralPermission.READ").await.unwrap());
  }

  #[tokio::test]
  async fn other_permission_families_are_rejected() {
    let (_, perms) = service().await;
    let user = member(1, &[]);
    for name in ["BranchPermission.VIEW_TOPICS", "ProfilePermission.EDIT_OWN_PROFILE", "READ"] {
      let err = perms.has_permission(&user, 1, "Branch", name).await.unwrap_err();
      assert!(matches!(err, Error::UnsupportedPermission(_)), "{name}: {err}");
    }
    let err = perms
      .has_permission(&user, 1, "Widget", "GeneralPermission.READ")
      .await
      .unwrap_err();
    assert!(matches!(err, Error::UnsupportedPermission(_)));
  }

  #[tokio::test]
  async fn anonymous_is_matched_only_by_anonymous_entries() {
    let (store, perms) = service().await;
    store
      .add_entry(AccessControlEntry::grant(
        ObjectIdentity::branch(2),
        Sid::Anonymous,
        BranchPermission::ViewTopics,
      ))
      .await
      .unwrap();

    let anonymous = Principal::Anonymous;
    assert!(perms.has_branch_permission(&anonymous, 2, BranchPermission::ViewTopics).await.unwrap());
    assert!(!perms.has_branch_permission(&member(1, &[]), 2, BranchPermission::ViewTopics).await.unwrap());
    let err = perms
      .check_branch_permission(&anonymous, 2, BranchPermission::CreateTopics)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
  }

  #[tokio::test]
  async fn profile_permissions_are_checked_on_the_users_own_identity() {
    let (store, perms) = service().await;
    store
      .add_entry(AccessControlEntry::grant(
        ObjectIdentity::user(4),
        Sid::User(4),
        ProfilePermission::SendPrivateMessages,
      ))
      .await
      .unwrap();

    let send = ProfilePermission::SendPrivateMessages;
    assert!(perms.has_profile_permission(&member(4, &[]), send).await.unwrap());
    assert!(!perms.has_profile_permission(&member(5, &[]), send).await.unwrap());
    assert!(!perms.has_profile_permission(&Principal::Anonymous, send).await.unwrap());
  }
}
