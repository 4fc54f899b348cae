//! First-run seeding: the two built-in groups, default ACL grants and a
//! starter section for an empty forum.

use agora_core::{
  Error, Result,
  acl::{AccessControlEntry, BranchPermission, GeneralPermission, ObjectIdentity, ProfilePermission, Sid},
  store::ForumStore,
  user::{ADMINISTRATORS_GROUP, Group, REGISTERED_USERS_GROUP},
};

/// Every branch permission, in declaration order.
pub const ALL_BRANCH_PERMISSIONS: [BranchPermission; 10] = [
  BranchPermission::ViewTopics,
  BranchPermission::CreateTopics,
  BranchPermission::CreatePosts,
  BranchPermission::EditOwnPosts,
  BranchPermission::EditOthersPosts,
  BranchPermission::DeleteOwnPosts,
  BranchPermission::DeleteOthersPosts,
  BranchPermission::MoveTopics,
  BranchPermission::CloseTopics,
  BranchPermission::CreatePolls,
];

/// What registered users may do in a freshly created branch.
pub const MEMBER_BRANCH_PERMISSIONS: [BranchPermission; 6] = [
  BranchPermission::ViewTopics,
  BranchPermission::CreateTopics,
  BranchPermission::CreatePosts,
  BranchPermission::EditOwnPosts,
  BranchPermission::DeleteOwnPosts,
  BranchPermission::CreatePolls,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groups {
  pub registered:     Group,
  pub administrators: Group,
}

async fn ensure_group<S: ForumStore>(store: &S, name: &str) -> Result<Group> {
  if let Some(group) = store
    .get_group_by_name(name.to_owned())
    .await
    .map_err(Error::store)?
  {
    return Ok(group);
  }
  tracing::info!(group = name, "creating group");
  store.add_group(name.to_owned()).await.map_err(Error::store)
}

pub async fn ensure_groups<S: ForumStore>(store: &S) -> Result<Groups> {
  Ok(Groups {
    registered:     ensure_group(store, REGISTERED_USERS_GROUP).await?,
    administrators: ensure_group(store, ADMINISTRATORS_GROUP).await?,
  })
}

/// Default entries for a branch: anonymous visitors may read, registered
/// users may take part and administrators hold everything.
pub async fn grant_default_branch_permissions<S: ForumStore>(
  store: &S,
  branch_id: i64,
  groups: &Groups,
) -> Result<()> {
  let branch = ObjectIdentity::branch(branch_id);
  let registered = Sid::Group(groups.registered.id);
  let admins = Sid::Group(groups.administrators.id);

  let mut entries = vec![AccessControlEntry::grant(branch, Sid::Anonymous, BranchPermission::ViewTopics)];
  entries.extend(
    MEMBER_BRANCH_PERMISSIONS
      .iter()
      .map(|p| AccessControlEntry::grant(branch, registered, *p)),
  );
  entries.extend(
    ALL_BRANCH_PERMISSIONS
      .iter()
      .map(|p| AccessControlEntry::grant(branch, admins, *p)),
  );
  entries.push(AccessControlEntry::grant(branch, admins, GeneralPermission::Admin));

  for entry in entries {
    store.add_entry(entry).await.map_err(Error::store)?;
  }
  Ok(())
}

/// Profile permissions a new account holds on itself.
pub async fn grant_profile_permissions<S: ForumStore>(store: &S, user_id: i64) -> Result<()> {
  let identity = ObjectIdentity::user(user_id);
  for permission in [ProfilePermission::SendPrivateMessages, ProfilePermission::EditOwnProfile] {
    store
      .add_entry(AccessControlEntry::grant(identity, Sid::User(user_id), permission))
      .await
      .map_err(Error::store)?;
  }
  Ok(())
}

/// Make sure the built-in groups exist and give an empty forum one section
/// with one branch to post in.
pub async fn seed_forum<S: ForumStore>(store: &S) -> Result<Groups> {
  let groups = ensure_groups(store).await?;
  if store.list_sections().await.map_err(Error::store)?.is_empty() {
    let section = store
      .add_section("General".into(), Some("Everything else".into()), 0)
      .await
      .map_err(Error::store)?;
    let branch = store
      .add_branch(section.id, "Welcome".into(), Some("Say hello".into()), 0)
      .await
      .map_err(Error::store)?;
    grant_default_branch_permissions(store, branch.id, &groups).await?;
    tracing::info!(section = section.id, branch = branch.id, "seeded empty forum");
  }
  Ok(groups)
}
