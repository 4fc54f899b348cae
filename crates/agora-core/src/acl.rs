//! Access-control types: object identities, security identities, permission
//! families and access-control entries.
//!
//! An ACL is the list of entries attached to one [`ObjectIdentity`]. The
//! decision policy lives in [`evaluate`]: an applicable deny beats any grant,
//! and the absence of an applicable entry denies.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Object identity ─────────────────────────────────────────────────────────

/// The entity types an ACL can be attached to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
pub enum ObjectType {
  Section,
  Branch,
  Topic,
  Post,
  User,
  PrivateMessage,
}

/// The `(id, type)` pair an ACL is looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
  pub id:   i64,
  pub kind: ObjectType,
}

impl ObjectIdentity {
  pub fn new(id: i64, kind: ObjectType) -> Self { Self { id, kind } }

  pub fn branch(id: i64) -> Self { Self::new(id, ObjectType::Branch) }

  pub fn user(id: i64) -> Self { Self::new(id, ObjectType::User) }

  /// Resolve an identity from a target id and a type name. Qualified names
  /// (`forum.model.Topic`) resolve by their last segment.
  pub fn resolve(id: i64, type_name: &str) -> Result<Self> {
    let simple = type_name.rsplit('.').next().unwrap_or(type_name);
    let kind = ObjectType::from_str(simple)
      .map_err(|_| Error::UnsupportedPermission(format!("unknown object type {type_name:?}")))?;
    Ok(Self::new(id, kind))
  }
}

impl fmt::Display for ObjectIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.kind, self.id)
  }
}

// ─── Security identity ───────────────────────────────────────────────────────

/// The recipient an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Sid {
  /// The single identity of every unauthenticated request.
  Anonymous,
  User(i64),
  Group(i64),
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneralPermission {
  Read,
  Write,
  Create,
  Delete,
  Admin,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchPermission {
  ViewTopics,
  CreateTopics,
  CreatePosts,
  EditOwnPosts,
  EditOthersPosts,
  DeleteOwnPosts,
  DeleteOthersPosts,
  MoveTopics,
  CloseTopics,
  CreatePolls,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfilePermission {
  SendPrivateMessages,
  EditOwnProfile,
}

/// A permission qualified by its family. The textual form is
/// `<Family>.<NAME>`, e.g. `BranchPermission.VIEW_TOPICS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
  General(GeneralPermission),
  Branch(BranchPermission),
  Profile(ProfilePermission),
}

impl Permission {
  pub const GENERAL: &'static str = "GeneralPermission";
  pub const BRANCH: &'static str = "BranchPermission";
  pub const PROFILE: &'static str = "ProfilePermission";

  pub fn family(&self) -> &'static str {
    match self {
      Self::General(_) => Self::GENERAL,
      Self::Branch(_) => Self::BRANCH,
      Self::Profile(_) => Self::PROFILE,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::General(p) => p.into(),
      Self::Branch(p) => p.into(),
      Self::Profile(p) => p.into(),
    }
  }
}

impl fmt::Display for Permission {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.family(), self.name())
  }
}

impl FromStr for Permission {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let unsupported = || Error::UnsupportedPermission(s.to_owned());
    let (family, name) = s.split_once('.').ok_or_else(unsupported)?;
    match family {
      Self::GENERAL => name.parse().map(Self::General).map_err(|_| unsupported()),
      Self::BRANCH => name.parse().map(Self::Branch).map_err(|_| unsupported()),
      Self::PROFILE => name.parse().map(Self::Profile).map_err(|_| unsupported()),
      _ => Err(unsupported()),
    }
  }
}

impl From<GeneralPermission> for Permission {
  fn from(p: GeneralPermission) -> Self { Self::General(p) }
}

impl From<BranchPermission> for Permission {
  fn from(p: BranchPermission) -> Self { Self::Branch(p) }
}

impl From<ProfilePermission> for Permission {
  fn from(p: ProfilePermission) -> Self { Self::Profile(p) }
}

impl Serialize for Permission {
  fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Permission {
  fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// A single grant or deny of `permission` to `recipient` on `identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
  pub identity:   ObjectIdentity,
  pub recipient:  Sid,
  pub permission: Permission,
  pub granting:   bool,
}

impl AccessControlEntry {
  pub fn grant(identity: ObjectIdentity, recipient: Sid, permission: impl Into<Permission>) -> Self {
    Self { identity, recipient, permission: permission.into(), granting: true }
  }

  pub fn deny(identity: ObjectIdentity, recipient: Sid, permission: impl Into<Permission>) -> Self {
    Self { identity, recipient, permission: permission.into(), granting: false }
  }
}

/// Decide `permission` from the full entry list of one object, whoever the
/// recipients are.
///
/// Deny entries are scanned to completion before any grant is considered, so
/// a matching deny wins regardless of where it sits in the list. No matching
/// entry at all denies.
pub fn evaluate_entries<'e>(
  entries: impl IntoIterator<Item = &'e AccessControlEntry> + Clone,
  permission: Permission,
) -> bool {
  let matching = |e: &&AccessControlEntry| e.permission == permission;
  if entries.clone().into_iter().filter(matching).any(|e| !e.granting) {
    return false;
  }
  entries.into_iter().filter(matching).any(|e| e.granting)
}

/// Decide `permission` for a principal holding `sids`: the same policy as
/// [`evaluate_entries`], over the entries addressed to one of `sids`.
pub fn evaluate(entries: &[AccessControlEntry], sids: &[Sid], permission: Permission) -> bool {
  evaluate_entries(entries.iter().filter(|e| sids.contains(&e.recipient)), permission)
}

#[cfg(test)]
mod tests {
  use super::*;

  const GROUP: Sid = Sid::Group(5);

  fn branch() -> ObjectIdentity { ObjectIdentity::branch(1) }

  #[test]
  fn deny_wins_over_grant_in_any_order() {
    let p = BranchPermission::ViewTopics;
    let grant_first = [
      AccessControlEntry::grant(branch(), GROUP, p),
      AccessControlEntry::deny(branch(), GROUP, p),
    ];
    let deny_first = [grant_first[1], grant_first[0]];
    assert!(!evaluate(&grant_first, &[GROUP], p.into()));
    assert!(!evaluate(&deny_first, &[GROUP], p.into()));
  }

  #[test]
  fn no_entries_means_deny() {
    assert!(!evaluate(&[], &[GROUP], GeneralPermission::Read.into()));
  }

  #[test]
  fn only_grant_means_allow() {
    let entries = [AccessControlEntry::grant(branch(), GROUP, GeneralPermission::Write)];
    assert!(evaluate(&entries, &[GROUP], GeneralPermission::Write.into()));
  }

  #[test]
  fn entries_for_other_permissions_or_recipients_do_not_apply() {
    let entries = [
      AccessControlEntry::grant(branch(), GROUP, GeneralPermission::Read),
      AccessControlEntry::grant(branch(), Sid::Group(6), GeneralPermission::Write),
    ];
    assert!(!evaluate(&entries, &[GROUP], GeneralPermission::Write.into()));
  }

  #[test]
  fn full_list_deny_applies_to_every_recipient() {
    let entries = [
      AccessControlEntry::grant(branch(), GROUP, GeneralPermission::Write),
      AccessControlEntry::deny(branch(), Sid::User(9), GeneralPermission::Write),
    ];
    assert!(!evaluate_entries(&entries, GeneralPermission::Write.into()));
    assert!(evaluate(&entries, &[GROUP, Sid::User(8)], GeneralPermission::Write.into()));
    assert!(evaluate_entries(&entries[..1], GeneralPermission::Write.into()));
  }

  #[test]
  fn permission_names_round_trip_through_text() {
    let p: Permission = "BranchPermission.VIEW_TOPICS".parse().unwrap();
    assert_eq!(p, Permission::Branch(BranchPermission::ViewTopics));
    assert_eq!(p.to_string(), "BranchPermission.VIEW_TOPICS");
    assert_eq!(
      "GeneralPermission.ADMIN".parse::<Permission>().unwrap(),
      Permission::General(GeneralPermission::Admin)
    );
  }

  #[test]
  fn malformed_permission_names_are_rejected() {
    for name in ["WRITE", "GeneralPermission.FLY", "AclPermission.READ"] {
      assert!(matches!(
        name.parse::<Permission>(),
        Err(Error::UnsupportedPermission(_))
      ));
    }
  }

  #[test]
  fn qualified_type_names_resolve_by_last_segment() {
    let id = ObjectIdentity::resolve(3, "forum.model.Topic").unwrap();
    assert_eq!(id, ObjectIdentity::new(3, ObjectType::Topic));
    assert!(ObjectIdentity::resolve(3, "Widget").is_err());
  }
}
