//! Shared fixture for service tests: an in-memory store seeded like a fresh
//! forum, plus helpers to create accounts directly.

use std::sync::{
  Arc, Mutex, OnceLock,
  atomic::{AtomicBool, Ordering},
};

use agora_core::{
  store::{BranchDao as _, GroupDao as _, UserDao as _},
  user::{Language, NewUser, Principal, User},
};
use agora_store_sqlite::SqliteStore;

use crate::{
  Forum,
  bootstrap::{Groups, grant_default_branch_permissions, grant_profile_permissions, seed_forum},
  mail::{Mail, MailError, Mailer},
  password::hash_password,
  plugin::PluginRegistry,
};

/// Keeps every mail instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
  sent:      Mutex<Vec<Mail>>,
  fail_next: AtomicBool,
}

impl RecordingMailer {
  pub fn sent(&self) -> Vec<Mail> { self.sent.lock().unwrap().clone() }

  /// Make the next `send` fail.
  pub fn fail_next(&self) { self.fail_next.store(true, Ordering::SeqCst); }
}

impl Mailer for RecordingMailer {
  fn send(&self, mail: Mail) -> Result<(), MailError> {
    if self.fail_next.swap(false, Ordering::SeqCst) {
      return Err(MailError { to: mail.to, reason: "smtp unavailable".into() });
    }
    self.sent.lock().unwrap().push(mail);
    Ok(())
  }
}

pub struct Fixture {
  pub store:      Arc<SqliteStore>,
  pub forum:      Forum<SqliteStore>,
  pub mailer:     Arc<RecordingMailer>,
  pub groups:     Groups,
  pub section_id: i64,
  pub branch_id:  i64,
}

pub async fn fixture() -> Fixture { fixture_with_plugins(PluginRegistry::new()).await }

pub async fn fixture_with_plugins(plugins: PluginRegistry) -> Fixture {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let groups = seed_forum(store.as_ref()).await.unwrap();
  let sections = agora_core::store::SectionDao::list_sections(store.as_ref()).await.unwrap();
  let section_id = sections[0].id;
  let branch_id = sections[0].branches[0].id;

  let mailer = Arc::new(RecordingMailer::default());
  let forum = Forum::new(store.clone(), mailer.clone(), plugins, "http://forum.test");
  Fixture { store, forum, mailer, groups, section_id, branch_id }
}

/// Hashing is slow in debug builds; every fixture account shares one hash.
fn password_hash() -> String {
  static HASH: OnceLock<String> = OnceLock::new();
  HASH.get_or_init(|| hash_password("password").unwrap()).clone()
}

impl Fixture {
  async fn refetch(&self, id: i64) -> User { self.store.get_user(id).await.unwrap().unwrap() }

  /// An enabled account without group membership or profile permissions.
  pub async fn plain_user(&self, name: &str) -> Principal {
    let user = self
      .store
      .add_user(NewUser {
        username:      name.to_owned(),
        email:         format!("{name}@example.org"),
        password_hash: password_hash(),
        language:      Language::English,
        enabled:       true,
      })
      .await
      .unwrap();
    Principal::User(self.refetch(user.id).await)
  }

  /// A fully enrolled registered user with password `password`.
  pub async fn member(&self, name: &str) -> Principal {
    let id = self.plain_user(name).await.user_id().unwrap();
    self.store.add_group_member(self.groups.registered.id, id).await.unwrap();
    grant_profile_permissions(self.store.as_ref(), id).await.unwrap();
    Principal::User(self.refetch(id).await)
  }

  /// A member who also belongs to the administrators group.
  pub async fn admin(&self, name: &str) -> Principal {
    let id = self.member(name).await.user_id().unwrap();
    self.store.add_group_member(self.groups.administrators.id, id).await.unwrap();
    Principal::User(self.refetch(id).await)
  }

  /// A new branch in the fixture section, granted the default permissions
  /// when `visible`.
  pub async fn add_branch(&self, name: &str, visible: bool) -> i64 {
    let branch = self
      .store
      .add_branch(self.section_id, name.to_owned(), None, 10)
      .await
      .unwrap();
    if visible {
      grant_default_branch_permissions(self.store.as_ref(), branch.id, &self.groups)
        .await
        .unwrap();
    }
    branch.id
  }
}
