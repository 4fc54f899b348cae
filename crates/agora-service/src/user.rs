//! Users: lookup, registration, activation, password recovery and the
//! session-based authenticator.

use std::{future::Future, sync::Arc};

use chrono::{Duration, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_core::{
  Error, Result,
  store::ForumStore,
  user::{Language, NewUser, Principal, REGISTERED_USERS_GROUP, User},
  validation::ValidationErrors,
};

use crate::{
  bootstrap::grant_profile_permissions,
  mail::{Mail, Mailer},
  password::{hash_password, verify_password},
  plugin::{AuthenticatedUser, PluginRegistry},
};

/// Optimistic-locking retries of a login before the final attempt.
pub const LOGIN_TRIES_AFTER_LOCK: usize = 3;
/// Upper bound on [`UserService::get_usernames`] results.
pub const MAX_USERNAMES: usize = 10;

pub const USERNAME_MAX_LENGTH: usize = 25;
pub const PASSWORD_MIN_LENGTH: usize = 4;
pub const PASSWORD_MAX_LENGTH: usize = 50;

const GENERATED_PASSWORD_LENGTH: usize = 8;

/// Registration form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterUser {
  pub username:         String,
  pub email:            String,
  pub password:         String,
  #[serde(default)]
  pub password_confirm: String,
}

/// An authenticated session handed back by a successful login.
#[derive(Debug, Clone)]
pub struct Session {
  pub user:        User,
  pub token:       Uuid,
  pub remember_me: bool,
}

/// How long a login stays valid on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLifetimes {
  /// Logins with "remember me" set.
  pub remembered: Duration,
  pub default:    Duration,
}

impl SessionLifetimes {
  pub fn remembered_for_days(days: u32) -> Self {
    Self { remembered: Duration::days(i64::from(days)), ..Self::default() }
  }

  fn for_login(&self, remember_me: bool) -> Duration {
    if remember_me { self.remembered } else { self.default }
  }
}

impl Default for SessionLifetimes {
  fn default() -> Self { Self { remembered: Duration::days(14), default: Duration::hours(12) } }
}

/// Run `attempt` until it stops failing with [`Error::VersionConflict`]:
/// [`LOGIN_TRIES_AFTER_LOCK`] retries, then one final attempt whose conflict
/// is logged and returned.
pub async fn retry_on_version_conflict<T, F, Fut>(username: &str, mut attempt: F) -> Result<T>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T>>,
{
  for _ in 0..LOGIN_TRIES_AFTER_LOCK {
    match attempt().await {
      Err(Error::VersionConflict) => {
        tracing::debug!(user = username, "login hit a row version conflict, retrying");
      }
      other => return other,
    }
  }
  attempt().await.inspect_err(|e| {
    if matches!(e, Error::VersionConflict) {
      tracing::error!(
        user = username,
        tries = LOGIN_TRIES_AFTER_LOCK,
        "user has been locked on every login attempt"
      );
    }
  })
}

fn random_password() -> String {
  const ALPHABET: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";
  let mut bytes = [0u8; GENERATED_PASSWORD_LENGTH];
  OsRng.fill_bytes(&mut bytes);
  bytes
    .iter()
    .map(|b| char::from(ALPHABET[usize::from(*b) % ALPHABET.len()]))
    .collect()
}

pub struct UserService<S> {
  store:    Arc<S>,
  mailer:   Arc<dyn Mailer>,
  plugins:  Arc<PluginRegistry>,
  base_url: String,
  sessions: SessionLifetimes,
}

impl<S> Clone for UserService<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      mailer:   self.mailer.clone(),
      plugins:  self.plugins.clone(),
      base_url: self.base_url.clone(),
      sessions: self.sessions,
    }
  }
}

impl<S: ForumStore> UserService<S> {
  pub fn new(
    store: Arc<S>,
    mailer: Arc<dyn Mailer>,
    plugins: Arc<PluginRegistry>,
    base_url: impl Into<String>,
  ) -> Self {
    let base_url = base_url.into().trim_end_matches('/').to_owned();
    Self { store, mailer, plugins, base_url, sessions: SessionLifetimes::default() }
  }

  pub fn with_session_lifetimes(mut self, sessions: SessionLifetimes) -> Self {
    self.sessions = sessions;
    self
  }

  // ── Lookup ────────────────────────────────────────────────────────────────

  pub async fn get(&self, id: i64) -> Result<User> {
    if !self.store.user_exists(id).await.map_err(Error::store)? {
      return Err(Error::not_found("user", id));
    }
    self
      .store
      .get_user(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("user", id))
  }

  pub async fn get_by_username(&self, username: &str) -> Result<User> {
    self
      .store
      .get_user_by_username(username.to_owned())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("user", username))
  }

  /// Up to [`MAX_USERNAMES`] usernames containing `pattern`.
  pub async fn get_usernames(&self, pattern: &str) -> Result<Vec<String>> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
      return Ok(Vec::new());
    }
    self
      .store
      .usernames_like(pattern.to_owned(), MAX_USERNAMES)
      .await
      .map_err(Error::store)
  }

  // ── Registration ──────────────────────────────────────────────────────────

  async fn validate_registration(&self, form: &RegisterUser, errors: &mut ValidationErrors) -> Result<()> {
    let username_len = form.username.trim().chars().count();
    if username_len == 0 || form.username.chars().count() > USERNAME_MAX_LENGTH {
      errors.add("username", "length");
    } else if self
      .store
      .get_user_by_username(form.username.clone())
      .await
      .map_err(Error::store)?
      .is_some()
    {
      errors.add("username", "taken");
    }

    if !form.email.contains('@') {
      errors.add("email", "invalid");
    } else if self
      .store
      .get_user_by_email(form.email.clone())
      .await
      .map_err(Error::store)?
      .is_some()
    {
      errors.add("email", "taken");
    }

    let password_len = form.password.chars().count();
    if !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&password_len) {
      errors.add("password", "length");
    }
    if form.password != form.password_confirm {
      errors.add("password_confirm", "mismatch");
    }
    Ok(())
  }

  /// Register a disabled account and mail its activation link.
  ///
  /// Registration plugins see the form first; their field errors are merged
  /// with the local ones and their transport failures abort registration.
  pub async fn register(&self, form: RegisterUser, language: Language) -> Result<User> {
    let mut errors = ValidationErrors::new();
    for (id, plugin) in self.plugins.registration_plugins() {
      let plugin_errors = plugin.register_user(&form)?;
      if !plugin_errors.is_empty() {
        tracing::debug!(plugin = id, errors = %plugin_errors, "registration plugin rejected form");
      }
      errors.extend(plugin_errors);
    }
    self.validate_registration(&form, &mut errors).await?;
    errors.into_result()?;

    let user = self
      .store
      .add_user(NewUser {
        username: form.username,
        email: form.email,
        password_hash: hash_password(&form.password)?,
        language,
        enabled: false,
      })
      .await
      .map_err(Error::store)?;
    tracing::info!(user = %user.username, "user registered");

    let mail = Mail {
      to:      user.email.clone(),
      subject: "Account activation".into(),
      body:    format!(
        "Hello {}!\n\nActivate your account: {}/user/activate/{}\n",
        user.username, self.base_url, user.activation_key
      ),
    };
    if let Err(e) = self.mailer.send(mail) {
      tracing::warn!(user = %user.username, error = %e, "activation mail failed");
    }
    Ok(user)
  }

  /// Give an account its group membership and profile permissions.
  async fn enroll(&self, user_id: i64) -> Result<()> {
    if let Some(group) = self
      .store
      .get_group_by_name(REGISTERED_USERS_GROUP.to_owned())
      .await
      .map_err(Error::store)?
    {
      self
        .store
        .add_group_member(group.id, user_id)
        .await
        .map_err(Error::store)?;
    }
    grant_profile_permissions(self.store.as_ref(), user_id).await
  }

  /// Enable the account owning activation `key`.
  pub async fn activate_account(&self, key: &str) -> Result<User> {
    let not_found = || Error::not_found("activation key", key);
    let uuid = Uuid::parse_str(key).map_err(|_| not_found())?;
    let user = self
      .store
      .get_user_by_activation_key(uuid)
      .await
      .map_err(Error::store)?
      .ok_or_else(not_found)?;

    if !user.enabled {
      self.store.activate_user(user.id).await.map_err(Error::store)?;
      self.enroll(user.id).await?;
      tracing::info!(user = %user.username, "account activated");
    }
    self.get(user.id).await
  }

  /// Replace the password of the account registered with `email` by a random
  /// one and mail it. The stored password only changes once the mail went
  /// out.
  pub async fn restore_password(&self, email: &str) -> Result<()> {
    let user = self
      .store
      .get_user_by_email(email.trim().to_owned())
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::Validation(ValidationErrors::single("email", "unknown")))?;

    let password = random_password();
    let hash = hash_password(&password)?;
    self
      .mailer
      .send(Mail {
        to:      user.email.clone(),
        subject: "Password recovery".into(),
        body:    format!(
          "Hello {}!\n\nYour new password is: {password}\nSign in at {}/login\n",
          user.username, self.base_url
        ),
      })
      .map_err(|e| {
        tracing::warn!(user = %user.username, error = %e, "password recovery mail failed");
        Error::MailingFailed(e.to_string())
      })?;

    self
      .store
      .update_password(user.id, hash)
      .await
      .map_err(Error::store)?;
    tracing::info!(user = %user.username, "password restored");
    Ok(())
  }

  // ── Authentication ────────────────────────────────────────────────────────

  /// The local account for a user vouched for by an authentication plugin,
  /// created on first sight.
  async fn local_account_for(&self, vouched: AuthenticatedUser, password: &str) -> Result<User> {
    if let Some(user) = self
      .store
      .get_user_by_username(vouched.username.clone())
      .await
      .map_err(Error::store)?
    {
      return Ok(user);
    }
    let user = self
      .store
      .add_user(NewUser {
        username:      vouched.username,
        email:         vouched.email,
        password_hash: hash_password(password)?,
        language:      Language::default(),
        enabled:       true,
      })
      .await
      .map_err(Error::store)?;
    self.enroll(user.id).await?;
    tracing::info!(user = %user.username, "local account created for plugin user");
    self.get(user.id).await
  }

  /// Resolve credentials to an enabled account, plugins first.
  async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
    let mut vouched = None;
    for (id, plugin) in self.plugins.authentication_plugins() {
      if let Some(details) = plugin.authenticate(username, password)? {
        tracing::debug!(plugin = id, user = username, "authenticated by plugin");
        vouched = Some(details);
        break;
      }
    }
    if let Some(details) = vouched {
      return self.local_account_for(details, password).await.map(Some);
    }

    let Some(user) = self
      .store
      .get_user_by_username(username.to_owned())
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };
    if !user.enabled {
      tracing::debug!(user = username, "login refused for disabled account");
      return Ok(None);
    }
    Ok(verify_password(password, &user.password_hash).then_some(user))
  }

  /// `Ok(None)` when the credentials are wrong. A concurrent login may make
  /// this fail with [`Error::VersionConflict`]; see
  /// [`login_with_lock_handling`](Self::login_with_lock_handling).
  pub async fn login_user(
    &self,
    username: &str,
    password: &str,
    remember_me: bool,
  ) -> Result<Option<Session>> {
    let Some(user) = self.authenticate(username, password).await? else {
      return Ok(None);
    };
    self
      .store
      .record_login(user.id, user.version)
      .await
      .map_err(Error::store)?;

    let token = Uuid::new_v4();
    let expires_at = Utc::now() + self.sessions.for_login(remember_me);
    self
      .store
      .create_session(token, user.id, remember_me, expires_at)
      .await
      .map_err(Error::store)?;
    tracing::info!(user = %user.username, remember_me, "user logged in");

    let user = self.get(user.id).await?;
    Ok(Some(Session { user, token, remember_me }))
  }

  pub async fn login_with_lock_handling(
    &self,
    username: &str,
    password: &str,
    remember_me: bool,
  ) -> Result<Option<Session>> {
    retry_on_version_conflict(username, || self.login_user(username, password, remember_me)).await
  }

  /// The principal owning session `token`; anonymous without a live session.
  pub async fn current_user(&self, token: Option<Uuid>) -> Result<Principal> {
    let Some(token) = token else { return Ok(Principal::Anonymous) };
    let user = self.store.session_user(token).await.map_err(Error::store)?;
    Ok(match user {
      Some(user) if user.enabled => Principal::User(user),
      _ => Principal::Anonymous,
    })
  }

  pub async fn logout(&self, token: Uuid) -> Result<()> {
    self.store.delete_session(token).await.map_err(Error::store)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;
  use crate::{
    plugin::{AuthenticationPlugin, Plugin, PluginError, RegistrationPlugin},
    testing::{fixture, fixture_with_plugins},
  };

  fn form(username: &str) -> RegisterUser {
    RegisterUser {
      username:         username.into(),
      email:            format!("{username}@example.org"),
      password:         "secret".into(),
      password_confirm: "secret".into(),
    }
  }

  #[tokio::test]
  async fn retry_gives_up_after_three_retries_and_one_final_attempt() {
    let calls = AtomicUsize::new(0);
    let result: Result<()> = retry_on_version_conflict("alice", || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err(Error::VersionConflict) }
    })
    .await;
    assert!(matches!(result, Err(Error::VersionConflict)));
    assert_eq!(calls.load(Ordering::SeqCst), LOGIN_TRIES_AFTER_LOCK + 1);
  }

  #[tokio::test]
  async fn retry_stops_at_first_non_conflict() {
    let calls = AtomicUsize::new(0);
    let result = retry_on_version_conflict("alice", || {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      async move { if n < 2 { Err(Error::VersionConflict) } else { Ok(n) } }
    })
    .await;
    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn registration_validates_every_field() {
    let fx = fixture().await;
    let bad = RegisterUser {
      username:         "x".repeat(26),
      email:            "nowhere".into(),
      password:         "abc".into(),
      password_confirm: "abd".into(),
    };
    let Err(Error::Validation(errors)) = fx.forum.users.register(bad, Language::English).await else {
      panic!("expected validation errors");
    };
    for field in ["username", "email", "password", "password_confirm"] {
      assert!(errors.has_field(field), "{field}");
    }
  }

  #[tokio::test]
  async fn registration_rejects_taken_username_and_email() {
    let fx = fixture().await;
    fx.forum.users.register(form("alice"), Language::English).await.unwrap();

    let mut dup = form("alice");
    dup.email = "ALICE@example.org".into();
    let Err(Error::Validation(errors)) = fx.forum.users.register(dup, Language::English).await else {
      panic!("expected validation errors");
    };
    assert!(errors.has_field("username"));
    assert!(errors.has_field("email"));
  }

  #[tokio::test]
  async fn registered_account_is_disabled_until_activated() {
    let fx = fixture().await;
    let user = fx.forum.users.register(form("alice"), Language::Russian).await.unwrap();
    assert!(!user.enabled);
    assert_eq!(user.language, Language::Russian);

    let sent = fx.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains(&user.activation_key.to_string()));

    assert!(fx.forum.users.login_user("alice", "secret", false).await.unwrap().is_none());

    let active = fx
      .forum
      .users
      .activate_account(&user.activation_key.to_string())
      .await
      .unwrap();
    assert!(active.enabled);
    assert_eq!(active.group_ids, [fx.groups.registered.id]);
    assert!(fx.forum.users.login_user("alice", "secret", false).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn unknown_activation_key_is_not_found() {
    let fx = fixture().await;
    let users = &fx.forum.users;
    assert!(users.activate_account(&Uuid::new_v4().to_string()).await.unwrap_err().is_not_found());
    assert!(users.activate_account("garbage").await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn login_creates_a_session_and_bumps_the_version() {
    let fx = fixture().await;
    let alice = fx.member("alice").await;
    let before = alice.user().unwrap().version;

    let session = fx
      .forum
      .users
      .login_with_lock_handling("alice", "password", true)
      .await
      .unwrap()
      .expect("valid credentials");
    assert!(session.remember_me);
    assert_eq!(session.user.version, before + 1);
    assert!(session.user.last_login.is_some());

    let principal = fx.forum.users.current_user(Some(session.token)).await.unwrap();
    assert_eq!(principal.user_id(), Some(session.user.id));

    fx.forum.users.logout(session.token).await.unwrap();
    assert!(fx.forum.users.current_user(Some(session.token)).await.unwrap().is_anonymous());
    assert!(fx.forum.users.current_user(None).await.unwrap().is_anonymous());
  }

  #[tokio::test]
  async fn sessions_expire_after_their_lifetime() {
    let fx = fixture().await;
    fx.member("alice").await;
    let lifetimes = SessionLifetimes { remembered: Duration::days(1), default: Duration::zero() };
    let users = fx.forum.users.clone().with_session_lifetimes(lifetimes);

    let short = users.login_user("alice", "password", false).await.unwrap().unwrap();
    assert!(users.current_user(Some(short.token)).await.unwrap().is_anonymous());

    let long = users.login_user("alice", "password", true).await.unwrap().unwrap();
    assert!(!users.current_user(Some(long.token)).await.unwrap().is_anonymous());
  }

  #[test]
  fn remembered_lifetime_follows_the_configured_days() {
    let lifetimes = SessionLifetimes::remembered_for_days(30);
    assert_eq!(lifetimes.for_login(true), Duration::days(30));
    assert_eq!(lifetimes.for_login(false), SessionLifetimes::default().default);
  }

  #[tokio::test]
  async fn wrong_password_or_unknown_user_fails_quietly() {
    let fx = fixture().await;
    fx.member("alice").await;
    assert!(fx.forum.users.login_user("alice", "nope", false).await.unwrap().is_none());
    assert!(fx.forum.users.login_user("bob", "password", false).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn restore_password_mails_a_working_password() {
    let fx = fixture().await;
    fx.member("alice").await;

    fx.forum.users.restore_password("alice@example.org").await.unwrap();
    let mail = fx.mailer.sent().pop().unwrap();
    let password = mail
      .body
      .lines()
      .find_map(|l| l.strip_prefix("Your new password is: "))
      .unwrap()
      .to_owned();
    assert!(fx.forum.users.login_user("alice", &password, false).await.unwrap().is_some());
    assert!(fx.forum.users.login_user("alice", "password", false).await.unwrap().is_none());

    let err = fx.forum.users.restore_password("bob@example.org").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[tokio::test]
  async fn failed_recovery_mail_keeps_the_old_password() {
    let fx = fixture().await;
    fx.member("alice").await;
    fx.mailer.fail_next();

    let err = fx.forum.users.restore_password("alice@example.org").await.unwrap_err();
    assert!(matches!(err, Error::MailingFailed(_)));
    assert!(fx.forum.users.login_user("alice", "password", false).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn usernames_are_capped_at_ten() {
    let fx = fixture().await;
    for n in 0..12 {
      fx.member(&format!("user{n:02}")).await;
    }
    let names = fx.forum.users.get_usernames("user").await.unwrap();
    assert_eq!(names.len(), MAX_USERNAMES);
    assert_eq!(names[0], "user00");
    assert!(fx.forum.users.get_usernames("  ").await.unwrap().is_empty());
    assert!(fx.forum.users.get_by_username("nobody").await.unwrap_err().is_not_found());
  }

  struct Directory {
    reachable: bool,
  }

  impl RegistrationPlugin for Directory {
    fn register_user(&self, form: &RegisterUser) -> Result<ValidationErrors, PluginError> {
      if !self.reachable {
        return Err(PluginError::NoConnection);
      }
      let mut errors = ValidationErrors::new();
      if form.username == "banned" {
        errors.add("username", "rejected");
      }
      Ok(errors)
    }
  }

  impl AuthenticationPlugin for Directory {
    fn authenticate(
      &self,
      username: &str,
      password: &str,
    ) -> Result<Option<AuthenticatedUser>, PluginError> {
      if !self.reachable {
        return Err(PluginError::Unexpected("directory down".into()));
      }
      Ok((password == "directory").then(|| AuthenticatedUser {
        username: username.into(),
        email:    format!("{username}@directory.example"),
      }))
    }
  }

  impl Plugin for Directory {
    fn name(&self) -> &str { "directory" }

    fn as_registration(&self) -> Option<&dyn RegistrationPlugin> { Some(self) }

    fn as_authentication(&self) -> Option<&dyn AuthenticationPlugin> { Some(self) }
  }

  #[tokio::test]
  async fn registration_plugins_are_consulted_first() {
    let fx = fixture_with_plugins(
      PluginRegistry::new().with("1", Arc::new(Directory { reachable: true })),
    )
    .await;
    let Err(Error::Validation(errors)) =
      fx.forum.users.register(form("banned"), Language::English).await
    else {
      panic!("expected plugin validation error");
    };
    assert_eq!(errors.len(), 1);

    let down = fixture_with_plugins(
      PluginRegistry::new().with("1", Arc::new(Directory { reachable: false })),
    )
    .await;
    let err = down.forum.users.register(form("alice"), Language::English).await.unwrap_err();
    assert!(matches!(err, Error::PluginConnection));
    let err = down.forum.users.login_user("alice", "x", false).await.unwrap_err();
    assert!(matches!(err, Error::PluginUnexpected));
  }

  #[tokio::test]
  async fn plugin_authenticated_users_get_a_local_account() {
    let fx = fixture_with_plugins(
      PluginRegistry::new().with("1", Arc::new(Directory { reachable: true })),
    )
    .await;
    let session = fx
      .forum
      .users
      .login_user("carol", "directory", false)
      .await
      .unwrap()
      .expect("plugin vouches for carol");
    assert_eq!(session.user.email, "carol@directory.example");
    assert!(session.user.enabled);
    assert_eq!(session.user.group_ids, [fx.groups.registered.id]);
  }
}
