//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use agora_core::{
  store::{SectionDao as _, UserDao as _},
  validation::ValidationErrors,
};
use agora_service::{
  Forum,
  bootstrap::seed_forum,
  mail::LogMailer,
  plugin::{
    AuthenticatedUser, AuthenticationPlugin, ExtendedPlugin, Plugin, PluginError, PluginRegistry,
    PluginRequest, PluginResponse, RegistrationPlugin,
  },
  user::RegisterUser,
};
use agora_store_sqlite::SqliteStore;
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use serde_json::Value;
use tower::ServiceExt as _;

use super::*;

struct Harness {
  state:     AppState<SqliteStore>,
  store:     Arc<SqliteStore>,
  branch_id: i64,
}

async fn harness() -> Harness { harness_with(PluginRegistry::new()).await }

async fn harness_with(plugins: PluginRegistry) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  seed_forum(store.as_ref()).await.unwrap();
  let branch_id = store.list_sections().await.unwrap()[0].branches[0].id;
  let forum = Forum::new(store.clone(), Arc::new(LogMailer), plugins, "http://forum.test");
  Harness { state: AppState::new(forum, ApiConfig::default()), store, branch_id }
}

impl Harness {
  async fn send(&self, request: Request<Body>) -> Response {
    router(self.state.clone()).oneshot(request).await.unwrap()
  }

  async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
      builder = builder.header(header::COOKIE, cookie);
    }
    self.send(builder.body(Body::empty()).unwrap()).await
  }

  async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response {
    let mut builder = Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
      builder = builder.header(header::COOKIE, cookie);
    }
    self.send(builder.body(Body::from(form.to_owned())).unwrap()).await
  }

  /// Register, activate and log in `name` with password `secret`; returns
  /// the `Cookie` header value of the session.
  async fn sign_up(&self, name: &str) -> String {
    let form = format!("username={name}&email={name}%40example.org&password=secret&password_confirm=secret");
    let registered = body_json(self.post_form("/user/new", None, &form).await).await;
    assert_eq!(registered["view"], "afterRegistration");

    let user = self.store.get_user_by_username(name.into()).await.unwrap().unwrap();
    let activated = self.get(&format!("/user/activate/{}", user.activation_key), None).await;
    assert_eq!(location(&activated), "/login");

    let login = self
      .post_form("/login", None, &format!("username={name}&password=secret&referer=%2Fsections"))
      .await;
    assert_eq!(location(&login), "/sections");
    session_cookie_of(&login)
  }
}

async fn body_json(response: Response) -> Value {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
  assert_eq!(response.status(), StatusCode::SEE_OTHER);
  response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
  response
    .headers()
    .get_all(header::SET_COOKIE)
    .iter()
    .map(|v| v.to_str().unwrap().to_owned())
    .collect()
}

fn session_cookie_of(response: &Response) -> String {
  set_cookies(response)
    .into_iter()
    .find(|c| c.starts_with("agora_session="))
    .and_then(|c| c.split(';').next().map(str::to_owned))
    .unwrap()
}

// ── Plugins ───────────────────────────────────────────────────────────────────

struct Offline;

impl RegistrationPlugin for Offline {
  fn register_user(&self, _: &RegisterUser) -> Result<ValidationErrors, PluginError> {
    Err(PluginError::NoConnection)
  }
}

impl AuthenticationPlugin for Offline {
  fn authenticate(&self, _: &str, _: &str) -> Result<Option<AuthenticatedUser>, PluginError> {
    Err(PluginError::Unexpected("directory crashed".into()))
  }
}

impl Plugin for Offline {
  fn name(&self) -> &str { "offline" }

  fn as_registration(&self) -> Option<&dyn RegistrationPlugin> { Some(self) }

  fn as_authentication(&self) -> Option<&dyn AuthenticationPlugin> { Some(self) }
}

struct Echo;

impl ExtendedPlugin for Echo {
  fn do_action(
    &self,
    plugin_id: &str,
    action: &str,
    request: PluginRequest,
  ) -> Result<PluginResponse, PluginError> {
    Ok(PluginResponse::ok(
      "text/plain",
      format!("{plugin_id}:{action}:{}:{}", request.method, request.body),
    ))
  }
}

impl Plugin for Echo {
  fn name(&self) -> &str { "echo" }

  fn as_extended(&self) -> Option<&dyn ExtendedPlugin> { Some(self) }
}

// ── Users ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_registration_rerenders_the_form() {
  let h = harness().await;
  let form = "username=&email=nope&password=1&password_confirm=2";
  let view = body_json(h.post_form("/user/new", None, form).await).await;
  assert_eq!(view["view"], "registration");
  let fields: Vec<&str> =
    view["model"]["errors"].as_array().unwrap().iter().map(|e| e["field"].as_str().unwrap()).collect();
  assert!(fields.contains(&"username"));
  assert!(fields.contains(&"email"));
  assert!(fields.contains(&"password_confirm"));
  assert_eq!(view["model"]["new_user"]["password"], "");

  let ajax = body_json(h.post_form("/user/new_ajax", None, form).await).await;
  assert_eq!(ajax["status"], "FAIL");
  assert!(ajax["result"].is_array());
}

#[tokio::test]
async fn plugin_failures_redirect_with_error_codes() {
  let h = harness_with(PluginRegistry::new().with("7", Arc::new(Offline))).await;
  let form = "username=bob&email=bob%40example.org&password=secret&password_confirm=secret";

  let response = h.post_form("/user/new", None, form).await;
  assert_eq!(location(&response), "/user/new?reg_error=1");

  let ajax = body_json(h.post_form("/user/new_ajax", None, form).await).await;
  assert_eq!(ajax["result"]["customError"], "connectionError");

  let response = h.post_form("/login", None, "username=bob&password=secret").await;
  assert_eq!(location(&response), "/login?login_error=3");

  let ajax = body_json(h.post_form("/login_ajax", None, "username=bob&password=secret").await).await;
  assert_eq!(ajax["status"], "FAIL");
  assert_eq!(ajax["result"]["customError"], "unexpectedError");

  let plugins = body_json(h.get("/user/new_ajax", None).await).await;
  assert_eq!(plugins["result"], serde_json::json!(["7"]));
}

#[tokio::test]
async fn login_sets_session_and_locale_cookies() {
  let h = harness().await;
  let cookie = h.sign_up("alice").await;

  let cookies = {
    let response = h
      .post_form("/login_ajax", None, "username=alice&password=secret&remember_me=on")
      .await;
    assert_eq!(response.status(), StatusCode::OK);
    set_cookies(&response)
  };
  assert!(cookies.iter().any(|c| c.starts_with("agora_session=") && c.contains("Max-Age")));
  assert!(cookies.iter().any(|c| c.starts_with("lang=en")));

  let page = h.get("/login", Some(&cookie)).await;
  assert_eq!(location(&page), "/");

  let logout = h.get("/logout", Some(&cookie)).await;
  assert_eq!(location(&logout), "/");
  let page = body_json(h.get("/login", Some(&cookie)).await).await;
  assert_eq!(page["view"], "login");
}

#[tokio::test]
async fn wrong_password_shows_login_error() {
  let h = harness().await;
  h.sign_up("alice").await;
  let view = body_json(h.post_form("/login", None, "username=alice&password=wrong").await).await;
  assert_eq!(view["view"], "login");
  assert_eq!(view["model"]["login_error"], 1);
  assert_eq!(view["model"]["username"], "alice");

  let ajax = body_json(h.post_form("/login_ajax", None, "username=alice&password=wrong").await).await;
  assert_eq!(ajax["status"], "FAIL");
}

#[tokio::test]
async fn unknown_activation_key_shows_expired_page() {
  let h = harness().await;
  let view = body_json(h.get("/user/activate/not-a-uuid", None).await).await;
  assert_eq!(view["view"], "errors/activationExpired");
}

#[tokio::test]
async fn password_restore_reports_unknown_email_inline() {
  let h = harness().await;
  let view = body_json(h.post_form("/password/restore", None, "email=ghost%40example.org").await).await;
  assert_eq!(view["view"], "restorePassword");
  assert_eq!(view["model"]["errors"][0]["field"], "email");

  h.sign_up("alice").await;
  let view = body_json(h.post_form("/password/restore", None, "email=alice%40example.org").await).await;
  assert_eq!(view["model"]["message"], "label.restorePassword.completed");
}

#[tokio::test]
async fn usernames_are_looked_up_by_pattern() {
  let h = harness().await;
  h.sign_up("alice").await;
  h.sign_up("alina").await;
  let found = body_json(h.post_form("/usernames", None, "pattern=ali").await).await;
  assert_eq!(found["status"], "SUCCESS");
  assert_eq!(found["result"], serde_json::json!(["alice", "alina"]));
}

#[tokio::test]
async fn plugin_actions_reach_extended_plugins_only() {
  let h = harness_with(PluginRegistry::new().with("3", Arc::new(Echo))).await;
  let response = h.post_form("/plugin/3/ping?x=1", None, "hello").await;
  assert_eq!(response.status(), StatusCode::OK);
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  assert_eq!(&bytes[..], b"3:ping:POST:hello");

  let missing = h.get("/plugin/9/ping", None).await;
  assert_eq!(missing.status(), StatusCode::OK);
  let bytes = axum::body::to_bytes(missing.into_body(), usize::MAX).await.unwrap();
  assert!(bytes.is_empty());
}

// ── Forum ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_users_read_but_cannot_post() {
  let h = harness().await;
  let sections = body_json(h.get("/sections", None).await).await;
  assert_eq!(sections["model"]["sections"][0]["branches"][0]["name"], "Welcome");

  let response = h
    .post_form(&format!("/branches/{}/topics", h.branch_id), None, "title=Hi&body=there")
    .await;
  assert_eq!(response.status(), StatusCode::FORBIDDEN);

  assert_eq!(h.get("/topics/999", None).await.status(), StatusCode::NOT_FOUND);
  assert_eq!(h.get("/branches/999", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn topic_page_supports_conditional_get() {
  let h = harness().await;
  let cookie = h.sign_up("alice").await;
  let created = h
    .post_form(&format!("/branches/{}/topics", h.branch_id), Some(&cookie), "title=Hello&body=First+post")
    .await;
  let topic_url = location(&created).to_owned();

  let first = h.get(&topic_url, None).await;
  assert_eq!(first.status(), StatusCode::OK);
  let etag = first.headers().get(header::ETAG).unwrap().to_str().unwrap().to_owned();
  let view = body_json(first).await;
  assert_eq!(view["view"], "postList");
  assert_eq!(view["model"]["posts"]["total"], 1);

  let cached = h
    .send(
      Request::builder()
        .uri(&topic_url)
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap(),
    )
    .await;
  assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);

  let reply = h.post_form(&format!("{topic_url}/posts"), Some(&cookie), "body=Second").await;
  assert!(location(&reply).starts_with(&topic_url));
  let changed = h
    .send(
      Request::builder()
        .uri(&topic_url)
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap(),
    )
    .await;
  assert_eq!(changed.status(), StatusCode::OK);
}

#[tokio::test]
async fn topics_with_polls_accept_votes() {
  let h = harness().await;
  let cookie = h.sign_up("alice").await;
  let form = "title=Colours&body=Pick&poll_title=Favourite&poll_items=red%0Ablue";
  let created = h.post_form(&format!("/branches/{}/topics", h.branch_id), Some(&cookie), form).await;
  let topic_url = location(&created).to_owned();

  let view = body_json(h.get(&topic_url, None).await).await;
  let item = view["model"]["topic"]["poll"]["items"][1]["id"].as_i64().unwrap();

  let ballot = h
    .send(
      Request::builder()
        .method("POST")
        .uri(format!("{topic_url}/vote"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &cookie)
        .body(Body::from(format!("{{\"items\":[{item}]}}")))
        .unwrap(),
    )
    .await;
  let poll = body_json(ballot).await;
  assert_eq!(poll["status"], "SUCCESS");
  assert_eq!(poll["result"]["items"][1]["votes"], 1);
}

#[tokio::test]
async fn validation_failures_use_the_fail_envelope() {
  let h = harness().await;
  let cookie = h.sign_up("alice").await;
  let response = h
    .post_form(&format!("/branches/{}/topics", h.branch_id), Some(&cookie), "title=&body=")
    .await;
  assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
  let body = body_json(response).await;
  assert_eq!(body["status"], "FAIL");
}

#[tokio::test]
async fn deleting_the_first_post_returns_to_the_branch() {
  let h = harness().await;
  let cookie = h.sign_up("alice").await;
  let created = h
    .post_form(&format!("/branches/{}/topics", h.branch_id), Some(&cookie), "title=Hello&body=First")
    .await;
  let topic_url = location(&created).to_owned();
  let view = body_json(h.get(&topic_url, None).await).await;
  let first_post = view["model"]["posts"]["content"][0]["id"].as_i64().unwrap();

  let deleted = h.post_form(&format!("/posts/{first_post}/delete"), Some(&cookie), "").await;
  assert_eq!(location(&deleted), format!("/branches/{}", h.branch_id));
  assert_eq!(h.get(&topic_url, None).await.status(), StatusCode::NOT_FOUND);
}

// ── Private messages ──────────────────────────────────────────────────────────

#[tokio::test]
async fn messages_flow_between_inbox_and_outbox() {
  let h = harness().await;
  let alice = h.sign_up("alice").await;
  let bob = h.sign_up("bob").await;

  assert_eq!(h.get("/pm/new", None).await.status(), StatusCode::FORBIDDEN);
  assert_eq!(h.get("/pm/new", Some(&alice)).await.status(), StatusCode::OK);

  let sent = h.post_form("/pm/send", Some(&alice), "recipient=bob&title=Hi&body=Hello+Bob").await;
  assert_eq!(location(&sent), "/outbox");

  let inbox = body_json(h.get("/inbox", Some(&bob)).await).await;
  assert_eq!(inbox["model"]["messages"]["total"], 1);
  let id = inbox["model"]["messages"]["content"][0]["id"].as_i64().unwrap();

  let shown = body_json(h.get(&format!("/pm/{id}"), Some(&bob)).await).await;
  assert_eq!(shown["view"], "pm/showPm");
  assert_eq!(shown["model"]["message"]["read"], true);

  let deleted = h.post_form("/pm/delete", Some(&bob), &format!("ids={id}")).await;
  assert_eq!(location(&deleted), "/inbox");
  let outbox = body_json(h.get("/outbox", Some(&alice)).await).await;
  assert_eq!(outbox["model"]["messages"]["total"], 1);
}

#[tokio::test]
async fn invalid_message_rerenders_the_form() {
  let h = harness().await;
  let alice = h.sign_up("alice").await;
  let view = body_json(h.post_form("/pm/send", Some(&alice), "recipient=ghost&title=&body=x").await).await;
  assert_eq!(view["view"], "pm/pmForm");
  assert_eq!(view["model"]["recipient"], "ghost");

  let draft = h.post_form("/pm/draft", Some(&alice), "recipient=alice&title=Note&body=todo").await;
  assert_eq!(location(&draft), "/drafts");
  let drafts = body_json(h.get("/drafts", Some(&alice)).await).await;
  let id = drafts["model"]["messages"]["content"][0]["id"].as_i64().unwrap();
  let form = body_json(h.get(&format!("/pm/{id}"), Some(&alice)).await).await;
  assert_eq!(form["view"], "pm/pmForm");
  assert_eq!(form["model"]["recipient"], "alice");
}
