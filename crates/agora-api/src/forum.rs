//! Sections, branches, topics and posts.

use agora_core::{
  acl::{BranchPermission, GeneralPermission, ObjectIdentity},
  forum::Branch,
  page::{Page, PageRequest},
  store::ForumStore,
  topic::{NewPoll, NewTopic},
};
use agora_service::post::DeletedPost;
use axum::{
  Form, Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::{NaiveDate, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
  AppState,
  error::ApiError,
  etag::{matches, topic_page_etag},
  response::{JsonResponse, View, see_other},
  session::CurrentUser,
};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
  pub page: Option<String>,
}

impl PageParams {
  pub fn request_size(&self, size: u32) -> PageRequest {
    PageRequest::parse(self.page.as_deref(), size)
  }

  fn request<S>(&self, state: &AppState<S>) -> PageRequest { self.request_size(state.config.page_size) }
}

fn checkbox(value: &Option<String>) -> bool { value.as_deref() == Some("on") }

fn page_model<T: Serialize>(page: &Page<T>) -> serde_json::Value {
  json!({
    "content": page.content,
    "number": page.number,
    "size": page.size,
    "total": page.total,
    "total_pages": page.total_pages(),
  })
}

// ─── Sections & branches ──────────────────────────────────────────────────────

/// `GET /sections`: every section with the branches the user may view,
/// statistics filled in.
pub async fn sections<S: ForumStore>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let forum = &state.forum;
  let mut sections = forum.branches.get_sections().await?;
  for section in &mut sections {
    let mut visible = Vec::with_capacity(section.branches.len());
    for branch in std::mem::take(&mut section.branches) {
      if forum
        .permissions
        .has_branch_permission(&user.principal, branch.id, BranchPermission::ViewTopics)
        .await?
      {
        visible.push(branch);
      }
    }
    forum.branches.fill_statistic_info(&mut visible).await?;
    section.branches = visible;
  }
  Ok(View::new("sectionList", json!({ "sections": sections })))
}

/// `GET /branches/{id}[?page=n]`
pub async fn branch<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Query(params): Query<PageParams>,
  user: CurrentUser,
) -> Result<View, ApiError> {
  let branch = state.forum.branches.get(id).await?;
  let topics = state
    .forum
    .topics
    .get_topics_page(&user.principal, id, params.request(&state))
    .await?;
  Ok(View::new("topicList", json!({ "branch": branch, "topics": page_model(&topics) })))
}

#[derive(Debug, Deserialize)]
pub struct BranchForm {
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
}

/// `POST /branches/{id}/edit`
pub async fn edit_branch<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<BranchForm>,
) -> Result<JsonResponse, ApiError> {
  let branch = state.forum.branches.get(id).await?;
  let description = form.description.filter(|d| !d.trim().is_empty());
  let updated = state
    .forum
    .branches
    .change_branch_info(&user.principal, branch.section_id, id, form.name, description)
    .await?;
  Ok(JsonResponse::success_with(updated))
}

/// `POST /branches/{id}/topics/delete`: administrators only.
pub async fn delete_all_topics<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  state
    .forum
    .permissions
    .check_general_permission(&user.principal, ObjectIdentity::branch(id), GeneralPermission::Admin)
    .await?;
  let branch = state.forum.branches.delete_all_topics(id).await?;
  Ok(see_other(&format!("/branches/{}", branch.id)))
}

#[derive(Debug, Deserialize)]
pub struct MoveTargetParams {
  pub topic_id: i64,
}

/// A branch as offered in the "move topic" picker.
#[derive(Debug, Serialize)]
struct BranchChoice {
  id:   i64,
  name: String,
}

fn choices(branches: Vec<Branch>) -> Vec<BranchChoice> {
  branches.into_iter().map(|b| BranchChoice { id: b.id, name: b.name }).collect()
}

/// `GET /sections/{id}/available?topic_id=n`
pub async fn available_in_section<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(section_id): Path<i64>,
  Query(params): Query<MoveTargetParams>,
  user: CurrentUser,
) -> Result<JsonResponse, ApiError> {
  let branches = state
    .forum
    .branches
    .get_available_branches_in_section(&user.principal, section_id, params.topic_id)
    .await?;
  Ok(JsonResponse::success_with(choices(branches)))
}

/// `GET /branches/available?topic_id=n`
pub async fn available_branches<S: ForumStore>(
  State(state): State<AppState<S>>,
  Query(params): Query<MoveTargetParams>,
  user: CurrentUser,
) -> Result<JsonResponse, ApiError> {
  let branches = state
    .forum
    .branches
    .get_all_available_branches(&user.principal, params.topic_id)
    .await?;
  Ok(JsonResponse::success_with(choices(branches)))
}

// ─── Topics ───────────────────────────────────────────────────────────────────

/// New-topic form. Poll items come one per line.
#[derive(Debug, Deserialize)]
pub struct TopicForm {
  pub title:            String,
  pub body:             String,
  #[serde(default)]
  pub poll_title:       Option<String>,
  #[serde(default)]
  pub poll_items:       Option<String>,
  /// `YYYY-MM-DD`; the poll closes at the end of that day (UTC).
  #[serde(default)]
  pub poll_ending_date: Option<String>,
  #[serde(default)]
  pub multiple_answers: Option<String>,
}

impl TopicForm {
  fn into_new_topic(self) -> Result<NewTopic, ApiError> {
    let poll_title = self.poll_title.filter(|t| !t.trim().is_empty());
    let poll = match poll_title {
      None => None,
      Some(title) => {
        let ending_date = match self.poll_ending_date.as_deref().map(str::trim) {
          None | Some("") => None,
          Some(raw) => {
            let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
              .map_err(|e| ApiError::BadRequest(format!("poll ending date {raw:?}: {e}")))?;
            day.and_hms_opt(23, 59, 59).map(|end| Utc.from_utc_datetime(&end))
          }
        };
        let items = self
          .poll_items
          .unwrap_or_default()
          .lines()
          .map(str::trim)
          .filter(|line| !line.is_empty())
          .map(str::to_owned)
          .collect();
        Some(NewPoll {
          title,
          items,
          ending_date,
          multiple_answers: checkbox(&self.multiple_answers),
        })
      }
    };
    Ok(NewTopic { title: self.title, body: self.body, poll, ..Default::default() })
  }
}

/// `POST /branches/{id}/topics`
pub async fn create_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(branch_id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<TopicForm>,
) -> Result<Response, ApiError> {
  let input = form.into_new_topic()?;
  let (topic, _) = state.forum.topics.create_topic(&user.principal, branch_id, input).await?;
  Ok(see_other(&format!("/topics/{}", topic.id)))
}

/// `GET /topics/{id}[?page=n]`: honours `If-None-Match`.
pub async fn topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Query(params): Query<PageParams>,
  user: CurrentUser,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let (topic, posts) = state
    .forum
    .topics
    .get_posts_page(&user.principal, id, params.request(&state))
    .await?;
  let etag = topic_page_etag(&topic, &posts);

  let fresh = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|candidates| matches(candidates, &etag));
  if fresh {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }

  let view = View::new("postList", json!({ "topic": topic, "posts": page_model(&posts) }));
  Ok(([(header::ETAG, etag)], view).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ReplyForm {
  pub body: String,
}

/// `POST /topics/{id}/posts`
pub async fn reply<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<ReplyForm>,
) -> Result<Response, ApiError> {
  let post = state.forum.topics.reply_to_topic(&user.principal, id, form.body).await?;
  Ok(see_other(&format!("/topics/{id}#post-{}", post.id)))
}

#[derive(Debug, Deserialize)]
pub struct EditTopicForm {
  pub title:  String,
  pub body:   String,
  /// `"on"` keeps the editor subscribed.
  #[serde(default)]
  pub notify: Option<String>,
}

/// `POST /topics/{id}/edit`
pub async fn edit_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<EditTopicForm>,
) -> Result<Response, ApiError> {
  let notify = checkbox(&form.notify);
  state
    .forum
    .topics
    .update_topic(&user.principal, id, form.title, form.body, notify)
    .await?;
  Ok(see_other(&format!("/topics/{id}")))
}

#[derive(Debug, Deserialize)]
pub struct MoveForm {
  pub branch_id: i64,
}

/// `POST /topics/{id}/move`
pub async fn move_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<MoveForm>,
) -> Result<JsonResponse, ApiError> {
  let topic = state.forum.topics.move_topic(&user.principal, id, form.branch_id).await?;
  Ok(JsonResponse::success_with(topic))
}

/// `POST /topics/{id}/close`
pub async fn close_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  state.forum.topics.close_topic(&user.principal, id).await?;
  Ok(see_other(&format!("/topics/{id}")))
}

/// `POST /topics/{id}/open`
pub async fn open_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  state.forum.topics.open_topic(&user.principal, id).await?;
  Ok(see_other(&format!("/topics/{id}")))
}

/// `POST /topics/{id}/delete`
pub async fn delete_topic<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  let branch = state.forum.topics.delete_topic(&user.principal, id).await?;
  Ok(see_other(&format!("/branches/{}", branch.id)))
}

#[derive(Debug, Deserialize)]
pub struct Ballot {
  pub items: Vec<i64>,
}

/// `POST /topics/{id}/vote` with body `{"items":[1,2]}`
pub async fn vote<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Json(ballot): Json<Ballot>,
) -> Result<JsonResponse, ApiError> {
  let poll = state.forum.topics.vote(&user.principal, id, ballot.items).await?;
  Ok(JsonResponse::success_with(poll))
}

// ─── Posts ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PostForm {
  pub content: String,
}

/// `POST /posts/{id}/edit`
pub async fn edit_post<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
  Form(form): Form<PostForm>,
) -> Result<Response, ApiError> {
  let post = state.forum.posts.update_post(&user.principal, id, form.content).await?;
  Ok(see_other(&format!("/topics/{}#post-{id}", post.topic_id)))
}

/// `POST /posts/{id}/delete`: back to the topic, or to the branch when the
/// topic went with its first post.
pub async fn delete_post<S: ForumStore>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  user: CurrentUser,
) -> Result<Response, ApiError> {
  let location = match state.forum.posts.delete_post(&user.principal, id).await? {
    DeletedPost::Reply { topic_id } => format!("/topics/{topic_id}"),
    DeletedPost::Topic { branch_id, .. } => format!("/branches/{branch_id}"),
  };
  Ok(see_other(&location))
}
