//! Branch service: lookups, move-target filtering, bulk topic deletion and
//! statistics.

use std::sync::Arc;

use agora_core::{
  Error, Result,
  acl::{BranchPermission, GeneralPermission, ObjectIdentity},
  forum::{Branch, Section},
  store::ForumStore,
  user::Principal,
  validation::ValidationErrors,
};

use crate::{permission::PermissionService, topic::SilentTopicDeletion};

pub struct BranchService<S, D> {
  store:       Arc<S>,
  permissions: PermissionService<S>,
  topics:      D,
}

impl<S: ForumStore, D: SilentTopicDeletion> BranchService<S, D> {
  pub fn new(store: Arc<S>, topics: D) -> Self {
    Self { permissions: PermissionService::new(store.clone()), store, topics }
  }

  pub async fn get(&self, id: i64) -> Result<Branch> {
    if !self.store.branch_exists(id).await.map_err(Error::store)? {
      return Err(Error::not_found("branch", id));
    }
    self
      .store
      .get_branch(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("branch", id))
  }

  pub async fn get_sections(&self) -> Result<Vec<Section>> {
    self.store.list_sections().await.map_err(Error::store)
  }

  async fn section(&self, id: i64) -> Result<Section> {
    if !self.store.section_exists(id).await.map_err(Error::store)? {
      return Err(Error::not_found("section", id));
    }
    self
      .store
      .get_section(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("section", id))
  }

  pub async fn get_branches_in_section(&self, section_id: i64) -> Result<Vec<Branch>> {
    Ok(self.section(section_id).await?.branches)
  }

  /// Branches of a section the topic could be moved to: visible to
  /// `principal` and not the topic's current branch.
  pub async fn get_available_branches_in_section(
    &self,
    principal: &Principal,
    section_id: i64,
    topic_id: i64,
  ) -> Result<Vec<Branch>> {
    let branches = self.get_branches_in_section(section_id).await?;
    let current = self.current_branch_of(topic_id).await?;
    self.visible_except(principal, branches, current).await
  }

  /// [`get_available_branches_in_section`](Self::get_available_branches_in_section)
  /// across every section.
  pub async fn get_all_available_branches(
    &self,
    principal: &Principal,
    topic_id: i64,
  ) -> Result<Vec<Branch>> {
    let current = self.current_branch_of(topic_id).await?;
    let branches = self
      .get_sections()
      .await?
      .into_iter()
      .flat_map(|s| s.branches)
      .collect();
    self.visible_except(principal, branches, current).await
  }

  async fn current_branch_of(&self, topic_id: i64) -> Result<i64> {
    let topic = self
      .store
      .get_topic(topic_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("topic", topic_id))?;
    Ok(topic.branch_id)
  }

  async fn visible_except(
    &self,
    principal: &Principal,
    branches: Vec<Branch>,
    excluded: i64,
  ) -> Result<Vec<Branch>> {
    let mut visible = Vec::with_capacity(branches.len());
    for branch in branches {
      if branch.id == excluded {
        continue;
      }
      if self
        .permissions
        .has_branch_permission(principal, branch.id, BranchPermission::ViewTopics)
        .await?
      {
        visible.push(branch);
      }
    }
    Ok(visible)
  }

  /// Silently delete every topic of the branch; returns the emptied branch.
  pub async fn delete_all_topics(&self, branch_id: i64) -> Result<Branch> {
    self.get(branch_id).await?;
    let ids = self
      .store
      .topic_ids_in_branch(branch_id)
      .await
      .map_err(Error::store)?;
    for id in &ids {
      self.topics.delete_topic_silent(*id).await?;
    }
    tracing::info!(branch = branch_id, topics = ids.len(), "all topics deleted");
    self.get(branch_id).await
  }

  /// Fill the transient counters of already-loaded branches.
  pub async fn fill_statistic_info(&self, branches: &mut [Branch]) -> Result<()> {
    for branch in branches {
      branch.topic_count = self
        .store
        .count_topics_in_branch(branch.id)
        .await
        .map_err(Error::store)?;
      branch.post_count = self
        .store
        .count_posts_in_branch(branch.id)
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }

  /// Rename a branch. Requires `GeneralPermission.ADMIN` on it.
  pub async fn change_branch_info(
    &self,
    principal: &Principal,
    section_id: i64,
    branch_id: i64,
    name: String,
    description: Option<String>,
  ) -> Result<Branch> {
    let branch = self.get(branch_id).await?;
    if branch.section_id != section_id {
      return Err(Error::not_found("branch", format!("{branch_id} in section {section_id}")));
    }
    self
      .permissions
      .check_general_permission(
        principal,
        ObjectIdentity::branch(branch_id),
        GeneralPermission::Admin,
      )
      .await?;

    if name.trim().is_empty() {
      return Err(Error::Validation(ValidationErrors::single("name", "blank")));
    }
    let description = description.filter(|d| !d.trim().is_empty());
    self
      .store
      .update_branch(branch_id, name, description)
      .await
      .map_err(Error::store)?;
    self.get(branch_id).await
  }
}
