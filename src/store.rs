use std::collections::HashMap;
use std::future::Future;

use anyhow::anyhow;
use tokio::sync::Mutex;

use crate::error::{LibError, Result};
use crate::models::{
    CategoryDefinition, CategoryId, CategoryNode, CategorySummary, DeletePlan,
};
use crate::settings::{SettingsPatch, SiteSettings};
use crate::tree;

/// One structural change, already validated against the snapshot it was
/// computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryChange {
    Insert(CategoryDefinition),
    Update {
        id: CategoryId,
        definition: CategoryDefinition,
    },
    Delete(DeletePlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedChange {
    Inserted(CategoryNode),
    Updated(CategoryNode),
    Deleted {
        target: CategoryNode,
        plan: DeletePlan,
    },
}

/// Persistence boundary for the category node set.
///
/// `apply` reads the current snapshot inside the store's write boundary,
/// hands it to `plan`, and writes the returned change before any other
/// writer can observe or modify the set. A second concurrent mutation
/// therefore always plans against the first one's committed result.
pub trait CategoryStore: Send + Sync {
    fn snapshot(&self) -> impl Future<Output = Result<Vec<CategoryNode>>> + Send;

    fn category_summaries(&self) -> impl Future<Output = Result<Vec<CategorySummary>>> + Send;

    fn apply<F>(&self, plan: F) -> impl Future<Output = Result<AppliedChange>> + Send
    where
        F: FnOnce(&[CategoryNode]) -> Result<CategoryChange> + Send;
}

pub trait SettingsStore: Send + Sync {
    fn load_settings(&self) -> impl Future<Output = Result<SiteSettings>> + Send;

    /// Applies `patch` atomically and returns the stored result.
    fn update_settings(
        &self,
        patch: &SettingsPatch,
    ) -> impl Future<Output = Result<SiteSettings>> + Send;
}

#[derive(Debug)]
struct MemoryState {
    nodes: Vec<CategoryNode>,
    next_id: i64,
    post_links: Vec<(i64, CategoryId)>,
    settings: SiteSettings,
}

/// Single-writer in-process store. The mutex is the write boundary.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                nodes: Vec::new(),
                next_id: 1,
                post_links: Vec::new(),
                settings: SiteSettings::default(),
            }),
        }
    }

    /// Seeds the store with an existing node set, which must already be a
    /// valid forest.
    pub fn with_nodes(nodes: Vec<CategoryNode>) -> Result<Self> {
        tree::ensure_category_invariants(&nodes)?;
        let next_id = nodes.iter().map(|node| node.id.0).max().unwrap_or(0) + 1;
        Ok(Self {
            state: Mutex::new(MemoryState {
                nodes,
                next_id,
                post_links: Vec::new(),
                settings: SiteSettings::default(),
            }),
        })
    }

    pub async fn link_post(&self, post_id: i64, category_id: CategoryId) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.nodes.iter().any(|node| node.id == category_id) {
            return Err(LibError::not_found(
                "Category not found",
                anyhow!("category {} not found", category_id),
            ));
        }
        if !state.post_links.contains(&(post_id, category_id)) {
            state.post_links.push((post_id, category_id));
        }
        Ok(())
    }
}

impl CategoryStore for MemoryStore {
    async fn snapshot(&self) -> Result<Vec<CategoryNode>> {
        Ok(self.state.lock().await.nodes.clone())
    }

    async fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<CategoryId, i64> = HashMap::new();
        for (_, category_id) in &state.post_links {
            *counts.entry(*category_id).or_default() += 1;
        }
        Ok(state
            .nodes
            .iter()
            .map(|node| CategorySummary {
                node: node.clone(),
                post_count: counts.get(&node.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn apply<F>(&self, plan: F) -> Result<AppliedChange>
    where
        F: FnOnce(&[CategoryNode]) -> Result<CategoryChange> + Send,
    {
        let mut state = self.state.lock().await;
        let change = plan(&state.nodes)?;

        let mut candidate = state.nodes.clone();
        let applied = match change {
            CategoryChange::Insert(definition) => {
                let node = definition.into_node(CategoryId(state.next_id));
                candidate.push(node.clone());
                AppliedChange::Inserted(node)
            }
            CategoryChange::Update { id, definition } => {
                let Some(slot) = candidate.iter_mut().find(|node| node.id == id) else {
                    return Err(LibError::not_found(
                        "Category not found",
                        anyhow!("category {} not found", id),
                    ));
                };
                *slot = definition.into_node(id);
                AppliedChange::Updated(slot.clone())
            }
            CategoryChange::Delete(plan) => {
                let Some(target) = candidate.iter().find(|node| node.id == plan.target).cloned()
                else {
                    return Err(LibError::not_found(
                        "Category not found",
                        anyhow!("category {} not found", plan.target),
                    ));
                };
                tree::apply_delete_plan(&mut candidate, &plan);
                AppliedChange::Deleted { target, plan }
            }
        };

        // The candidate must still be a valid forest; otherwise nothing is
        // committed.
        tree::ensure_category_invariants(&candidate)?;

        if let AppliedChange::Inserted(_) = applied {
            state.next_id += 1;
        }
        if let AppliedChange::Deleted { plan, .. } = &applied {
            state
                .post_links
                .retain(|(_, category_id)| !plan.removed.contains(category_id));
        }
        state.nodes = candidate;
        Ok(applied)
    }
}

impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> Result<SiteSettings> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<SiteSettings> {
        let mut state = self.state.lock().await;
        patch.apply_to(&mut state.settings);
        Ok(state.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::DeletePolicy;

    fn definition(name: &str, parent: Option<i64>) -> CategoryDefinition {
        CategoryDefinition {
            name: name.to_string(),
            slug: crate::slug::slugify(name),
            parent_id: parent.map(CategoryId),
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let first = store
            .apply(|_| Ok(CategoryChange::Insert(definition("News", None))))
            .await
            .expect("insert should succeed");
        let second = store
            .apply(|_| Ok(CategoryChange::Insert(definition("Tech", Some(1)))))
            .await
            .expect("insert should succeed");

        assert!(matches!(first, AppliedChange::Inserted(ref node) if node.id == CategoryId(1)));
        assert!(matches!(second, AppliedChange::Inserted(ref node) if node.id == CategoryId(2)));
        assert_eq!(store.snapshot().await.expect("snapshot").len(), 2);
    }

    #[tokio::test]
    async fn failed_plan_leaves_state_untouched() {
        let store = MemoryStore::new();
        let err = store
            .apply(|_| Err(LibError::message("nope")))
            .await
            .expect_err("plan error should propagate");
        assert_eq!(err.public, "nope");
        assert!(store.snapshot().await.expect("snapshot").is_empty());
    }

    #[tokio::test]
    async fn invalid_candidate_is_not_committed() {
        let store = MemoryStore::new();
        store
            .apply(|_| Ok(CategoryChange::Insert(definition("News", None))))
            .await
            .expect("insert should succeed");

        // A change that skipped validation still cannot break the forest.
        let err = store
            .apply(|_| Ok(CategoryChange::Insert(definition("News", None))))
            .await
            .expect_err("duplicate slug should be caught");
        assert_eq!(err.kind, ErrorKind::DuplicateSlug);

        let err = store
            .apply(|_| Ok(CategoryChange::Insert(definition("Orphan", Some(42)))))
            .await
            .expect_err("dangling parent should be caught");
        assert_eq!(err.kind, ErrorKind::InternalConsistency);
        assert_eq!(store.snapshot().await.expect("snapshot").len(), 1);
    }

    #[tokio::test]
    async fn summaries_count_posts_and_drop_links_on_delete() {
        let store = MemoryStore::new();
        store
            .apply(|_| Ok(CategoryChange::Insert(definition("News", None))))
            .await
            .expect("insert should succeed");
        store
            .apply(|_| Ok(CategoryChange::Insert(definition("Tech", Some(1)))))
            .await
            .expect("insert should succeed");
        store.link_post(10, CategoryId(1)).await.expect("link");
        store.link_post(11, CategoryId(1)).await.expect("link");
        store.link_post(11, CategoryId(2)).await.expect("link");

        let summaries = store.category_summaries().await.expect("summaries");
        assert_eq!(summaries[0].post_count, 2);
        assert_eq!(summaries[1].post_count, 1);

        store
            .apply(|nodes| {
                tree::plan_delete(nodes, CategoryId(1), DeletePolicy::PromoteChildren)
                    .map(CategoryChange::Delete)
            })
            .await
            .expect("delete should succeed");
        let summaries = store.category_summaries().await.expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].node.parent_id, None);
        assert_eq!(summaries[0].post_count, 1);
    }

    #[tokio::test]
    async fn seeding_rejects_corrupt_sets() {
        let nodes = vec![CategoryNode {
            id: CategoryId(1),
            name: "Loop".to_string(),
            slug: "loop".to_string(),
            parent_id: Some(CategoryId(1)),
        }];
        let err = MemoryStore::with_nodes(nodes).expect_err("self parent should fail");
        assert_eq!(err.kind, ErrorKind::InternalConsistency);
    }

    #[tokio::test]
    async fn settings_patch_is_persisted() {
        let store = MemoryStore::new();
        let patch = SettingsPatch {
            posts_per_page: Some(20),
            ..SettingsPatch::default()
        };
        let updated = store.update_settings(&patch).await.expect("update");
        assert_eq!(updated.posts_per_page, 20);
        assert_eq!(store.load_settings().await.expect("load").posts_per_page, 20);
    }
}
