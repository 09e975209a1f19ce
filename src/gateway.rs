use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::AuditSink;
use crate::config::GatewayConfig;
use crate::error::{ErrorKind, LibError, Result};
use crate::models::{
    AuditRecord, CategoryId, CategoryNode, CategorySummary, CategoryTreeNode,
    CreateCategoryPayload, DeleteCategoryPayload, DeletePlan, DeletePolicy, Identity,
    UpdateCategoryPayload,
};
use crate::permissions::{Action, CATEGORY_ENTITY_TYPE, SYSTEM_ENTITY_TYPE};
use crate::settings::{SettingsPatch, SiteSettings};
use crate::store::{AppliedChange, CategoryChange, CategoryStore, SettingsStore};
use crate::tree;

/// Serializable envelope for one gated operation.
///
/// Callers must provide a trusted `identity` resolved from validated
/// credentials, not from request arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TaxonomyOperation {
    ListCategories,
    CategoryTree,
    CreateCategory {
        payload: CreateCategoryPayload,
    },
    UpdateCategory {
        id: CategoryId,
        payload: UpdateCategoryPayload,
    },
    DeleteCategory {
        id: CategoryId,
        #[serde(default)]
        payload: DeleteCategoryPayload,
    },
    ReadSettings,
    UpdateSettings {
        payload: SettingsPatch,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TaxonomyOperationResult {
    Categories { items: Vec<CategoryNode> },
    Forest { roots: Vec<CategoryTreeNode> },
    Category { category: CategoryNode },
    Deleted { plan: DeletePlan },
    Settings { settings: SiteSettings },
}

/// Single entry point for gated operations: authorize, validate against a
/// fresh snapshot, persist, audit.
pub struct MutationGateway<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    config: GatewayConfig,
}

impl<S, A> Clone for MutationGateway<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            audit: Arc::clone(&self.audit),
            config: self.config.clone(),
        }
    }
}

/// Fails with `Unauthorized` unless `identity` satisfies the action's
/// minimum role.
pub fn authorize(identity: &Identity, action: Action) -> Result<()> {
    let required = action.required_role();
    if identity.role.satisfies(required) {
        return Ok(());
    }

    tracing::warn!(
        actor_id = identity.id.0,
        role = %identity.role,
        required = %required,
        action = action.audit_name(),
        "authorization denied"
    );
    Err(LibError::missing_role(required, Some(identity.role)))
}

impl<S, A> MutationGateway<S, A>
where
    S: CategoryStore,
    A: AuditSink,
{
    pub fn new(store: Arc<S>, audit: Arc<A>, config: GatewayConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn audit(&self) -> Arc<A> {
        Arc::clone(&self.audit)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn list_categories(&self, identity: &Identity) -> Result<Vec<CategoryNode>> {
        authorize(identity, Action::ListCategories)?;
        self.store.snapshot().await
    }

    pub async fn category_forest(&self, identity: &Identity) -> Result<Vec<CategoryTreeNode>> {
        authorize(identity, Action::ListCategories)?;
        let nodes = self.store.snapshot().await?;
        Ok(tree::build_forest_sorted(&nodes))
    }

    pub async fn category_summaries(&self, identity: &Identity) -> Result<Vec<CategorySummary>> {
        authorize(identity, Action::ListCategories)?;
        self.store.category_summaries().await
    }

    pub async fn create_category(
        &self,
        identity: &Identity,
        payload: CreateCategoryPayload,
    ) -> Result<CategoryNode> {
        authorize(identity, Action::CreateCategory)?;
        let definition = payload.normalize(&self.config)?;

        let applied = self
            .store
            .apply(move |nodes| {
                tree::check_create(nodes, &definition)?;
                Ok(CategoryChange::Insert(definition))
            })
            .await
            .map_err(|err| alert_on_corruption(err, Action::CreateCategory))?;

        let AppliedChange::Inserted(node) = applied else {
            return Err(unexpected_change(Action::CreateCategory));
        };
        self.record(
            identity,
            Action::CreateCategory,
            CATEGORY_ENTITY_TYPE,
            node.id.0,
            format!("Created category: {}", node.name),
        )
        .await;
        tracing::debug!(actor_id = identity.id.0, category_id = node.id.0, slug = %node.slug, "category created");
        Ok(node)
    }

    pub async fn update_category(
        &self,
        identity: &Identity,
        id: CategoryId,
        payload: UpdateCategoryPayload,
    ) -> Result<CategoryNode> {
        authorize(identity, Action::UpdateCategory)?;
        let definition = payload.normalize(&self.config)?;

        let applied = self
            .store
            .apply(move |nodes| {
                tree::check_update(nodes, id, &definition)?;
                Ok(CategoryChange::Update { id, definition })
            })
            .await
            .map_err(|err| alert_on_corruption(err, Action::UpdateCategory))?;

        let AppliedChange::Updated(node) = applied else {
            return Err(unexpected_change(Action::UpdateCategory));
        };
        let parent = node
            .parent_id
            .map_or_else(|| "root".to_string(), |parent_id| parent_id.to_string());
        self.record(
            identity,
            Action::UpdateCategory,
            CATEGORY_ENTITY_TYPE,
            node.id.0,
            format!("Updated category: {} (parent: {})", node.name, parent),
        )
        .await;
        tracing::debug!(actor_id = identity.id.0, category_id = node.id.0, "category updated");
        Ok(node)
    }

    pub async fn delete_category(
        &self,
        identity: &Identity,
        id: CategoryId,
        payload: DeleteCategoryPayload,
    ) -> Result<DeletePlan> {
        authorize(identity, Action::DeleteCategory)?;
        let policy = payload.policy.unwrap_or(self.config.delete_policy);

        let applied = self
            .store
            .apply(move |nodes| tree::plan_delete(nodes, id, policy).map(CategoryChange::Delete))
            .await
            .map_err(|err| alert_on_corruption(err, Action::DeleteCategory))?;

        let AppliedChange::Deleted { target, plan } = applied else {
            return Err(unexpected_change(Action::DeleteCategory));
        };
        let details = match plan.policy {
            DeletePolicy::PromoteChildren => format!(
                "Deleted category: {} ({} children promoted)",
                target.name,
                plan.reparented.len()
            ),
            DeletePolicy::Cascade => format!(
                "Deleted category: {} ({} categories removed)",
                target.name,
                plan.removed.len()
            ),
        };
        self.record(
            identity,
            Action::DeleteCategory,
            CATEGORY_ENTITY_TYPE,
            target.id.0,
            details,
        )
        .await;
        tracing::debug!(
            actor_id = identity.id.0,
            category_id = target.id.0,
            policy = plan.policy.as_str(),
            "category deleted"
        );
        Ok(plan)
    }

    /// Audit appends are advisory; failures are logged and swallowed.
    async fn record(
        &self,
        identity: &Identity,
        action: Action,
        entity_type: &str,
        entity_id: i64,
        details: String,
    ) {
        let record = AuditRecord::new(
            identity.id,
            action.audit_name(),
            entity_type,
            entity_id,
            details,
        );
        if let Err(err) = self.audit.append(record).await {
            tracing::warn!(
                actor_id = identity.id.0,
                action = action.audit_name(),
                entity_id,
                error = %err.source,
                "audit append failed"
            );
        }
    }
}

impl<S, A> MutationGateway<S, A>
where
    S: CategoryStore + SettingsStore,
    A: AuditSink,
{
    pub async fn read_settings(&self, identity: &Identity) -> Result<SiteSettings> {
        authorize(identity, Action::ReadSettings)?;
        self.store.load_settings().await
    }

    pub async fn update_settings(
        &self,
        identity: &Identity,
        patch: SettingsPatch,
    ) -> Result<SiteSettings> {
        authorize(identity, Action::UpdateSettings)?;
        patch.validate()?;
        if patch.is_empty() {
            return self.store.load_settings().await;
        }

        let settings = self.store.update_settings(&patch).await?;
        let keys = patch
            .changed_keys()
            .iter()
            .map(|key| key.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.record(
            identity,
            Action::UpdateSettings,
            SYSTEM_ENTITY_TYPE,
            0,
            format!("Updated system settings: {}", keys),
        )
        .await;
        Ok(settings)
    }

    pub async fn execute(
        &self,
        identity: &Identity,
        operation: TaxonomyOperation,
    ) -> Result<TaxonomyOperationResult> {
        match operation {
            TaxonomyOperation::ListCategories => {
                let items = self.list_categories(identity).await?;
                Ok(TaxonomyOperationResult::Categories { items })
            }
            TaxonomyOperation::CategoryTree => {
                let roots = self.category_forest(identity).await?;
                Ok(TaxonomyOperationResult::Forest { roots })
            }
            TaxonomyOperation::CreateCategory { payload } => {
                let category = self.create_category(identity, payload).await?;
                Ok(TaxonomyOperationResult::Category { category })
            }
            TaxonomyOperation::UpdateCategory { id, payload } => {
                let category = self.update_category(identity, id, payload).await?;
                Ok(TaxonomyOperationResult::Category { category })
            }
            TaxonomyOperation::DeleteCategory { id, payload } => {
                let plan = self.delete_category(identity, id, payload).await?;
                Ok(TaxonomyOperationResult::Deleted { plan })
            }
            TaxonomyOperation::ReadSettings => {
                let settings = self.read_settings(identity).await?;
                Ok(TaxonomyOperationResult::Settings { settings })
            }
            TaxonomyOperation::UpdateSettings { payload } => {
                let settings = self.update_settings(identity, payload).await?;
                Ok(TaxonomyOperationResult::Settings { settings })
            }
        }
    }
}

fn alert_on_corruption(err: LibError, action: Action) -> LibError {
    if err.kind == ErrorKind::InternalConsistency {
        tracing::error!(
            action = action.audit_name(),
            error = %err.source,
            "category hierarchy failed consistency check"
        );
    }
    err
}

fn unexpected_change(action: Action) -> LibError {
    LibError::unknown(
        "Store applied an unexpected change",
        anyhow::anyhow!("store returned mismatched change for {}", action.audit_name()),
    )
}
