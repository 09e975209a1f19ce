#[cfg(feature = "api")]
pub mod api;
pub mod audit;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod permissions;
pub mod roles;
pub mod settings;
pub mod slug;
pub mod store;
pub mod tree;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, AuthenticatedIdentity, TaxonomyApp};
    pub use crate::audit::{AuditSink, MemoryAuditSink, TracingAuditSink};
    pub use crate::config::GatewayConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgAuditSink, PgStore, create_taxonomy_tables};
    pub use crate::error::{ErrorDetails, ErrorKind, LibError, Result};
    pub use crate::gateway::{MutationGateway, TaxonomyOperation, TaxonomyOperationResult};
    pub use crate::identity::{IdentityProvider, StaticIdentityProvider};
    pub use crate::models::{
        AuditRecord, CategoryId, CategoryNode, CategorySummary, CategoryTreeNode,
        CreateCategoryPayload, DeleteCategoryPayload, DeletePlan, DeletePolicy, Identity,
        UpdateCategoryPayload, UserId,
    };
    pub use crate::permissions::Action;
    pub use crate::roles::{Role, satisfies};
    pub use crate::settings::{SettingKey, SettingsPatch, SiteSettings};
    pub use crate::slug::slugify;
    pub use crate::store::{CategoryStore, MemoryStore, SettingsStore};
    pub use crate::tree::{CategoryIndex, build_forest, validate_parent};
}
