use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::GatewayConfig;
use crate::error::{LibError, Result};
use crate::roles::Role;
use crate::slug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CategoryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for CategoryId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The caller of one request, as resolved by an identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
}

impl Identity {
    pub const fn new(id: i64, role: Role) -> Self {
        Self {
            id: UserId(id),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
}

/// A node with its children attached. Produced by
/// [`crate::tree::build_forest`]; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CategoryId>,
    pub children: Vec<CategoryTreeNode>,
}

/// A node with its derived post count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(flatten)]
    pub node: CategoryNode,
    pub post_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Children are re-linked to the deleted node's parent.
    #[default]
    PromoteChildren,
    /// The whole subtree is removed.
    Cascade,
}

impl DeletePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeletePolicy::PromoteChildren => "promote",
            DeletePolicy::Cascade => "cascade",
        }
    }

    pub fn from_config_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "promote" | "promote_children" => Some(DeletePolicy::PromoteChildren),
            "cascade" => Some(DeletePolicy::Cascade),
            _ => None,
        }
    }
}

/// Structural effect of one delete, computed before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePlan {
    pub target: CategoryId,
    pub policy: DeletePolicy,
    /// Removed ids, deepest first so no removal leaves a dangling parent.
    pub removed: Vec<CategoryId>,
    pub reparented: Vec<(CategoryId, Option<CategoryId>)>,
}

/// One broken invariant found by a full-set audit of the node set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CategoryInvariantViolation {
    DuplicateId {
        node_id: CategoryId,
    },
    DuplicateSlug {
        slug: String,
        node_ids: Vec<CategoryId>,
    },
    DanglingParent {
        node_id: CategoryId,
        parent_id: CategoryId,
    },
    SelfParent {
        node_id: CategoryId,
    },
    Cycle {
        node_ids: Vec<CategoryId>,
    },
}

impl CategoryInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            CategoryInvariantViolation::DuplicateId { .. } => "category_duplicate_id",
            CategoryInvariantViolation::DuplicateSlug { .. } => "duplicate_slug",
            CategoryInvariantViolation::DanglingParent { .. } => "category_dangling_parent",
            CategoryInvariantViolation::SelfParent { .. } => "category_self_parent",
            CategoryInvariantViolation::Cycle { .. } => "category_cycle",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            CategoryInvariantViolation::DuplicateId { .. } => "Category ids must be unique",
            CategoryInvariantViolation::DuplicateSlug { .. } => {
                "A category with this slug already exists"
            }
            CategoryInvariantViolation::DanglingParent { .. } => {
                "Category parent does not exist"
            }
            CategoryInvariantViolation::SelfParent { .. } => "Cannot be own parent",
            CategoryInvariantViolation::Cycle { .. } => "Category hierarchy must be acyclic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub actor_id: UserId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub details: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCategoryPayload {
    /// Missing or `null` reads as empty so normalisation reports it.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCategoryPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeleteCategoryPayload {
    #[serde(default)]
    pub policy: Option<DeletePolicy>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Normalised create/update input: trimmed name, final slug, parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
}

impl CreateCategoryPayload {
    pub fn normalize(self, config: &GatewayConfig) -> Result<CategoryDefinition> {
        normalize_category_definition(self.name, self.slug, self.parent_id, config)
    }
}

impl UpdateCategoryPayload {
    pub fn normalize(self, config: &GatewayConfig) -> Result<CategoryDefinition> {
        normalize_category_definition(self.name, self.slug, self.parent_id, config)
    }
}

impl CategoryDefinition {
    pub fn into_node(self, id: CategoryId) -> CategoryNode {
        CategoryNode {
            id,
            name: self.name,
            slug: self.slug,
            parent_id: self.parent_id,
        }
    }
}

fn normalize_category_definition(
    name: String,
    explicit_slug: Option<String>,
    parent_id: Option<CategoryId>,
    config: &GatewayConfig,
) -> Result<CategoryDefinition> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(LibError::invalid_with_code(
            "category_name_required",
            "Name is required",
            anyhow!("empty category name"),
        ));
    }
    if name.chars().count() > config.max_name_len {
        return Err(LibError::invalid_with_code(
            "category_name_too_long",
            "Name is too long",
            anyhow!(
                "category name has {} characters, limit is {}",
                name.chars().count(),
                config.max_name_len
            ),
        ));
    }

    // An empty explicit slug falls back to the name.
    let slug = match explicit_slug.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => slug::slugify(raw),
        _ => slug::slugify(&name),
    };
    if slug.is_empty() {
        return Err(LibError::invalid_with_code(
            "category_slug_empty",
            "Slug must contain at least one letter or digit",
            anyhow!("slug derived from '{}' is empty", name),
        ));
    }
    if slug.len() > config.max_slug_len {
        return Err(LibError::invalid_with_code(
            "category_slug_too_long",
            "Slug is too long",
            anyhow!(
                "slug '{}' exceeds limit of {}",
                slug,
                config.max_slug_len
            ),
        ));
    }

    Ok(CategoryDefinition {
        name,
        slug,
        parent_id,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn config() -> GatewayConfig {
        GatewayConfig::default()
    }

    #[test]
    fn derives_slug_when_missing() {
        let payload = CreateCategoryPayload {
            name: "  Tech News ".to_string(),
            slug: None,
            parent_id: None,
        };
        let definition = payload.normalize(&config()).expect("payload should normalize");
        assert_eq!(definition.name, "Tech News");
        assert_eq!(definition.slug, "tech-news");
        assert_eq!(definition.parent_id, None);
    }

    #[test]
    fn blank_slug_falls_back_to_name() {
        let payload = CreateCategoryPayload {
            name: "Rust".to_string(),
            slug: Some("   ".to_string()),
            parent_id: None,
        };
        let definition = payload.normalize(&config()).expect("payload should normalize");
        assert_eq!(definition.slug, "rust");
    }

    #[test]
    fn explicit_slug_is_normalized() {
        let payload = UpdateCategoryPayload {
            name: "Anything".to_string(),
            slug: Some("My Custom_Slug".to_string()),
            parent_id: Some(CategoryId(4)),
        };
        let definition = payload.normalize(&config()).expect("payload should normalize");
        assert_eq!(definition.slug, "my-custom-slug");
        assert_eq!(definition.parent_id, Some(CategoryId(4)));
    }

    #[test]
    fn rejects_missing_name() {
        let payload = CreateCategoryPayload {
            name: "   ".to_string(),
            slug: Some("fine".to_string()),
            parent_id: None,
        };
        let err = payload.normalize(&config()).expect_err("empty name should fail");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.public, "Name is required");
    }

    #[test]
    fn rejects_name_without_slug_characters() {
        let payload = CreateCategoryPayload {
            name: "!!!".to_string(),
            slug: None,
            parent_id: None,
        };
        let err = payload.normalize(&config()).expect_err("empty slug should fail");
        assert_eq!(err.code, "category_slug_empty");
    }

    #[test]
    fn rejects_overlong_name() {
        let config = GatewayConfig {
            max_name_len: 4,
            ..GatewayConfig::default()
        };
        let payload = CreateCategoryPayload {
            name: "Too long".to_string(),
            slug: None,
            parent_id: None,
        };
        let err = payload.normalize(&config).expect_err("long name should fail");
        assert_eq!(err.code, "category_name_too_long");
    }

    #[test]
    fn payload_accepts_null_parent() {
        let payload: CreateCategoryPayload =
            serde_json::from_value(json!({"name": "News", "parentId": null}))
                .expect("payload should deserialize");
        assert_eq!(payload.parent_id, None);

        let payload: CreateCategoryPayload =
            serde_json::from_value(json!({"name": "News", "parentId": 7}))
                .expect("payload should deserialize");
        assert_eq!(payload.parent_id, Some(CategoryId(7)));
    }

    #[test]
    fn missing_or_null_name_reaches_name_validation() {
        for body in [json!({}), json!({"name": null}), json!({"parentId": 3})] {
            let payload: CreateCategoryPayload =
                serde_json::from_value(body).expect("payload should deserialize");
            let err = payload.normalize(&config()).expect_err("blank name should fail");
            assert_eq!(err.code, "category_name_required");
        }

        let payload: UpdateCategoryPayload =
            serde_json::from_value(json!({"name": null})).expect("payload should deserialize");
        let err = payload.normalize(&config()).expect_err("blank name should fail");
        assert_eq!(err.code, "category_name_required");
    }

    #[test]
    fn payloads_reject_unknown_fields() {
        let err = serde_json::from_value::<CreateCategoryPayload>(
            json!({"name": "News", "parent_id": 4}),
        )
        .expect_err("snake_case parent should be rejected");
        assert!(err.to_string().contains("unknown field"));

        assert!(
            serde_json::from_value::<UpdateCategoryPayload>(json!({"name": "News", "colour": "red"}))
                .is_err()
        );
        assert!(
            serde_json::from_value::<DeleteCategoryPayload>(json!({"mode": "cascade"})).is_err()
        );
    }

    #[test]
    fn tree_node_omits_absent_parent() {
        let node = CategoryTreeNode {
            id: CategoryId(1),
            name: "Root".to_string(),
            slug: "root".to_string(),
            parent_id: None,
            children: vec![],
        };
        let value = serde_json::to_value(node).expect("serialize tree node");
        assert_eq!(
            value,
            json!({"id": 1, "name": "Root", "slug": "root", "children": []})
        );
    }

    #[test]
    fn delete_policy_reads_config_values() {
        assert_eq!(
            DeletePolicy::from_config_value("Cascade"),
            Some(DeletePolicy::Cascade)
        );
        assert_eq!(
            DeletePolicy::from_config_value("promote"),
            Some(DeletePolicy::PromoteChildren)
        );
        assert_eq!(DeletePolicy::from_config_value("orphan"), None);
    }
}
