use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::audit::AuditSink;
use crate::error::{ErrorKind, LibError, Result};
use crate::models::{AuditRecord, CategoryId, CategoryNode, CategorySummary};
use crate::settings::{SettingsPatch, SiteSettings};
use crate::store::{AppliedChange, CategoryChange, CategoryStore, SettingsStore};
use crate::tree;

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_taxonomy_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    slug: String,
    parent_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct CategorySummaryRow {
    id: i64,
    name: String,
    slug: String,
    parent_id: Option<i64>,
    post_count: i64,
}

#[derive(Debug, Clone, FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

impl From<CategoryRow> for CategoryNode {
    fn from(value: CategoryRow) -> Self {
        Self {
            id: CategoryId(value.id),
            name: value.name,
            slug: value.slug,
            parent_id: value.parent_id.map(CategoryId),
        }
    }
}

impl From<CategorySummaryRow> for CategorySummary {
    fn from(value: CategorySummaryRow) -> Self {
        Self {
            node: CategoryNode {
                id: CategoryId(value.id),
                name: value.name,
                slug: value.slug,
                parent_id: value.parent_id.map(CategoryId),
            },
            post_count: value.post_count,
        }
    }
}

/// Constraint violations keep their mapped kind; everything else becomes a
/// storage error carrying `public`.
fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    let mapped = LibError::from(err);
    if mapped.kind == ErrorKind::Storage {
        LibError::storage(public, mapped.source)
    } else {
        mapped
    }
}

async fn load_categories(tx: &mut Transaction<'_, Postgres>) -> Result<Vec<CategoryNode>> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT id, name, slug, parent_id
        FROM taxonomy.categories
        ORDER BY id ASC
        "#,
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to query categories", err))?;

    Ok(rows.into_iter().map(CategoryNode::from).collect())
}

/// Postgres-backed category and settings store.
///
/// Every mutation runs in a SERIALIZABLE transaction that first takes a
/// table lock excluding other writers, so the snapshot handed to the plan
/// closure cannot go stale before commit.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_write(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|err| db_err("Failed to configure transaction", err))?;

        sqlx::query("LOCK TABLE taxonomy.categories IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|err| db_err("Failed to lock categories", err))?;

        Ok(tx)
    }

    pub async fn link_post(&self, post_id: i64, category_id: CategoryId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO taxonomy.post_categories (post_id, category_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(category_id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to link post", err))?;

        Ok(())
    }
}

async fn write_change(
    tx: &mut Transaction<'_, Postgres>,
    nodes: &[CategoryNode],
    change: CategoryChange,
) -> Result<AppliedChange> {
    match change {
        CategoryChange::Insert(definition) => {
            let row = sqlx::query_as::<_, CategoryRow>(
                r#"
                INSERT INTO taxonomy.categories (name, slug, parent_id)
                VALUES ($1, $2, $3)
                RETURNING id, name, slug, parent_id
                "#,
            )
            .bind(&definition.name)
            .bind(&definition.slug)
            .bind(definition.parent_id.map(|id| id.0))
            .fetch_one(&mut **tx)
            .await
            .map_err(|err| db_err("Failed to create category", err))?;

            Ok(AppliedChange::Inserted(row.into()))
        }
        CategoryChange::Update { id, definition } => {
            let row = sqlx::query_as::<_, CategoryRow>(
                r#"
                UPDATE taxonomy.categories
                SET name = $1,
                    slug = $2,
                    parent_id = $3,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $4
                RETURNING id, name, slug, parent_id
                "#,
            )
            .bind(&definition.name)
            .bind(&definition.slug)
            .bind(definition.parent_id.map(|parent| parent.0))
            .bind(id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|err| db_err("Failed to update category", err))?;

            let Some(row) = row else {
                return Err(LibError::not_found(
                    "Category not found",
                    anyhow!("category {} not found", id),
                ));
            };
            Ok(AppliedChange::Updated(row.into()))
        }
        CategoryChange::Delete(plan) => {
            let Some(target) = nodes.iter().find(|node| node.id == plan.target).cloned() else {
                return Err(LibError::not_found(
                    "Category not found",
                    anyhow!("category {} not found", plan.target),
                ));
            };

            for (child, parent) in &plan.reparented {
                sqlx::query(
                    r#"
                    UPDATE taxonomy.categories
                    SET parent_id = $1,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $2
                    "#,
                )
                .bind(parent.map(|id| id.0))
                .bind(child.0)
                .execute(&mut **tx)
                .await
                .map_err(|err| db_err("Failed to promote child categories", err))?;
            }

            // Deepest first so the RESTRICT parent key never trips.
            for removed in &plan.removed {
                sqlx::query(
                    r#"
                    DELETE FROM taxonomy.categories
                    WHERE id = $1
                    "#,
                )
                .bind(removed.0)
                .execute(&mut **tx)
                .await
                .map_err(|err| db_err("Failed to delete category", err))?;
            }

            Ok(AppliedChange::Deleted { target, plan })
        }
    }
}

impl CategoryStore for PgStore {
    async fn snapshot(&self) -> Result<Vec<CategoryNode>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT id, name, slug, parent_id
            FROM taxonomy.categories
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query categories", err))?;

        Ok(rows.into_iter().map(CategoryNode::from).collect())
    }

    async fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let rows = sqlx::query_as::<_, CategorySummaryRow>(
            r#"
            SELECT
                c.id,
                c.name,
                c.slug,
                c.parent_id,
                COUNT(pc.post_id)::bigint AS post_count
            FROM taxonomy.categories c
            LEFT JOIN taxonomy.post_categories pc
            ON pc.category_id = c.id
            GROUP BY c.id, c.name, c.slug, c.parent_id
            ORDER BY c.name ASC, c.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to list categories", err))?;

        Ok(rows.into_iter().map(CategorySummary::from).collect())
    }

    async fn apply<F>(&self, plan: F) -> Result<AppliedChange>
    where
        F: FnOnce(&[CategoryNode]) -> Result<CategoryChange> + Send,
    {
        let mut tx = self.begin_write().await?;
        let nodes = load_categories(&mut tx).await?;
        let change = plan(&nodes)?;
        let applied = write_change(&mut tx, &nodes, change).await?;

        let written = load_categories(&mut tx).await?;
        tree::ensure_category_invariants(&written)?;

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;

        Ok(applied)
    }
}

impl SettingsStore for PgStore {
    async fn load_settings(&self) -> Result<SiteSettings> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value
            FROM taxonomy.settings
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|err| db_err("Failed to query settings", err))?;

        Ok(SiteSettings::from_rows(
            rows.into_iter().map(|row| (row.key, row.value)),
        ))
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<SiteSettings> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value
            FROM taxonomy.settings
            FOR UPDATE
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to query settings", err))?;

        let mut settings =
            SiteSettings::from_rows(rows.into_iter().map(|row| (row.key, row.value)));
        patch.apply_to(&mut settings);

        for key in patch.changed_keys() {
            sqlx::query(
                r#"
                INSERT INTO taxonomy.settings (key, value)
                VALUES ($1, $2)
                ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(key.as_str())
            .bind(settings.value_of(key))
            .execute(&mut *tx)
            .await
            .map_err(|err| db_err("Failed to update settings", err))?;
        }

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;

        Ok(settings)
    }
}

/// Writes audit records to `taxonomy.activity_logs`.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO taxonomy.activity_logs (
                user_id,
                action,
                entity_type,
                entity_id,
                details,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.actor_id.0)
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(record.entity_id)
        .bind(&record.details)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| db_err("Failed to write audit record", err))?;

        Ok(())
    }
}
