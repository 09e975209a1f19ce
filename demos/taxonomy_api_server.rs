use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use subseq_taxonomy::api::{AuthenticatedIdentity, TaxonomyApp};
use subseq_taxonomy::audit::{AuditSink, TracingAuditSink};
use subseq_taxonomy::config::GatewayConfig;
use subseq_taxonomy::db::{PgAuditSink, PgStore, create_taxonomy_tables};
use subseq_taxonomy::gateway::MutationGateway;
use subseq_taxonomy::identity::StaticIdentityProvider;
use subseq_taxonomy::permissions::permitted_actions;
use subseq_taxonomy::store::{CategoryStore, MemoryStore, SettingsStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_DEV_TOKENS: &str = "owner-dev:1:owner,admin-dev:2:administrator,editor-dev:3:contributor,viewer-dev:4:viewer";

struct DemoApp<S, A> {
    gateway: MutationGateway<S, A>,
    identities: Arc<StaticIdentityProvider>,
}

impl<S, A> Clone for DemoApp<S, A> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            identities: Arc::clone(&self.identities),
        }
    }
}

impl<S, A> TaxonomyApp for DemoApp<S, A>
where
    S: CategoryStore + SettingsStore + 'static,
    A: AuditSink + 'static,
{
    type Store = S;
    type Audit = A;
    type Identities = StaticIdentityProvider;

    fn gateway(&self) -> &MutationGateway<S, A> {
        &self.gateway
    }

    fn identities(&self) -> &StaticIdentityProvider {
        &self.identities
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = env::var("TAXONOMY_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid TAXONOMY_BIND '{}'", bind))?;

    let tokens = env::var("TAXONOMY_DEV_TOKENS").unwrap_or_else(|_| DEFAULT_DEV_TOKENS.to_string());
    let identities = Arc::new(
        StaticIdentityProvider::parse(&tokens).context("invalid TAXONOMY_DEV_TOKENS")?,
    );
    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;

    let memory_mode = env::args().any(|arg| arg == "--memory");
    let database_url = env::var("DATABASE_URL").ok();

    match database_url {
        Some(database_url) if !memory_mode => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await
                .context("failed to connect to postgres")?;
            create_taxonomy_tables(&pool)
                .await
                .context("failed to run taxonomy migrations")?;

            let app = DemoApp {
                gateway: MutationGateway::new(
                    Arc::new(PgStore::new(pool.clone())),
                    Arc::new(PgAuditSink::new(pool)),
                    config,
                ),
                identities,
            };
            serve(app, bind_addr, "postgres").await
        }
        _ => {
            let app = DemoApp {
                gateway: MutationGateway::new(
                    Arc::new(MemoryStore::new()),
                    Arc::new(TracingAuditSink),
                    config,
                ),
                identities,
            };
            serve(app, bind_addr, "memory").await
        }
    }
}

async fn serve<S, A>(app_state: DemoApp<S, A>, bind_addr: SocketAddr, backend: &str) -> anyhow::Result<()>
where
    S: CategoryStore + SettingsStore + 'static,
    A: AuditSink + 'static,
{
    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .route("/demo/whoami", get(whoami_handler))
        .merge(subseq_taxonomy::api::routes::<DemoApp<S, A>>());

    let app = Router::new().nest("/api/v1", api_v1).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!(%bind_addr, backend, "subseq_taxonomy demo server listening");
    println!("subseq_taxonomy demo server listening on http://{}", bind_addr);
    println!("api base path: /api/v1 ({} store)", backend);
    println!("auth: Authorization: Bearer <token> from TAXONOMY_DEV_TOKENS");

    axum::serve(listener, app)
        .await
        .context("demo server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

async fn whoami_handler(
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
) -> Json<serde_json::Value> {
    Json(json!({
        "userId": identity.id,
        "role": identity.role,
        "actions": permitted_actions(identity.role),
    }))
}
