use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{
        FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde_json::json;

use crate::audit::AuditSink;
use crate::error::{ErrorKind, LibError};
use crate::gateway::{MutationGateway, authorize};
use crate::identity::IdentityProvider;
use crate::models::{
    CategoryId, CreateCategoryPayload, DeleteCategoryPayload, Identity, UpdateCategoryPayload,
};
use crate::permissions::Action;
use crate::settings::SettingsPatch;
use crate::store::{CategoryStore, SettingsStore};

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Cycle => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateSlug => StatusCode::CONFLICT,
        ErrorKind::InternalConsistency => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);

        tracing::error!(
            kind = ?self.0.kind,
            code = self.0.code,
            error = %self.0.source,
            "taxonomy api request failed"
        );

        let mut error = json!({
            "code": self.0.code,
            "message": self.0.public,
        });
        if let Some(details) = &self.0.details {
            error["details"] = json!(details);
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Application state the taxonomy routes run against.
pub trait TaxonomyApp: Clone + Send + Sync + 'static {
    type Store: CategoryStore + SettingsStore + 'static;
    type Audit: AuditSink + 'static;
    type Identities: IdentityProvider + 'static;

    fn gateway(&self) -> &MutationGateway<Self::Store, Self::Audit>;

    fn identities(&self) -> &Self::Identities;
}

/// Caller identity resolved from `Authorization: Bearer <credential>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedIdentity(pub Identity);

fn bearer_credential(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credential) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credential = credential.trim();
    (!credential.is_empty()).then_some(credential)
}

impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: TaxonomyApp,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(credential) = bearer_credential(parts) else {
            return Err(AppError(LibError::unauthorized(
                "Authentication required",
                anyhow!("missing bearer credential"),
            )));
        };
        let Some(identity) = state.identities().resolve(credential) else {
            return Err(AppError(LibError::unauthorized(
                "Invalid credentials",
                anyhow!("bearer credential did not resolve to an identity"),
            )));
        };
        Ok(Self(identity))
    }
}

// Request parts are taken as `Result` so the role check runs before any
// body, path or query rejection is reported.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        AppError(LibError::invalid_with_code(
            "invalid_body",
            "Request body is invalid",
            anyhow!("{}", rejection.body_text()),
        ))
    })
}

fn category_path(path: Result<Path<CategoryId>, PathRejection>) -> Result<CategoryId, AppError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        AppError(LibError::invalid_with_code(
            "invalid_path",
            "Category id must be an integer",
            anyhow!("{}", rejection.body_text()),
        ))
    })
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query.map(|Query(value)| value).map_err(|rejection| {
        AppError(LibError::invalid_with_code(
            "invalid_query",
            "Query parameters are invalid",
            anyhow!("{}", rejection.body_text()),
        ))
    })
}

async fn list_categories_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    let categories = app.gateway().category_summaries(&identity).await?;
    Ok(Json(categories))
}

async fn category_tree_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    let forest = app.gateway().category_forest(&identity).await?;
    Ok(Json(forest))
}

async fn create_category_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    payload: Result<Json<CreateCategoryPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    authorize(&identity, Action::CreateCategory)?;
    let payload = json_body(payload)?;
    let category = app.gateway().create_category(&identity, payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    category_id: Result<Path<CategoryId>, PathRejection>,
    payload: Result<Json<UpdateCategoryPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    authorize(&identity, Action::UpdateCategory)?;
    let category_id = category_path(category_id)?;
    let payload = json_body(payload)?;
    let category = app
        .gateway()
        .update_category(&identity, category_id, payload)
        .await?;
    Ok(Json(category))
}

async fn delete_category_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    category_id: Result<Path<CategoryId>, PathRejection>,
    payload: Result<Query<DeleteCategoryPayload>, QueryRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    authorize(&identity, Action::DeleteCategory)?;
    let category_id = category_path(category_id)?;
    let payload = query_params(payload)?;
    let plan = app
        .gateway()
        .delete_category(&identity, category_id, payload)
        .await?;
    Ok(Json(plan))
}

async fn read_settings_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    let settings = app.gateway().read_settings(&identity).await?;
    Ok(Json(settings))
}

async fn update_settings_handler<S>(
    State(app): State<S>,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    patch: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError>
where
    S: TaxonomyApp,
{
    authorize(&identity, Action::UpdateSettings)?;
    let patch = json_body(patch)?;
    let settings = app.gateway().update_settings(&identity, patch).await?;
    Ok(Json(settings))
}

pub fn routes<S>() -> Router<S>
where
    S: TaxonomyApp,
{
    tracing::info!("Registering route /admin/categories [GET,POST]");
    tracing::info!("Registering route /admin/categories/tree [GET]");
    tracing::info!("Registering route /admin/categories/{{id}} [PUT,DELETE]");
    tracing::info!("Registering route /admin/settings [GET,PUT]");

    Router::new()
        .route(
            "/admin/categories",
            get(list_categories_handler::<S>).post(create_category_handler::<S>),
        )
        .route("/admin/categories/tree", get(category_tree_handler::<S>))
        .route(
            "/admin/categories/{id}",
            put(update_category_handler::<S>).delete(delete_category_handler::<S>),
        )
        .route(
            "/admin/settings",
            get(read_settings_handler::<S>).put(update_settings_handler::<S>),
        )
}
