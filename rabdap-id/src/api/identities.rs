//! Identity lookup and refresh endpoints
//!
//! `id_type` path segments and `key_field` / `field` body members name a
//! logical identity field (`bruid`, `shortid`, `uuid`, `name`, `email`);
//! anything else is rejected with 400.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rabdap_common::{CacheEntry, IdField, LookupView};
use serde::Deserialize;
use tracing::info;

use crate::db::SelectionFilter;
use crate::error::{ApiError, ApiResult};
use crate::sync::RefreshReport;
use crate::AppState;

/// Selection of entries to refresh, as sent by clients
///
/// One of `{"updated_before": ts}`, `{"field": f, "equals": v}`,
/// `{"field": f, "in": [..]}` or `{"all": true}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    UpdatedBefore {
        updated_before: DateTime<Utc>,
    },
    Equals {
        field: String,
        equals: String,
    },
    In {
        field: String,
        #[serde(rename = "in")]
        values: Vec<String>,
    },
    All {
        all: bool,
    },
}

impl FilterSpec {
    pub fn into_selection(self) -> ApiResult<SelectionFilter> {
        Ok(match self {
            FilterSpec::UpdatedBefore { updated_before } => {
                SelectionFilter::UpdatedBefore(updated_before)
            }
            FilterSpec::Equals { field, equals } => SelectionFilter::Equals {
                field: field.parse()?,
                value: equals,
            },
            FilterSpec::In { field, values } => SelectionFilter::In {
                field: field.parse()?,
                values,
            },
            FilterSpec::All { all: true } => SelectionFilter::All,
            FilterSpec::All { all: false } => {
                return Err(ApiError::BadRequest(
                    "\"all\" filter must be true".to_string(),
                ))
            }
        })
    }
}

fn default_key_field() -> String {
    IdField::Bruid.as_str().to_string()
}

/// POST /regenerate request body
#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateRequest {
    #[serde(default = "default_key_field")]
    pub key_field: String,
    pub filter: FilterSpec,
}

/// GET /get/:id_type/:id_val
///
/// Cached projection, 404 when the cache has no match. Never queries the
/// directory.
pub async fn get_identity(
    State(state): State<AppState>,
    Path((id_type, id_val)): Path<(String, String)>,
) -> ApiResult<Json<LookupView>> {
    let field: IdField = id_type.parse()?;

    let entry = state
        .pipeline
        .lookup(field, &id_val)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{}={}", field, id_val)))?;

    Ok(Json(entry.lookup_view()))
}

/// GET /getorcreate/:id_type/:id_val
///
/// Cached projection, resolving a cache miss against the directory.
pub async fn get_or_create_identity(
    State(state): State<AppState>,
    Path((id_type, id_val)): Path<(String, String)>,
) -> ApiResult<Json<LookupView>> {
    let field: IdField = id_type.parse()?;
    let view = state.pipeline.get_or_create(field, &id_val).await?;
    Ok(Json(view))
}

/// GET /entry/:id_type/:id_val
///
/// Full cached entry including field history.
pub async fn get_entry(
    State(state): State<AppState>,
    Path((id_type, id_val)): Path<(String, String)>,
) -> ApiResult<Json<CacheEntry>> {
    let field: IdField = id_type.parse()?;

    let entry = state
        .pipeline
        .lookup(field, &id_val)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{}={}", field, id_val)))?;

    Ok(Json(entry))
}

/// POST /regenerate
pub async fn regenerate(
    State(state): State<AppState>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<RefreshReport>> {
    let key_field: IdField = request.key_field.parse()?;
    let filter = request.filter.into_selection()?;

    info!(key_field = %key_field, filter = ?filter, "Refresh requested");

    let report = state.pipeline.regenerate(&filter, key_field).await?;
    Ok(Json(report))
}

/// Build identity routes
pub fn identity_routes() -> Router<AppState> {
    Router::new()
        .route("/get/:id_type/:id_val", get(get_identity))
        .route("/getorcreate/:id_type/:id_val", get(get_or_create_identity))
        .route("/entry/:id_type/:id_val", get(get_entry))
        .route("/regenerate", post(regenerate))
}
