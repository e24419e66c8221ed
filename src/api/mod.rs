// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! HTTP surface over the diagram store.
//!
//! Identity arrives pre-authenticated in headers (`x-user-id`, `x-permissions`,
//! `x-owner`); this layer only enforces the classification filter and ownership
//! rules, it performs no authentication of its own.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};

use crate::access::{self, PermissionLevel, UserPermissions};
use crate::model::{ClassificationId, DiagramId, ElementId, UserId};
use crate::store::{DiagramStore, StoreError};

pub mod types;

use types::{
    AffectedResponse, CleanupResponse, CreateDiagramRequest, CreateDiagramResponse,
    DiagramJson, DropResponse, ElementJson, ErrorBody, FullLoadResponse,
    PatchElementRequest, UpsertElementRequest, UpsertElementResponse,
};

const USER_ID_HEADER: &str = "x-user-id";
const PERMISSIONS_HEADER: &str = "x-permissions";
const OWNER_HEADER: &str = "x-owner";

#[derive(Clone)]
pub struct AppState {
    store: Arc<DiagramStore>,
}

impl AppState {
    pub fn new(store: Arc<DiagramStore>) -> Self {
        Self { store }
    }

    /// Store failures mapped to wire errors. `RelationMissing` triggers the repair
    /// path here: the stale registry row is deleted so the next listing is
    /// consistent, and the client is told to retry rather than being handed a
    /// silently recreated empty diagram.
    fn store_err(&self, err: StoreError) -> ApiError {
        match err {
            StoreError::DiagramNotFound { diagram_id } => {
                ApiError::NotFound(format!("diagram not found: {diagram_id}"))
            }
            StoreError::RelationMissing { diagram_id } => {
                tracing::warn!(diagram_id = %diagram_id, "element storage vanished; removing registry entry");
                if let Err(repair_err) = self.store.delete_registry_row(&diagram_id) {
                    tracing::error!(diagram_id = %diagram_id, error = %repair_err, "repair failed");
                }
                ApiError::Unavailable(format!(
                    "storage for diagram {diagram_id} is gone; its entry was removed, please retry"
                ))
            }
            StoreError::Unavailable { source } => {
                tracing::warn!(error = %source, "storage unavailable");
                ApiError::Unavailable("storage temporarily unavailable".to_owned())
            }
            StoreError::RelationRetired { relation_name } => ApiError::Conflict(format!(
                "relation name {relation_name} was retired when its diagram was dropped"
            )),
            StoreError::RelationNameConflict { relation_name } => ApiError::Conflict(
                format!("relation name {relation_name} is already in use"),
            ),
            other => {
                tracing::error!(error = %other, "storage failure");
                ApiError::Internal
            }
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(&'static str),
    NotFound(String),
    /// The requested diagram id derives a relation name that is taken or retired.
    Conflict(String),
    /// Retryable; rendered with `retry: true` and a `Retry-After` hint.
    Unavailable(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry, error) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, false, message),
            Self::Forbidden(message) => {
                (StatusCode::FORBIDDEN, false, message.to_owned())
            }
            Self::NotFound(message) => (StatusCode::NOT_FOUND, false, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, false, message),
            Self::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, true, message)
            }
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "internal error".to_owned(),
            ),
        };

        let body = Json(ErrorBody { error, retry });
        if retry {
            (status, [("retry-after", "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Caller identity, as asserted by the fronting auth layer.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<UserId>,
    pub permissions: UserPermissions,
    pub is_owner: bool,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| -> Result<Option<&str>, ApiError> {
            match parts.headers.get(name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(Some)
                    .map_err(|_| ApiError::BadRequest(format!("{name} is not valid UTF-8"))),
            }
        };

        let user_id = header_str(USER_ID_HEADER)?
            .map(|value| {
                UserId::new(value).map_err(|err| {
                    ApiError::BadRequest(format!("invalid {USER_ID_HEADER}: {err}"))
                })
            })
            .transpose()?;

        let permissions = match header_str(PERMISSIONS_HEADER)? {
            None => UserPermissions::default(),
            Some(raw) => {
                let grants: HashMap<String, PermissionLevel> = serde_json::from_str(raw)
                    .map_err(|err| {
                        ApiError::BadRequest(format!("invalid {PERMISSIONS_HEADER}: {err}"))
                    })?;
                let grants = grants
                    .into_iter()
                    .map(|(classification, level)| {
                        ClassificationId::new(classification.clone())
                            .map(|id| (id, level))
                            .map_err(|err| {
                                ApiError::BadRequest(format!(
                                    "invalid classification {classification:?} in {PERMISSIONS_HEADER}: {err}"
                                ))
                            })
                    })
                    .collect::<Result<HashMap<_, _>, _>>()?;
                UserPermissions::new(grants)
            }
        };

        let is_owner = matches!(header_str(OWNER_HEADER)?, Some("true") | Some("1"));

        Ok(Self {
            user_id,
            permissions,
            is_owner,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/diagrams", post(create_diagram).get(list_diagrams))
        .route("/diagrams/cleanup-duplicates", delete(cleanup_duplicates))
        .route(
            "/diagrams/{diagram_id}",
            get(load_diagram).delete(drop_diagram),
        )
        .route(
            "/diagrams/{diagram_id}/elements",
            get(list_elements).post(upsert_element),
        )
        .route(
            "/diagrams/{diagram_id}/elements/{element_id}",
            put(patch_element).delete(delete_element),
        )
        .with_state(state)
}

fn parse_diagram_id(raw: &str) -> Result<DiagramId, ApiError> {
    DiagramId::new(raw).map_err(|err| ApiError::BadRequest(format!("invalid diagram id: {err}")))
}

fn parse_element_id(raw: &str) -> Result<ElementId, ApiError> {
    ElementId::new(raw).map_err(|err| ApiError::BadRequest(format!("invalid element id: {err}")))
}

async fn create_diagram(
    State(state): State<AppState>,
    Json(request): Json<CreateDiagramRequest>,
) -> Result<(StatusCode, Json<CreateDiagramResponse>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("diagram name must not be empty".to_owned()));
    }

    let diagram_id = match request.diagram_id {
        Some(raw) => parse_diagram_id(&raw)?,
        None => DiagramId::new(format!("d:{}", uuid::Uuid::new_v4()))
            .map_err(|err| {
                tracing::error!(error = %err, "generated diagram id rejected");
                ApiError::Internal
            })?,
    };

    let relation_name = state
        .store
        .create_diagram(&diagram_id, request.name.trim())
        .map_err(|err| state.store_err(err))?;

    tracing::info!(diagram_id = %diagram_id, relation_name, "diagram created");
    Ok((
        StatusCode::CREATED,
        Json(CreateDiagramResponse {
            diagram_id: diagram_id.into_string(),
            relation_name,
        }),
    ))
}

/// Listing reconciles first so stale registry rows never reach the picker.
async fn list_diagrams(
    State(state): State<AppState>,
) -> Result<Json<Vec<DiagramJson>>, ApiError> {
    state.store.reconcile().map_err(|err| state.store_err(err))?;
    let diagrams = state
        .store
        .list_diagrams()
        .map_err(|err| state.store_err(err))?;

    Ok(Json(diagrams.into_iter().map(Into::into).collect()))
}

async fn load_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    auth: AuthContext,
) -> Result<Json<FullLoadResponse>, ApiError> {
    let diagram_id = parse_diagram_id(&diagram_id)?;
    let diagram = state
        .store
        .get_diagram(&diagram_id)
        .map_err(|err| state.store_err(err))?;
    let elements = state
        .store
        .list_elements(&diagram_id)
        .map_err(|err| state.store_err(err))?;
    let elements = access::visible_elements(elements, &auth.permissions, auth.is_owner);

    Ok(Json(FullLoadResponse {
        diagram: diagram.into(),
        elements: elements.into_iter().map(Into::into).collect(),
    }))
}

async fn list_elements(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    auth: AuthContext,
) -> Result<Json<Vec<ElementJson>>, ApiError> {
    let diagram_id = parse_diagram_id(&diagram_id)?;
    let elements = state
        .store
        .list_elements(&diagram_id)
        .map_err(|err| state.store_err(err))?;
    let elements = access::visible_elements(elements, &auth.permissions, auth.is_owner);

    Ok(Json(elements.into_iter().map(ElementJson::from).collect()))
}

async fn upsert_element(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    auth: AuthContext,
    Json(request): Json<UpsertElementRequest>,
) -> Result<Json<UpsertElementResponse>, ApiError> {
    let diagram_id = parse_diagram_id(&diagram_id)?;
    let record = request
        .element
        .into_record()
        .map_err(|err| ApiError::BadRequest(format!("invalid element: {err}")))?;

    // Edit rights are checked against the stored element when one exists (its
    // classification is what protects it), otherwise against the incoming one.
    let existing = state
        .store
        .get_element(&diagram_id, &record.id)
        .map_err(|err| state.store_err(err))?;
    let guarded = existing.as_ref().unwrap_or(&record);
    if !access::can_edit(guarded, &auth.permissions, auth.is_owner) {
        return Err(ApiError::Forbidden("element is not editable with your permissions"));
    }

    state
        .store
        .upsert_element(&diagram_id, &record)
        .map_err(|err| state.store_err(err))?;

    Ok(Json(UpsertElementResponse {
        element_id: record.id.into_string(),
    }))
}

async fn patch_element(
    State(state): State<AppState>,
    Path((diagram_id, element_id)): Path<(String, String)>,
    auth: AuthContext,
    Json(request): Json<PatchElementRequest>,
) -> Result<Json<AffectedResponse>, ApiError> {
    let diagram_id = parse_diagram_id(&diagram_id)?;
    let element_id = parse_element_id(&element_id)?;
    let patch = request
        .into_patch()
        .map_err(|err| ApiError::BadRequest(format!("invalid patch: {err}")))?;

    let Some(existing) = state
        .store
        .get_element(&diagram_id, &element_id)
        .map_err(|err| state.store_err(err))?
    else {
        return Ok(Json(AffectedResponse { affected: 0 }));
    };
    if !access::can_edit(&existing, &auth.permissions, auth.is_owner) {
        return Err(ApiError::Forbidden("element is not editable with your permissions"));
    }

    let affected = state
        .store
        .update_element(&diagram_id, &element_id, &patch)
        .map_err(|err| state.store_err(err))?;

    Ok(Json(AffectedResponse { affected }))
}

async fn delete_element(
    State(state): State<AppState>,
    Path((diagram_id, element_id)): Path<(String, String)>,
    auth: AuthContext,
) -> Result<Json<AffectedResponse>, ApiError> {
    let diagram_id = parse_diagram_id(&diagram_id)?;
    let element_id = parse_element_id(&element_id)?;

    // Deleting an absent element is an idempotent success.
    let Some(existing) = state
        .store
        .get_element(&diagram_id, &element_id)
        .map_err(|err| state.store_err(err))?
    else {
        return Ok(Json(AffectedResponse { affected: 0 }));
    };
    if !access::can_edit(&existing, &auth.permissions, auth.is_owner) {
        return Err(ApiError::Forbidden("element is not editable with your permissions"));
    }

    let affected = state
        .store
        .delete_element(&diagram_id, &element_id)
        .map_err(|err| state.store_err(err))?;

    Ok(Json(AffectedResponse { affected }))
}

async fn drop_diagram(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    auth: AuthContext,
) -> Result<Json<DropResponse>, ApiError> {
    if !access::can_administer(auth.is_owner) {
        return Err(ApiError::Forbidden("only the owner may delete a diagram"));
    }
    let diagram_id = parse_diagram_id(&diagram_id)?;

    let relation_name = state
        .store
        .drop_diagram(&diagram_id)
        .map_err(|err| state.store_err(err))?;

    tracing::info!(diagram_id = %diagram_id, relation_name, "diagram dropped");
    Ok(Json(DropResponse { relation_name }))
}

async fn cleanup_duplicates(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<CleanupResponse>, ApiError> {
    if !access::can_administer(auth.is_owner) {
        return Err(ApiError::Forbidden("only the owner may run maintenance"));
    }

    let report = state
        .store
        .collapse_duplicate_names()
        .map_err(|err| state.store_err(err))?;

    Ok(Json(CleanupResponse {
        deleted: report.deleted as u64,
        remaining: report.remaining as u64,
    }))
}

#[cfg(test)]
mod tests;
