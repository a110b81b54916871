//! HTTP routes: build requests, listing endpoints, static artifact serving.
//!
//! Every JSON response uses the same envelope:
//! `{"_meta": {"total", "limit", "offset", "error_code"}, "payload": ...}`.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use bundleworks_core::{BuildRequestOutcome, BuildService, RejectReason};
use bundleworks_scm::GitlabClient;
use bundleworks_shared::{Page, Pagination};

/// Wire code for the one success payload the build endpoint returns.
const CODE_ADDED_TO_QUEUE: &str = "ADDED_TO_QUEUE";

/// Wire codes for error responses.
const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
const CODE_DATA_NOT_FOUND: &str = "DATA_NOT_FOUND";

/// Application state shared across handlers.
pub struct AppState {
    pub service: BuildService<GitlabClient>,
}

/// Build the full route table over the shared state.
pub fn router(state: Arc<AppState>, static_root: &FsPath) -> Router {
    Router::new()
        .route("/request-build/{project_id}/{branch}", get(request_build))
        .route("/projects", get(get_projects))
        .route("/branches/{project_id}", get(get_branches))
        .route("/revisions/{project_id}/{branch}", get(get_revisions))
        .route(
            "/builds/{project_id}/{branch}/{revision}",
            get(get_builds),
        )
        .nest_service("/static", ServeDir::new(static_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    #[serde(rename = "_meta")]
    meta: ResponseMeta,
    payload: Option<T>,
}

/// A successful page response.
fn page_response<T: Serialize>(page: Page<T>) -> Response {
    let body = ApiResponse {
        meta: ResponseMeta {
            total: Some(page.total),
            limit: Some(page.limit),
            offset: Some(page.offset),
            error_code: None,
        },
        payload: Some(page.items),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// An error response carrying only a wire code.
fn error_response(status: StatusCode, code: &'static str) -> Response {
    let body = ApiResponse::<()> {
        meta: ResponseMeta {
            error_code: Some(code),
            ..ResponseMeta::default()
        },
        payload: None,
    };
    (status, Json(body)).into_response()
}

/// Internal errors are logged in full and reported only by code.
fn internal_error(err: bundleworks_shared::BundleworksError) -> Response {
    error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL_ERROR)
}

// ---------------------------------------------------------------------------
// Pagination query
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PaginationQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

impl From<PaginationQuery> for Pagination {
    fn from(query: PaginationQuery) -> Self {
        let defaults = Pagination::default();
        Pagination {
            limit: query.limit.unwrap_or(defaults.limit),
            offset: query.offset.unwrap_or(defaults.offset),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn request_build(
    State(state): State<Arc<AppState>>,
    Path((project_id, branch)): Path<(String, String)>,
) -> Response {
    match state.service.request_build(&project_id, &branch).await {
        Ok(BuildRequestOutcome::Accepted { revision }) => {
            let body = ApiResponse {
                meta: ResponseMeta::default(),
                payload: Some(serde_json::json!({
                    "code": CODE_ADDED_TO_QUEUE,
                    "revision": revision,
                })),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(BuildRequestOutcome::Rejected(reason)) => {
            let status = match reason {
                RejectReason::RevisionUnchanged => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            error_response(status, reason.code())
        }
        Err(e) => internal_error(e),
    }
}

async fn get_projects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaginationQuery>,
) -> Response {
    page_response(state.service.list_projects(query.into()))
}

async fn get_branches(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Response {
    match state.service.list_branches(&project_id, query.into()).await {
        Ok(page) => page_response(page),
        Err(e) => internal_error(e),
    }
}

async fn get_revisions(
    State(state): State<Arc<AppState>>,
    Path((project_id, branch)): Path<(String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Response {
    match state
        .service
        .list_revisions(&project_id, &branch, query.into())
        .await
    {
        Ok(page) => page_response(page),
        Err(e) => internal_error(e),
    }
}

async fn get_builds(
    State(state): State<Arc<AppState>>,
    Path((project_id, branch, revision)): Path<(String, String, String)>,
    Query(query): Query<PaginationQuery>,
) -> Response {
    match state
        .service
        .list_builds(&project_id, &branch, &revision, query.into())
        .await
    {
        Ok(Some(page)) => page_response(page),
        Ok(None) => error_response(StatusCode::NOT_FOUND, CODE_DATA_NOT_FOUND),
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_empty_meta_fields() {
        let body = ApiResponse::<()> {
            meta: ResponseMeta {
                error_code: Some(CODE_DATA_NOT_FOUND),
                ..ResponseMeta::default()
            },
            payload: None,
        };

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["_meta"]["error_code"], "DATA_NOT_FOUND");
        assert!(json["_meta"].get("total").is_none());
        assert!(json["payload"].is_null());
    }

    #[test]
    fn envelope_carries_page_meta() {
        let page = Page::new(vec!["a", "b"], 5, Pagination { limit: 2, offset: 2 });
        let body = ApiResponse {
            meta: ResponseMeta {
                total: Some(page.total),
                limit: Some(page.limit),
                offset: Some(page.offset),
                error_code: None,
            },
            payload: Some(page.items),
        };

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["_meta"]["total"], 5);
        assert_eq!(json["_meta"]["limit"], 2);
        assert_eq!(json["payload"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn pagination_query_defaults() {
        let pagination: Pagination = PaginationQuery {
            limit: None,
            offset: None,
        }
        .into();
        assert_eq!(pagination.limit, 20);
        assert_eq!(pagination.offset, 0);

        let pagination: Pagination = PaginationQuery {
            limit: Some(50),
            offset: Some(10),
        }
        .into();
        assert_eq!(pagination.limit, 50);
        assert_eq!(pagination.offset, 10);
    }
}
