//! Axum Handlers for the REST API
//!
//! Session management endpoints plus the capability-gated admin control
//! path. Uses `utoipa` doc comments to generate OpenAPI documentation.
//!
//! Error philosophy: guard blocks and dropped actions are not errors and
//! never appear here; genuine configuration failures surface as a generic
//! message while the session state is preserved.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use avex_core::error::ExamError;
use avex_core::exam::{ExamType, ExamTypeConfig};
use avex_core::session::{ApplyOutcome, Caller, SessionAction};

use crate::{
    models::{
        ActionPayload, ControlResponse, CreateSessionPayload, ErrorResponse, ExamTypeInfo,
        SessionSnapshot,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn exam_error_to_api(err: ExamError) -> ApiError {
    match err {
        ExamError::InvalidAction(_) => ApiError::BadRequest(err.to_string()),
        ExamError::RecordingNotFound { .. } | ExamError::UnsupportedSubsection { .. } => {
            ApiError::BadRequest(err.to_string())
        }
        // Configuration problems are ours, not the caller's; keep the
        // response generic and the detail in the logs.
        ExamError::ConfigurationMissing(detail) => {
            ApiError::InternalServerError(anyhow::anyhow!(detail))
        }
    }
}

fn outcome_str(outcome: ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Applied => "applied".to_string(),
        ApplyOutcome::Dropped(reason) => format!("dropped:{reason:?}"),
    }
}

/// List the supported exam types.
#[utoipa::path(
    get,
    path = "/exam-types",
    responses(
        (status = 200, description = "Supported exam types", body = [ExamTypeInfo])
    )
)]
pub async fn list_exam_types() -> Json<Vec<ExamTypeInfo>> {
    let infos = [ExamType::Eplis, ExamType::Sdea]
        .into_iter()
        .map(|exam_type| {
            let config = ExamTypeConfig::builtin(exam_type);
            ExamTypeInfo {
                exam_type: exam_type.to_string(),
                total_sections: config.total_sections(),
                duration_minutes: config.duration_minutes,
            }
        })
        .collect();
    Json(infos)
}

/// Create a new exam session for an exam type.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionSnapshot),
        (status = 400, description = "Unknown exam type", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let exam_type = ExamType::parse(&payload.exam_type)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown exam type {}", payload.exam_type)))?;

    let handle = state.create_session(exam_type).await;
    let machine = handle.machine.lock().await;
    let snapshot = SessionSnapshot::from_session(handle.id, machine.session());
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Get a snapshot of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state
        .get_session(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let machine = handle.machine.lock().await;
    Ok(Json(SessionSnapshot::from_session(id, machine.session())))
}

/// Apply a candidate/agent control action to a session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/actions",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ActionPayload,
    responses(
        (status = 200, description = "Action processed", body = ControlResponse),
        (status = 400, description = "Invalid action", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn apply_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActionPayload>,
) -> Result<Json<ControlResponse>, ApiError> {
    apply_with_caller(&state, id, payload, Caller::AGENT).await
}

/// Apply an admin override action. Requires the `x-admin-token` header.
#[utoipa::path(
    post,
    path = "/sessions/{id}/control",
    params(
        ("id" = Uuid, Path, description = "Session id"),
        ("x-admin-token" = String, Header, description = "Admin capability token")
    ),
    request_body = ActionPayload,
    responses(
        (status = 200, description = "Action processed", body = ControlResponse),
        (status = 400, description = "Invalid action", body = ErrorResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn admin_control(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ActionPayload>,
) -> Result<Json<ControlResponse>, ApiError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("admin control is not enabled".to_string()))?;
    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("x-admin-token header is required".to_string()))?;
    if provided != expected {
        return Err(ApiError::Unauthorized("invalid admin token".to_string()));
    }
    apply_with_caller(&state, id, payload, Caller::ADMIN).await
}

async fn apply_with_caller(
    state: &Arc<AppState>,
    id: Uuid,
    payload: ActionPayload,
    caller: Caller,
) -> Result<Json<ControlResponse>, ApiError> {
    let handle = state
        .get_session(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;

    let action = SessionAction::parse(
        &payload.action,
        payload.target_section,
        payload.target_subsection.as_deref(),
    )
    .map_err(exam_error_to_api)?;

    let mut machine = handle.machine.lock().await;
    let outcome = machine.apply(action, &caller).map_err(exam_error_to_api)?;
    Ok(Json(ControlResponse {
        outcome: outcome_str(outcome),
        session: SessionSnapshot::from_session(id, machine.session()),
    }))
}

/// End a session and discard the attempt.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Final snapshot of the ended session", body = SessionSnapshot),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state
        .remove_session(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let mut machine = handle.machine.lock().await;
    machine.end();
    Ok(Json(SessionSnapshot::from_session(id, machine.session())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tracing::Level;

    fn test_state(admin_token: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState::new(Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            log_level: Level::INFO,
            execution: avex_core::session::ExecutionContext::Development,
            admin_token: admin_token.map(|t| t.to_string()),
        })))
    }

    fn action(name: &str) -> ActionPayload {
        ActionPayload {
            action: name.to_string(),
            target_section: None,
            target_subsection: None,
        }
    }

    #[tokio::test]
    async fn start_action_moves_the_session_in_progress() {
        let state = test_state(None);
        let handle = state.create_session(ExamType::Eplis).await;

        let response = apply_with_caller(&state, handle.id, action("start"), Caller::AGENT)
            .await
            .unwrap();
        assert_eq!(response.0.outcome, "applied");
        assert_eq!(response.0.session.lifecycle, "in_progress");
        assert_eq!(response.0.session.current_subsection.as_deref(), Some("1P1"));
    }

    #[tokio::test]
    async fn admin_action_without_capability_is_rejected() {
        let state = test_state(None);
        let handle = state.create_session(ExamType::Eplis).await;
        apply_with_caller(&state, handle.id, action("start"), Caller::AGENT)
            .await
            .unwrap();

        let err = apply_with_caller(&state, handle.id, action("completeAll"), Caller::AGENT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = test_state(None);
        let err = apply_with_caller(&state, Uuid::new_v4(), action("start"), Caller::AGENT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn ended_sessions_are_discarded() {
        let state = test_state(None);
        let handle = state.create_session(ExamType::Sdea).await;
        let snapshot = end_session(State(state.clone()), Path(handle.id))
            .await
            .unwrap();
        assert_eq!(snapshot.0.lifecycle, "completed");
        assert!(state.get_session(handle.id).await.is_none());
    }
}
