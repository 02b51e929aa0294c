//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ActionPayload, ControlResponse, CreateSessionPayload, ErrorResponse, ExamTypeInfo,
        SessionSnapshot,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_exam_types,
        handlers::create_session,
        handlers::get_session,
        handlers::apply_action,
        handlers::admin_control,
        handlers::end_session,
    ),
    components(
        schemas(ExamTypeInfo, SessionSnapshot, CreateSessionPayload, ActionPayload, ControlResponse, ErrorResponse)
    ),
    tags(
        (name = "Avex API", description = "Session orchestration for the aviation English examiner agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/exam-types", get(handlers::list_exam_types))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/actions", post(handlers::apply_action))
        .route("/sessions/{id}/control", post(handlers::admin_control))
        .route("/sessions/{id}/end", post(handlers::end_session))
        .route("/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
