pub mod announcer;
pub mod arrival;
pub mod config;
pub mod distance;
pub mod error;
pub mod eta;
pub mod gpx_trace;
pub mod models;
pub mod off_route;
pub mod provider;
pub mod recalculate;
pub mod session;
pub mod snapper;
pub mod steps;
pub mod update_location;
pub mod voice;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{post, put},
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::NavigationError;
use crate::models::{
    ApiError, FixResponse, GpsFix, NavigationState, StartSessionRequest, TrafficUpdate,
};
use crate::session::NavigationSession;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<NavigationSession>>,
}

impl AppState {
    pub fn new(session: NavigationSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/session",
            post(start_session).get(current_state).delete(end_session),
        )
        .route("/api/session/fix", post(submit_fix))
        .route("/api/traffic", put(update_traffic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> ApiResult<NavigationState> {
    let mut session = state.session.lock().await;
    match session.start(req.route, req.destination_name) {
        Ok(started) => Ok(Json(started.clone())),
        Err(err) => {
            tracing::warn!("rejected navigation session: {err}");
            Err(to_api_error(err))
        }
    }
}

async fn current_state(State(state): State<AppState>) -> Json<NavigationState> {
    Json(state.session.lock().await.state().clone())
}

async fn end_session(State(state): State<AppState>) -> Json<NavigationState> {
    let mut session = state.session.lock().await;
    session.end();
    Json(session.state().clone())
}

async fn submit_fix(
    State(state): State<AppState>,
    Json(fix): Json<GpsFix>,
) -> ApiResult<FixResponse> {
    let mut session = state.session.lock().await;
    if matches!(session.state(), NavigationState::Idle) {
        return Err(to_api_error(NavigationError::NoActiveSession));
    }
    Ok(Json(session.handle_fix(fix)))
}

async fn update_traffic(
    State(state): State<AppState>,
    Json(update): Json<TrafficUpdate>,
) -> Json<TrafficUpdate> {
    let factor = state.session.lock().await.set_traffic_factor(update.factor);
    Json(TrafficUpdate {
        factor: factor.value(),
    })
}

fn to_api_error(err: NavigationError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        NavigationError::InvalidRoute(_) => StatusCode::BAD_REQUEST,
        NavigationError::NoActiveSession => StatusCode::CONFLICT,
        NavigationError::Io(_)
        | NavigationError::Parse(_)
        | NavigationError::Gpx(_)
        | NavigationError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}
