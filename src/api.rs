//! HTTP API endpoints: session creation (password-gated), session lookup,
//! and the sport catalog.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::sports::Sport;
use crate::state::AppState;
use crate::types::{AthleteInfo, LeaderboardEntry, SessionStatus, UserStatusInfo};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub password: String,
    pub host_username: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Create a new session.
///
/// POST /api/session/create
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    if !state.config.validate_admin(&req.password) {
        return error_response(StatusCode::FORBIDDEN, "Invalid password");
    }
    let host_username = req.host_username.trim();
    if host_username.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Host username is required");
    }

    let session = state.create_session(host_username).await;
    tracing::info!("Session {} created by {}", session.code, host_username);

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            code: session.code,
            created_at: session.created_at,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub code: String,
    pub status: SessionStatus,
    pub host_username: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub count: usize,
    pub athletes: Vec<AthleteInfo>,
    pub users: Vec<UserStatusInfo>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Fetch a session's current state.
///
/// GET /api/session/{code}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    let Some(session) = state.get_session(&code).await else {
        return error_response(StatusCode::NOT_FOUND, "Session not found");
    };

    let snapshot = SessionSnapshot {
        code: session.code.clone(),
        status: session.status,
        host_username: session.host_username.clone(),
        created_at: session.created_at,
        started_at: session.started_at,
        ends_at: session.ends_at,
        is_paused: session.is_paused,
        count: session.athletes.len(),
        athletes: session.athletes.iter().map(AthleteInfo::from).collect(),
        users: state.users_with_status(&code).await,
        leaderboard: state.leaderboard(&code).await,
    };
    Json(snapshot).into_response()
}

/// List the selectable sports.
///
/// GET /api/sports
pub async fn list_sports(State(state): State<Arc<AppState>>) -> Json<Vec<Sport>> {
    Json(state.catalog.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn create_session_is_password_gated() {
        let state = Arc::new(test_state());

        let denied = create_session(
            State(state.clone()),
            Json(CreateSessionRequest {
                password: "wrong".to_string(),
                host_username: "alice".to_string(),
            }),
        )
        .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let blank = create_session(
            State(state.clone()),
            Json(CreateSessionRequest {
                password: state.config.admin_password.clone(),
                host_username: "   ".to_string(),
            }),
        )
        .await;
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

        let created = create_session(
            State(state.clone()),
            Json(CreateSessionRequest {
                password: state.config.admin_password.clone(),
                host_username: "alice".to_string(),
            }),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn get_session_404s_on_unknown_code() {
        let state = Arc::new(test_state());
        let resp = get_session(State(state), Path("NOPE42".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
