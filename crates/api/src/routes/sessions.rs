//! Session Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use dms::SessionRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::HistorySummary;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// Query parameters for sessions endpoint
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Response for sessions endpoint
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub data: Vec<SessionRecord>,
    pub count: usize,
    pub total: usize,
}

/// Stored sessions, newest first
pub async fn list_sessions(
    State(state): State<Arc<RwLock<AppState>>>,
    Query(params): Query<SessionQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let state = state.read().await;
    let data = state.repository.get_sessions(params.limit)?;

    Ok(Json(SessionListResponse {
        count: data.len(),
        total: state.repository.session_count(),
        data,
    }))
}

pub async fn latest_session(
    State(state): State<Arc<RwLock<AppState>>>,
) -> Result<Json<SessionRecord>, ApiError> {
    let state = state.read().await;
    state
        .repository
        .latest()?
        .map(Json)
        .ok_or(ApiError::NoSessions)
}

pub async fn get_session(
    State(state): State<Arc<RwLock<AppState>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ApiError> {
    let state = state.read().await;
    Ok(Json(state.repository.get_session(id)?))
}

/// Aggregate over the whole log
pub async fn get_summary(
    State(state): State<Arc<RwLock<AppState>>>,
) -> Result<Json<HistorySummary>, ApiError> {
    let state = state.read().await;
    Ok(Json(state.repository.summary()?))
}
