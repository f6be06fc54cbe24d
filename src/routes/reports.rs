//! Report run endpoints
//!
//! The request boundary in front of the workflow engine: validation and the
//! atomic credit debit happen here, synchronously, before a run task is
//! spawned. Everything the caller later observes comes from polling the run
//! record.

use crate::db::store::CancelOutcome;
use crate::middleware::auth::AuthUser;
use crate::models::{
    sanitize_topic, AppState, CancelReportResponse, ReportRun, RunStatus, RunSummary,
    StartReportRequest, StartReportResponse,
};
use crate::types::{AppError, AppResult};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/reports", post(start_report).get(list_reports))
        .route("/api/reports/{id}", get(get_report).delete(delete_report))
        .route("/api/reports/{id}/cancel", post(cancel_report))
        .with_state(state)
}

async fn start_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<StartReportRequest>,
) -> AppResult<Json<StartReportResponse>> {
    // Validation first: a rejected request must have no side effects.
    let topic = sanitize_topic(&request.topic).map_err(AppError::InvalidRequest)?;

    state
        .store
        .ensure_user(user_id, state.config.auth.initial_credits)
        .await?;

    // Debit and creation are one transaction inside the store.
    let run = state.store.create_run(user_id, &topic).await?;

    info!(run_id = %run.id, user_id = %user_id, "Report run created, spawning workflow");

    let engine = state.engine.clone();
    let run_id = run.id;
    tokio::spawn(async move {
        engine.execute(run_id, topic).await;
    });

    Ok(Json(StartReportResponse {
        id: run.id,
        status: run.status,
    }))
}

async fn list_reports(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<RunSummary>>> {
    Ok(Json(state.store.list_runs(user_id).await?))
}

async fn get_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReportRun>> {
    let run = owned_run(&state, user_id, id).await?;
    Ok(Json(run))
}

async fn cancel_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CancelReportResponse>> {
    // Ownership check before any mutation.
    owned_run(&state, user_id, id).await?;

    match state
        .store
        .cancel_run(id, "cancelled by user request")
        .await?
    {
        CancelOutcome::Cancelled => {
            // The record is already terminal; the signal is the cooperative
            // net that stops the engine at its next phase boundary.
            state.engine.cancellations().signal(id);
            info!(run_id = %id, "Run cancelled");
            Ok(Json(CancelReportResponse {
                id,
                status: RunStatus::Cancelled,
            }))
        }
        CancelOutcome::AlreadyTerminal(status) => Err(AppError::CannotCancel(format!(
            "run is already {}",
            status
        ))),
    }
}

async fn delete_report(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    owned_run(&state, user_id, id).await?;

    state.store.delete_run(id).await?;
    info!(run_id = %id, "Run deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch a run the caller owns. Someone else's run id looks like a missing
/// run, never a permission error.
async fn owned_run(state: &AppState, user_id: Uuid, id: Uuid) -> AppResult<ReportRun> {
    match state.store.get_run(id).await? {
        Some(run) if run.user_id == user_id => Ok(run),
        _ => Err(AppError::NotFound(format!("run {}", id))),
    }
}
