//! Durable run record store.
//!
//! The workflow engine and the request boundary talk to the store through
//! the `RunStore` trait; Postgres backs production and `MemoryRunStore`
//! backs tests. Every post-creation mutation is a guarded update that only
//! touches non-terminal rows, which is what makes status transitions
//! monotonic and lets a cancelled or deleted run absorb late engine writes
//! as zero-row no-ops.

use crate::models::{
    Critique, FindingsArtifact, ReportMetadata, ReportRun, ResearchPlan, RunStatus, RunSummary,
};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

pub const LIST_RUNS_CAP: i64 = 50;

/// Outcome of a cancellation request against the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal(RunStatus),
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Make sure a user row exists, seeding its credit balance on first
    /// sight. Idempotent.
    async fn ensure_user(&self, user_id: Uuid, initial_credits: i64) -> AppResult<()>;

    /// Atomically debit one credit and create the run in `pending`. The
    /// debit and the insert are one transaction: a concurrent second
    /// request can never act on a not-yet-debited balance.
    async fn create_run(&self, user_id: Uuid, topic: &str) -> AppResult<ReportRun>;

    async fn get_run(&self, id: Uuid) -> AppResult<Option<ReportRun>>;

    /// The owner's runs, newest first, capped at `LIST_RUNS_CAP`.
    async fn list_runs(&self, user_id: Uuid) -> AppResult<Vec<RunSummary>>;

    /// Write an in-progress phase status. Returns `false` when the run is
    /// terminal or gone, in which case the caller must stop.
    async fn mark_phase(&self, id: Uuid, status: RunStatus) -> AppResult<bool>;

    async fn save_plan(&self, id: Uuid, plan: &ResearchPlan) -> AppResult<bool>;

    async fn save_findings(&self, id: Uuid, findings: &FindingsArtifact) -> AppResult<bool>;

    async fn save_critique(&self, id: Uuid, critique: &Critique) -> AppResult<bool>;

    /// Terminal success: final report, metadata, `completed_at`, and status
    /// written as one guarded update.
    async fn complete_run(
        &self,
        id: Uuid,
        final_report: &str,
        metadata: &ReportMetadata,
    ) -> AppResult<bool>;

    /// Terminal failure with a classified, human-readable message.
    async fn fail_run(&self, id: Uuid, message: &str) -> AppResult<bool>;

    /// Synchronous cancellation at request time. Distinguishes a run that
    /// was already terminal from one this call cancelled.
    async fn cancel_run(&self, id: Uuid, message: &str) -> AppResult<CancelOutcome>;

    /// Remove the record entirely. Returns `false` when it did not exist.
    async fn delete_run(&self, id: Uuid) -> AppResult<bool>;

    async fn credits_remaining(&self, user_id: Uuid) -> AppResult<i64>;
}

// -- Postgres implementation ------------------------------------------------

pub struct PgRunStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    user_id: Uuid,
    topic: String,
    status: String,
    research_plan: Option<serde_json::Value>,
    findings: Option<serde_json::Value>,
    critique: Option<serde_json::Value>,
    final_report: Option<String>,
    report_metadata: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    topic: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

const RUN_COLUMNS: &str = "id, user_id, topic, status, research_plan, findings, critique, \
                           final_report, report_metadata, error_message, created_at, completed_at";

// Guard clause shared by every post-creation mutation.
const NON_TERMINAL: &str = "status NOT IN ('completed', 'failed', 'cancelled')";

fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("artifact encode failed: {}", e)))
}

fn from_json<T: DeserializeOwned>(value: Option<serde_json::Value>) -> AppResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("artifact decode failed: {}", e))),
    }
}

impl TryFrom<RunRow> for ReportRun {
    type Error = AppError;

    fn try_from(row: RunRow) -> AppResult<Self> {
        let status = RunStatus::parse(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unknown run status: {}", row.status)))?;

        Ok(ReportRun {
            id: row.id,
            user_id: row.user_id,
            topic: row.topic,
            status,
            research_plan: from_json(row.research_plan)?,
            findings: from_json(row.findings)?,
            critique: from_json(row.critique)?,
            final_report: row.final_report,
            report_metadata: from_json(row.report_metadata)?,
            error_message: row.error_message,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn save_artifact(&self, id: Uuid, column: &str, value: serde_json::Value) -> AppResult<bool> {
        let sql = format!(
            "UPDATE report_runs SET {} = $2 WHERE id = $1 AND {}",
            column, NON_TERMINAL
        );
        let result = sqlx::query(&sql).bind(id).bind(value).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn ensure_user(&self, user_id: Uuid, initial_credits: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, credits) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(format!("user_{}", user_id))
        .bind(format!("{}@draftmill.local", user_id))
        .bind(initial_credits)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_run(&self, user_id: Uuid, topic: &str) -> AppResult<ReportRun> {
        let mut tx = self.pool.begin().await?;

        let debit = sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits >= 1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if debit.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::InsufficientCredits);
        }

        let sql = format!(
            "INSERT INTO report_runs (id, user_id, topic, status) \
             VALUES ($1, $2, $3, 'pending') RETURNING {}",
            RUN_COLUMNS
        );
        let row: RunRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(topic)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        row.try_into()
    }

    async fn get_run(&self, id: Uuid) -> AppResult<Option<ReportRun>> {
        let sql = format!("SELECT {} FROM report_runs WHERE id = $1", RUN_COLUMNS);
        let row: Option<RunRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;

        row.map(ReportRun::try_from).transpose()
    }

    async fn list_runs(&self, user_id: Uuid) -> AppResult<Vec<RunSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, topic, status, created_at, completed_at FROM report_runs \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(LIST_RUNS_CAP)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status = RunStatus::parse(&row.status)
                    .ok_or_else(|| AppError::Internal(format!("unknown run status: {}", row.status)))?;
                Ok(RunSummary {
                    id: row.id,
                    topic: row.topic,
                    status,
                    created_at: row.created_at,
                    completed_at: row.completed_at,
                })
            })
            .collect()
    }

    async fn mark_phase(&self, id: Uuid, status: RunStatus) -> AppResult<bool> {
        let sql = format!(
            "UPDATE report_runs SET status = $2 WHERE id = $1 AND {}",
            NON_TERMINAL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_plan(&self, id: Uuid, plan: &ResearchPlan) -> AppResult<bool> {
        self.save_artifact(id, "research_plan", to_json(plan)?).await
    }

    async fn save_findings(&self, id: Uuid, findings: &FindingsArtifact) -> AppResult<bool> {
        self.save_artifact(id, "findings", to_json(findings)?).await
    }

    async fn save_critique(&self, id: Uuid, critique: &Critique) -> AppResult<bool> {
        self.save_artifact(id, "critique", to_json(critique)?).await
    }

    async fn complete_run(
        &self,
        id: Uuid,
        final_report: &str,
        metadata: &ReportMetadata,
    ) -> AppResult<bool> {
        let sql = format!(
            "UPDATE report_runs SET status = 'completed', final_report = $2, \
             report_metadata = $3, completed_at = NOW() WHERE id = $1 AND {}",
            NON_TERMINAL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(final_report)
            .bind(to_json(metadata)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_run(&self, id: Uuid, message: &str) -> AppResult<bool> {
        let sql = format!(
            "UPDATE report_runs SET status = 'failed', error_message = $2, \
             completed_at = NOW() WHERE id = $1 AND {}",
            NON_TERMINAL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_run(&self, id: Uuid, message: &str) -> AppResult<CancelOutcome> {
        let sql = format!(
            "UPDATE report_runs SET status = 'cancelled', error_message = $2, \
             completed_at = NOW() WHERE id = $1 AND {}",
            NON_TERMINAL
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(CancelOutcome::Cancelled);
        }

        match self.get_run(id).await? {
            Some(run) => Ok(CancelOutcome::AlreadyTerminal(run.status)),
            None => Err(AppError::NotFound(format!("run {}", id))),
        }
    }

    async fn delete_run(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM report_runs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn credits_remaining(&self, user_id: Uuid) -> AppResult<i64> {
        let credits: Option<i64> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        credits.ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }
}
