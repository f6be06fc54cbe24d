//! In-memory run store.
//!
//! The deterministic stand-in for Postgres used by engine and route tests.
//! Mirrors `PgRunStore` semantics exactly: the credit debit is atomic with
//! run creation, and every post-creation mutation refuses terminal rows.

use crate::db::store::{CancelOutcome, RunStore, LIST_RUNS_CAP};
use crate::models::{
    Critique, FindingsArtifact, ReportMetadata, ReportRun, ResearchPlan, RunStatus, RunSummary,
};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    runs: HashMap<Uuid, ReportRun>,
    credits: HashMap<Uuid, i64>,
    history: HashMap<Uuid, Vec<RunStatus>>,
}

#[derive(Default)]
pub struct MemoryRunStore {
    inner: Mutex<Inner>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for tests: a store with one known user balance.
    pub fn with_credits(user_id: Uuid, credits: i64) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().credits.insert(user_id, credits);
        store
    }

    /// Every status the run has held, in order. Lets tests assert the
    /// monotonic-progression invariant.
    pub fn status_history(&self, id: Uuid) -> Vec<RunStatus> {
        self.inner
            .lock()
            .unwrap()
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn mutate_non_terminal<F>(&self, id: Uuid, f: F) -> AppResult<bool>
    where
        F: FnOnce(&mut ReportRun),
    {
        let mut inner = self.inner.lock().unwrap();
        let Inner { runs, history, .. } = &mut *inner;
        match runs.get_mut(&id) {
            Some(run) if !run.status.is_terminal() => {
                let before = run.status;
                f(run);
                if run.status != before {
                    history.entry(id).or_default().push(run.status);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn ensure_user(&self, user_id: Uuid, initial_credits: i64) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.credits.entry(user_id).or_insert(initial_credits);
        Ok(())
    }

    async fn create_run(&self, user_id: Uuid, topic: &str) -> AppResult<ReportRun> {
        let mut inner = self.inner.lock().unwrap();

        let balance = inner.credits.entry(user_id).or_insert(0);
        if *balance < 1 {
            return Err(AppError::InsufficientCredits);
        }
        *balance -= 1;

        let run = ReportRun {
            id: Uuid::new_v4(),
            user_id,
            topic: topic.to_string(),
            status: RunStatus::Pending,
            research_plan: None,
            findings: None,
            critique: None,
            final_report: None,
            report_metadata: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        inner.runs.insert(run.id, run.clone());
        inner.history.insert(run.id, vec![RunStatus::Pending]);
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> AppResult<Option<ReportRun>> {
        Ok(self.inner.lock().unwrap().runs.get(&id).cloned())
    }

    async fn list_runs(&self, user_id: Uuid) -> AppResult<Vec<RunSummary>> {
        let inner = self.inner.lock().unwrap();
        let mut summaries: Vec<RunSummary> = inner
            .runs
            .values()
            .filter(|run| run.user_id == user_id)
            .map(RunSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(LIST_RUNS_CAP as usize);
        Ok(summaries)
    }

    async fn mark_phase(&self, id: Uuid, status: RunStatus) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| run.status = status)
    }

    async fn save_plan(&self, id: Uuid, plan: &ResearchPlan) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| run.research_plan = Some(plan.clone()))
    }

    async fn save_findings(&self, id: Uuid, findings: &FindingsArtifact) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| run.findings = Some(findings.clone()))
    }

    async fn save_critique(&self, id: Uuid, critique: &Critique) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| run.critique = Some(critique.clone()))
    }

    async fn complete_run(
        &self,
        id: Uuid,
        final_report: &str,
        metadata: &ReportMetadata,
    ) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| {
            run.status = RunStatus::Completed;
            run.final_report = Some(final_report.to_string());
            run.report_metadata = Some(metadata.clone());
            run.completed_at = Some(Utc::now());
        })
    }

    async fn fail_run(&self, id: Uuid, message: &str) -> AppResult<bool> {
        self.mutate_non_terminal(id, |run| {
            run.status = RunStatus::Failed;
            run.error_message = Some(message.to_string());
            run.completed_at = Some(Utc::now());
        })
    }

    async fn cancel_run(&self, id: Uuid, message: &str) -> AppResult<CancelOutcome> {
        let cancelled = self.mutate_non_terminal(id, |run| {
            run.status = RunStatus::Cancelled;
            run.error_message = Some(message.to_string());
            run.completed_at = Some(Utc::now());
        })?;

        if cancelled {
            return Ok(CancelOutcome::Cancelled);
        }

        match self.inner.lock().unwrap().runs.get(&id) {
            Some(run) => Ok(CancelOutcome::AlreadyTerminal(run.status)),
            None => Err(AppError::NotFound(format!("run {}", id))),
        }
    }

    async fn delete_run(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.inner.lock().unwrap().runs.remove(&id).is_some())
    }

    async fn credits_remaining(&self, user_id: Uuid) -> AppResult<i64> {
        self.inner
            .lock()
            .unwrap()
            .credits
            .get(&user_id)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }
}
