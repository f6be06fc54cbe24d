//! Workflow Engine
//!
//! Drives one report run through the fixed phase sequence
//! Plan → Research → Critique → Write → Review, persisting status and
//! artifacts after every phase.
//!
//! Invariants this module owns:
//! - Status moves strictly forward through the non-terminal chain; `failed`
//!   and `cancelled` are reachable from any non-terminal state and are
//!   immutable once written. Every status/artifact write is a guarded store
//!   update, so a cancelled or deleted run absorbs late writes as no-ops.
//! - Each phase gets a bounded number of retries with the engine's own
//!   backoff, on top of the capability clients' per-call retry. Only after
//!   both layers exhaust does the run fail.
//! - Cancellation is observed cooperatively at phase boundaries; an
//!   in-flight capability call completes but its result is discarded.
//! - This is the only layer that marks a run `failed`.

use crate::agents::{Critic, Planner, ResearchMode, Researcher, Reviewer, Writer};
use crate::config::EngineConfig;
use crate::db::store::RunStore;
use crate::llm::Generation;
use crate::models::{ReportMetadata, RunStatus, ARTIFACT_SCHEMA_VERSION};
use crate::search::WebSearch;
use crate::types::{AppError, AppResult, QualityTier};
use crate::utils::retry::{retry_with_policy, RetryPolicy};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Out-of-band cancellation signals, keyed by run id. The cancel route
/// signals; the engine observes between phases and clears on exit.
/// Signalling an unknown or finished run is harmless.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self, run_id: Uuid) {
        self.inner.lock().unwrap().insert(run_id);
    }

    pub fn is_signalled(&self, run_id: Uuid) -> bool {
        self.inner.lock().unwrap().contains(&run_id)
    }

    pub fn clear(&self, run_id: Uuid) {
        self.inner.lock().unwrap().remove(&run_id);
    }
}

/// The five pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Plan,
    Research,
    Critique,
    Write,
    Review,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Plan => "planning",
            Phase::Research => "research",
            Phase::Critique => "critique",
            Phase::Write => "writing",
            Phase::Review => "review",
        }
    }

    /// The in-progress status written when the phase starts. Review maps to
    /// `formatting`: the status the UI shows while the report is finalized.
    fn status(self) -> RunStatus {
        match self {
            Phase::Plan => RunStatus::Planning,
            Phase::Research => RunStatus::Researching,
            Phase::Critique => RunStatus::Critiquing,
            Phase::Write => RunStatus::Writing,
            Phase::Review => RunStatus::Formatting,
        }
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn RunStore>,
    generation: Arc<dyn Generation>,
    search: Arc<dyn WebSearch>,
    cancellations: CancelRegistry,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn RunStore>,
        generation: Arc<dyn Generation>,
        search: Arc<dyn WebSearch>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generation,
            search,
            cancellations: CancelRegistry::new(),
            config,
        }
    }

    pub fn cancellations(&self) -> &CancelRegistry {
        &self.cancellations
    }

    /// Execute the full pipeline for one run. Spawned as its own task; all
    /// failure paths are recorded on the run record, so this never returns
    /// an error to the caller.
    pub async fn execute(&self, run_id: Uuid, topic: String) {
        info!(run_id = %run_id, topic = %topic, "Workflow run starting");

        if let Err(e) = self.run_pipeline(run_id, &topic).await {
            // Reaching here means the store itself failed; the run record
            // could not even be marked failed.
            error!(run_id = %run_id, error = %e, "Workflow run aborted by store failure");
        }

        self.cancellations.clear(run_id);
    }

    async fn run_pipeline(&self, run_id: Uuid, topic: &str) -> AppResult<()> {
        let generation = self.generation.as_ref();
        let search = self.search.as_ref();
        let mode = if self.config.parallel_research {
            ResearchMode::Parallel
        } else {
            ResearchMode::Sequential
        };

        // Plan
        if !self.enter_phase(run_id, Phase::Plan).await? {
            return Ok(());
        }
        let plan = match self
            .with_phase_retry(run_id, Phase::Plan, || {
                Planner::generate_plan(topic, generation)
            })
            .await
        {
            Ok(plan) => plan,
            Err(e) => return self.record_failure(run_id, Phase::Plan, e).await,
        };
        if !self.store.save_plan(run_id, &plan).await? {
            return Ok(());
        }

        // Research
        if !self.enter_phase(run_id, Phase::Research).await? {
            return Ok(());
        }
        let findings = match self
            .with_phase_retry(run_id, Phase::Research, || {
                Researcher::gather(
                    &plan.questions,
                    mode,
                    self.config.sources_per_question,
                    self.config.question_delay(),
                    generation,
                    search,
                )
            })
            .await
        {
            Ok(findings) => findings,
            Err(e) => return self.record_failure(run_id, Phase::Research, e).await,
        };
        if !self.store.save_findings(run_id, &findings).await? {
            return Ok(());
        }

        // Critique (advisory: the agent degrades internally, never fails)
        if !self.enter_phase(run_id, Phase::Critique).await? {
            return Ok(());
        }
        let critique = Critic::assess(topic, &findings, generation).await;
        if !self.store.save_critique(run_id, &critique).await? {
            return Ok(());
        }

        // Write
        if !self.enter_phase(run_id, Phase::Write).await? {
            return Ok(());
        }
        let draft = match self
            .with_phase_retry(run_id, Phase::Write, || {
                Writer::compose(topic, &findings, Some(&critique), QualityTier::Premium, generation)
            })
            .await
        {
            Ok(draft) => draft,
            Err(e) => return self.record_failure(run_id, Phase::Write, e).await,
        };

        // Review (never fails: worst case keeps the draft)
        if !self.enter_phase(run_id, Phase::Review).await? {
            return Ok(());
        }
        let outcome = Reviewer::review(&draft, QualityTier::Premium, generation).await;

        let metadata = ReportMetadata {
            review: outcome.summary,
            word_count: outcome.final_report.split_whitespace().count(),
            source_count: findings.source_count(),
            schema_version: ARTIFACT_SCHEMA_VERSION,
        };

        if self
            .store
            .complete_run(run_id, &outcome.final_report, &metadata)
            .await?
        {
            info!(run_id = %run_id, word_count = metadata.word_count, "Workflow run completed");
        } else {
            info!(run_id = %run_id, "Run finished work but was already terminal, result discarded");
        }

        Ok(())
    }

    /// Observe cancellation, then write the phase's in-progress status.
    /// `false` means stop: the run was cancelled, finished, or deleted.
    async fn enter_phase(&self, run_id: Uuid, phase: Phase) -> AppResult<bool> {
        if self.cancellations.is_signalled(run_id) {
            info!(run_id = %run_id, phase = phase.name(), "Cancellation observed, stopping run");
            return Ok(false);
        }

        let advanced = self.store.mark_phase(run_id, phase.status()).await?;
        if !advanced {
            info!(run_id = %run_id, phase = phase.name(), "Run terminal or deleted, stopping");
        }
        Ok(advanced)
    }

    /// Phase-level retry: the coarser second layer on top of the capability
    /// clients' own per-call retry.
    async fn with_phase_retry<T, F, Fut>(&self, run_id: Uuid, phase: Phase, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let policy = RetryPolicy::new(
            self.config.phase_retries + 1,
            self.config.phase_backoff(),
        );

        retry_with_policy(policy, || {
            let fut = op();
            async move {
                fut.await.map_err(|e| {
                    warn!(run_id = %run_id, phase = phase.name(), error = %e, "Phase attempt failed");
                    e
                })
            }
        })
        .await
    }

    async fn record_failure(&self, run_id: Uuid, phase: Phase, error: AppError) -> AppResult<()> {
        let message = format!("{} phase failed: {}", phase.name(), classify(&error));
        error!(run_id = %run_id, phase = phase.name(), error = %error, "Run failed");

        if !self.store.fail_run(run_id, &message).await? {
            info!(run_id = %run_id, "Failure not recorded, run already terminal or deleted");
        }
        Ok(())
    }
}

/// Classified, human-readable cause for the run record. Raw capability error
/// text never lands in `error_message`.
fn classify(error: &AppError) -> &'static str {
    match error {
        AppError::LLMApi(_) => "text generation repeatedly failed",
        AppError::Search(_) => "web search returned no usable sources",
        AppError::EmptyArtifact(_) => "no usable output was produced",
        AppError::Database(_) => "storage was unavailable",
        _ => "internal error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryRunStore;
    use crate::db::store::CancelOutcome;
    use crate::llm::GenerationRequest;
    use crate::search::{SearchError, SearchSnippet};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TOPIC: &str = "The future of renewable energy storage";

    fn test_config() -> EngineConfig {
        EngineConfig {
            phase_retries: 2,
            phase_backoff_ms: 0,
            question_delay_ms: 0,
            sources_per_question: 2,
            parallel_research: false,
        }
    }

    fn plan_json() -> String {
        let questions: Vec<String> = (0..5).map(|i| format!("\"Question {}?\"", i)).collect();
        format!(
            r#"{{"questions": [{}], "approach": "survey", "estimated_depth": "moderate"}}"#,
            questions.join(", ")
        )
    }

    fn draft_text() -> String {
        format!(
            "# Report\n\n## Introduction\n{}\n\n## Conclusion\nDone.",
            "Sentence about storage. ".repeat(30)
        )
    }

    /// Answers each agent's prompt by recognizing its distinctive header.
    /// `broken_review` makes the reviewer's backing call return garbage.
    struct PipelineGeneration {
        broken_review: bool,
        /// Invoked when the critique prompt arrives; lets tests interleave
        /// cancellation with a phase in flight.
        on_critique: Option<Box<dyn Fn() + Send + Sync>>,
    }

    impl PipelineGeneration {
        fn normal() -> Self {
            Self {
                broken_review: false,
                on_critique: None,
            }
        }
    }

    #[async_trait]
    impl Generation for PipelineGeneration {
        async fn generate(&self, request: &GenerationRequest) -> AppResult<String> {
            let prompt = &request.prompt;
            if prompt.contains("Create a research plan") {
                Ok(plan_json())
            } else if prompt.contains("Answer the research question") {
                Ok(r#"{"answer": "Synthesized from sources.", "confidence": 0.8}"#.to_string())
            } else if prompt.contains("Review the research findings") {
                if let Some(hook) = &self.on_critique {
                    hook();
                }
                Ok(r#"{"confidence": 0.7, "gaps": [], "biases": [], "contradictions": [],
                       "suggestions": [], "overall_assessment": "fine"}"#
                    .to_string())
            } else if prompt.contains("Write a research report") {
                Ok(draft_text())
            } else if prompt.contains("Edit the markdown research report") {
                if self.broken_review {
                    Ok("sorry, I refuse to answer in JSON".to_string())
                } else {
                    Ok(format!(
                        r##"{{"final_report": "# Polished report\n\n{}",
                            "changes": {{"grammar": 2, "clarity": 1, "structure": 0, "accuracy": 0}},
                            "readability_score": 82, "overall_quality": "good"}}"##,
                        "Edited sentence. ".repeat(20)
                    ))
                }
            } else {
                Err(AppError::LLMApi(format!("unmatched prompt: {}", &prompt[..40.min(prompt.len())])))
            }
        }
    }

    struct WetSearch;

    #[async_trait]
    impl crate::search::WebSearch for WetSearch {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchSnippet>, SearchError> {
            Ok((0..max_results)
                .map(|i| SearchSnippet {
                    title: format!("Source {} for {}", i, query),
                    url: format!("https://example.org/{}", i),
                    snippet: "snippet".to_string(),
                    published: None,
                    relevance: None,
                })
                .collect())
        }
    }

    /// Always returns zero sources and counts how often the research phase
    /// touched it.
    struct DrySearch {
        calls: AtomicU32,
    }

    #[async_trait]
    impl crate::search::WebSearch for DrySearch {
        async fn search(&self, _q: &str, _n: usize) -> Result<Vec<SearchSnippet>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    fn engine_with(
        store: Arc<MemoryRunStore>,
        generation: Arc<dyn Generation>,
        search: Arc<dyn WebSearch>,
    ) -> WorkflowEngine {
        WorkflowEngine::new(store, generation, search, test_config())
    }

    async fn new_run(store: &MemoryRunStore) -> Uuid {
        let user = Uuid::new_v4();
        store.ensure_user(user, 5).await.unwrap();
        store.create_run(user, TOPIC).await.unwrap().id
    }

    #[tokio::test]
    async fn test_happy_path_reaches_completed_with_all_artifacts() {
        let store = Arc::new(MemoryRunStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration::normal()),
            Arc::new(WetSearch),
        );

        let run_id = new_run(&store).await;
        engine.execute(run_id, TOPIC.to_string()).await;

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.research_plan.is_some());
        assert!(run.findings.is_some());
        assert!(run.critique.is_some());
        assert!(run.final_report.as_deref().unwrap().starts_with("# Polished report"));
        assert!(run.completed_at.is_some());

        let metadata = run.report_metadata.unwrap();
        assert_eq!(metadata.review.overall_quality, "good");
        assert_eq!(metadata.source_count, 10); // 5 questions x 2 sources
        assert!(metadata.word_count > 0);
    }

    #[tokio::test]
    async fn test_status_progression_is_monotonic() {
        let store = Arc::new(MemoryRunStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration::normal()),
            Arc::new(WetSearch),
        );

        let run_id = new_run(&store).await;
        engine.execute(run_id, TOPIC.to_string()).await;

        let history = store.status_history(run_id);
        assert_eq!(
            history,
            vec![
                RunStatus::Pending,
                RunStatus::Planning,
                RunStatus::Researching,
                RunStatus::Critiquing,
                RunStatus::Writing,
                RunStatus::Formatting,
                RunStatus::Completed,
            ]
        );
        assert!(history.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    }

    #[tokio::test]
    async fn test_all_sources_dry_fails_run_after_phase_retries() {
        let store = Arc::new(MemoryRunStore::new());
        let search = Arc::new(DrySearch {
            calls: AtomicU32::new(0),
        });
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration::normal()),
            search.clone(),
        );

        let run_id = new_run(&store).await;
        engine.execute(run_id, TOPIC.to_string()).await;

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let message = run.error_message.unwrap();
        assert!(message.contains("research phase failed"), "message: {message}");

        // 3 phase attempts (1 + 2 retries), 5 questions each.
        assert_eq!(search.calls.load(Ordering::SeqCst), 15);

        // Artifacts from before the failure are retained.
        assert!(run.research_plan.is_some());
        assert!(run.findings.is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_critique_is_not_overwritten() {
        let store = Arc::new(MemoryRunStore::new());
        let run_id_slot = Arc::new(Mutex::new(None::<Uuid>));

        let registry_store = store.clone();
        let slot = run_id_slot.clone();
        let generation = Arc::new(PipelineGeneration {
            broken_review: false,
            on_critique: Some(Box::new(move || {
                // The user cancels while the critique call is in flight.
                let id = slot.lock().unwrap().expect("run id set");
                let store = registry_store.clone();
                let result = futures::executor::block_on(store.cancel_run(id, "cancelled by user"));
                assert_eq!(result.unwrap(), CancelOutcome::Cancelled);
            })),
        });

        let engine = engine_with(store.clone(), generation, Arc::new(WetSearch));

        let run_id = new_run(&store).await;
        *run_id_slot.lock().unwrap() = Some(run_id);
        engine.execute(run_id, TOPIC.to_string()).await;

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.error_message.as_deref(), Some("cancelled by user"));
        // The critique that completed after cancellation was discarded.
        assert!(run.critique.is_none());
        assert!(run.final_report.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_signal_stops_before_next_phase() {
        let store = Arc::new(MemoryRunStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration::normal()),
            Arc::new(WetSearch),
        );

        let run_id = new_run(&store).await;
        store.cancel_run(run_id, "cancelled by user").await.unwrap();
        engine.cancellations().signal(run_id);

        engine.execute(run_id, TOPIC.to_string()).await;

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.research_plan.is_none());
        // The registry entry is cleared once the engine exits.
        assert!(!engine.cancellations().is_signalled(run_id));
    }

    #[tokio::test]
    async fn test_unparsable_review_still_completes_with_original_draft() {
        let store = Arc::new(MemoryRunStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration {
                broken_review: true,
                on_critique: None,
            }),
            Arc::new(WetSearch),
        );

        let run_id = new_run(&store).await;
        engine.execute(run_id, TOPIC.to_string()).await;

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.final_report.as_deref(), Some(draft_text().as_str()));
        assert!(run
            .report_metadata
            .unwrap()
            .review
            .overall_quality
            .starts_with("needs-work"));
    }

    #[tokio::test]
    async fn test_run_deleted_mid_flight_stops_silently() {
        let store = Arc::new(MemoryRunStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(PipelineGeneration::normal()),
            Arc::new(WetSearch),
        );

        let run_id = new_run(&store).await;
        store.delete_run(run_id).await.unwrap();

        engine.execute(run_id, TOPIC.to_string()).await;

        assert!(store.get_run(run_id).await.unwrap().is_none());
    }

    #[test]
    fn test_cancel_registry_roundtrip() {
        let registry = CancelRegistry::new();
        let id = Uuid::new_v4();

        assert!(!registry.is_signalled(id));
        registry.signal(id);
        registry.signal(id); // idempotent
        assert!(registry.is_signalled(id));
        registry.clear(id);
        assert!(!registry.is_signalled(id));
    }
}
