//! Screenshot-to-solution pipeline.
//!
//! One run at a time: starting a run cancels the previous one. Each run works on
//! the provider snapshot taken when it started, so [`Orchestrator::apply_config`]
//! never affects requests already in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use snapsolve_llm::provider::{ChatOptions, LlmProvider, Message};
use snapsolve_llm::{AnyProvider, LlmError, ProviderRegistry};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::classifier::classify_extraction;
use crate::config::Config;
use crate::content::{ContentKind, DebugResult, ExtractedContent, Screenshot, SolutionResult};
use crate::error::PipelineError;
use crate::normalizer::{comment_prefix, parse_debug, parse_extraction, parse_solution};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Classifying,
    Solving,
    Debugging,
    Done,
    Error,
    Cancelled,
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress {
        message: String,
        percent: u8,
        is_error: bool,
    },
    ProblemExtracted(ExtractedContent),
    SolutionReady(SolutionResult),
    DebugReady(DebugResult),
    Failed(PipelineError),
}

struct Snapshot {
    config: Config,
    provider: AnyProvider,
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

pub struct Orchestrator {
    registry: ProviderRegistry,
    snapshot: RwLock<Arc<Snapshot>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    state: watch::Sender<PipelineState>,
    active: Mutex<Option<ActiveRun>>,
    runs: AtomicU64,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build the provider named by `config` through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnknownProvider`] if the registry has no such provider.
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<Self, LlmError> {
        let provider = registry.create_provider(&config.provider.id, config.provider_config())?;
        Ok(Self::with_provider(config, provider, registry, events))
    }

    #[must_use]
    pub fn with_provider(
        config: Config,
        provider: AnyProvider,
        registry: ProviderRegistry,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            registry,
            snapshot: RwLock::new(Arc::new(Snapshot { config, provider })),
            events,
            state,
            active: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn provider_id(&self) -> String {
        self.snapshot().provider.id().to_owned()
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.snapshot().config.clone()
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Rebuild the provider for `config` and swap it in for subsequent runs.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnknownProvider`] and keeps the current snapshot if the
    /// provider id is not registered.
    pub fn apply_config(&self, config: Config) -> Result<(), LlmError> {
        let provider = self
            .registry
            .create_provider(&config.provider.id, config.provider_config())?;
        tracing::info!(provider = %config.provider.id, "applying new configuration");
        let next = Arc::new(Snapshot { config, provider });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }

    /// Cancel the active run, if any. Its future resolves to [`PipelineError::Cancelled`].
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = active.as_ref() {
            tracing::info!(run = run.id, "cancelling pipeline run");
            run.token.cancel();
        }
    }

    /// Extract, classify and solve the task shown in `screenshots`.
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] that ended the run. The same error is also
    /// delivered as a [`PipelineEvent::Failed`] event, except for
    /// [`PipelineError::NoScreenshots`]: an empty queue never starts a run, so the
    /// state and any run in flight are left alone.
    pub async fn process_screenshots(
        &self,
        screenshots: Vec<Screenshot>,
    ) -> Result<SolutionResult, PipelineError> {
        if screenshots.is_empty() {
            tracing::warn!("no screenshots queued, nothing to process");
            return Err(PipelineError::NoScreenshots);
        }
        let run = self.begin_run();
        run.set_state(PipelineState::Extracting);

        let token = run.token.clone();
        let span = tracing::info_span!("pipeline_run", run = run.id, images = screenshots.len());
        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => Err(PipelineError::Cancelled),
            r = run.solve(&screenshots).instrument(span) => r,
        };
        run.finish(outcome, PipelineEvent::SolutionReady)
    }

    /// Fix `previous` using screenshots of what went wrong.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Orchestrator::process_screenshots`].
    pub async fn debug(
        &self,
        screenshots: Vec<Screenshot>,
        previous: &SolutionResult,
    ) -> Result<DebugResult, PipelineError> {
        if screenshots.is_empty() {
            tracing::warn!("no screenshots queued, nothing to debug");
            return Err(PipelineError::NoScreenshots);
        }
        let run = self.begin_run();
        run.set_state(PipelineState::Debugging);

        let token = run.token.clone();
        let span = tracing::info_span!("debug_run", run = run.id, images = screenshots.len());
        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => Err(PipelineError::Cancelled),
            r = run.debug(&screenshots, previous).instrument(span) => r,
        };
        run.finish(outcome, PipelineEvent::DebugReady)
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn begin_run(&self) -> Run<'_> {
        let id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveRun {
                id,
                token: token.clone(),
            });
        if let Some(previous) = previous {
            tracing::info!(run = previous.id, "superseded by run {id}");
            previous.token.cancel();
        }
        Run {
            orchestrator: self,
            id,
            token,
            snapshot: self.snapshot(),
        }
    }

    fn is_active(&self, run_id: u64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| r.id == run_id)
    }

    fn end_run(&self, run_id: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|r| r.id == run_id) {
            *active = None;
        }
    }
}

/// State of one pipeline run, bound to the snapshot it started with.
struct Run<'a> {
    orchestrator: &'a Orchestrator,
    id: u64,
    token: CancellationToken,
    snapshot: Arc<Snapshot>,
}

impl Run<'_> {
    fn emit(&self, event: PipelineEvent) {
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.orchestrator.events.send(event);
    }

    fn progress(&self, message: impl Into<String>, percent: u8) {
        self.emit(PipelineEvent::Progress {
            message: message.into(),
            percent,
            is_error: false,
        });
    }

    fn set_state(&self, state: PipelineState) {
        if self.orchestrator.is_active(self.id) {
            self.orchestrator.state.send_replace(state);
        }
    }

    /// Publish the terminal event and state, then hand the outcome back.
    fn finish<T: Clone>(
        &self,
        outcome: Result<T, PipelineError>,
        ready: fn(T) -> PipelineEvent,
    ) -> Result<T, PipelineError> {
        let outcome = if self.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            outcome
        };

        match &outcome {
            Ok(value) => {
                self.progress("Done", 100);
                self.emit(ready(value.clone()));
                self.set_state(PipelineState::Done);
                tracing::info!(run = self.id, "pipeline run finished");
            }
            Err(PipelineError::Cancelled) => {
                let _ = self
                    .orchestrator
                    .events
                    .send(PipelineEvent::Failed(PipelineError::Cancelled));
                self.set_state(PipelineState::Cancelled);
                tracing::info!(run = self.id, "pipeline run cancelled");
            }
            Err(err) => {
                self.emit(PipelineEvent::Progress {
                    message: err.user_message(),
                    percent: 100,
                    is_error: true,
                });
                self.emit(PipelineEvent::Failed(err.clone()));
                self.set_state(PipelineState::Error);
                tracing::warn!(run = self.id, "pipeline run failed: {err}");
            }
        }
        self.orchestrator.end_run(self.id);
        outcome
    }

    async fn check_credentials(&self) -> Result<(), PipelineError> {
        let provider = &self.snapshot.provider;
        if !provider.descriptor().requires_api_key {
            return Ok(());
        }
        if provider.config().api_key.trim().is_empty() {
            tracing::warn!(provider = provider.id(), "no API key configured");
            return Err(PipelineError::InvalidCredentials);
        }
        if !provider.validate_api_key().await {
            tracing::warn!(provider = provider.id(), "API key rejected");
            return Err(PipelineError::InvalidCredentials);
        }
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<String, PipelineError> {
        let provider = &self.snapshot.provider;
        let start = Instant::now();
        let llm_span = tracing::info_span!("llm_call", provider = provider.id(), model = %model);
        match provider.chat(messages, model, options).instrument(llm_span).await {
            Ok(response) => {
                let latency = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(latency_ms = latency, chars = response.content.len(), "chat completed");
                Ok(response.content)
            }
            Err(e) => {
                tracing::warn!(provider = provider.id(), model, "chat failed: {e}");
                Err(PipelineError::from_llm(&e))
            }
        }
    }

    async fn solve(&self, screenshots: &[Screenshot]) -> Result<SolutionResult, PipelineError> {
        self.check_credentials().await?;
        self.progress("Extracting problem from screenshots...", 20);

        let config = &self.snapshot.config;
        let models = config.resolved_models();
        let pipeline = &config.pipeline;

        let messages = [
            Message::system(prompts::EXTRACTION_SYSTEM_PROMPT),
            Message::user_with_images(
                prompts::extraction_instruction(&pipeline.language),
                screenshots.iter().map(Screenshot::to_image).collect(),
            ),
        ];
        let raw = self
            .chat(
                &messages,
                &models.extraction,
                ChatOptions::new(pipeline.extraction_temperature, pipeline.extraction_max_tokens),
            )
            .await?;

        self.set_state(PipelineState::Classifying);
        let record = parse_extraction(&raw);
        let content = classify_extraction(&record);
        tracing::info!(kind = %content.kind, tasks = content.tasks().len(), "problem classified");
        if record.fallback_used {
            self.progress("Could not read structured output, using the raw extraction", 40);
        }
        self.emit(PipelineEvent::ProblemExtracted(content.clone()));
        self.progress("Problem extracted", 40);

        self.set_state(PipelineState::Solving);
        self.progress("Generating solution...", 60);

        if content.is_mixed() {
            let solves = content.tasks().iter().map(|task| self.solve_one(task, &models.solution));
            let results = futures::future::try_join_all(solves).await?;
            Ok(merge_solutions(results, &pipeline.language))
        } else {
            self.solve_one(&content, &models.solution).await
        }
    }

    async fn solve_one(
        &self,
        content: &ExtractedContent,
        model: &str,
    ) -> Result<SolutionResult, PipelineError> {
        let pipeline = &self.snapshot.config.pipeline;
        let messages = [
            Message::system(prompts::SOLUTION_SYSTEM_PROMPT),
            Message::user(prompts::solve_prompt(content, &pipeline.language)),
        ];
        let raw = self
            .chat(
                &messages,
                model,
                ChatOptions::new(pipeline.solution_temperature, pipeline.solution_max_tokens),
            )
            .await?;

        let mut solution = parse_solution(&raw);
        if solution.fallback_used {
            self.progress("Answer had no code block, showing it as is", 60);
        }
        solution.kind = Some(content.kind);
        Ok(solution)
    }

    async fn debug(
        &self,
        screenshots: &[Screenshot],
        previous: &SolutionResult,
    ) -> Result<DebugResult, PipelineError> {
        self.check_credentials().await?;
        self.progress("Analyzing what went wrong...", 20);

        let config = &self.snapshot.config;
        let models = config.resolved_models();
        let pipeline = &config.pipeline;
        let messages = [
            Message::system(prompts::DEBUG_SYSTEM_PROMPT),
            Message::user_with_images(
                prompts::debug_prompt(previous, &pipeline.language),
                screenshots.iter().map(Screenshot::to_image).collect(),
            ),
        ];
        self.progress("Generating fix...", 60);
        let raw = self
            .chat(
                &messages,
                &models.debugging,
                ChatOptions::new(pipeline.solution_temperature, pipeline.solution_max_tokens),
            )
            .await?;

        let mut result = parse_debug(&raw);
        if result.solution.fallback_used {
            self.progress("Answer had no code block, showing it as is", 60);
        }
        result.solution.kind = previous.kind;
        Ok(result)
    }
}

/// Combine per-task results of a mixed run, in task order.
fn merge_solutions(results: Vec<SolutionResult>, language: &str) -> SolutionResult {
    let prefix = comment_prefix(language);
    let code = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{prefix} ===== Task {} =====\n{}", i + 1, r.code))
        .collect::<Vec<_>>()
        .join("\n\n");
    let labelled = |f: fn(&SolutionResult) -> &str| {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("Task {}: {}", i + 1, f(r)))
            .collect::<Vec<_>>()
            .join("; ")
    };
    let time_complexity = labelled(|r| r.time_complexity.as_str());
    let space_complexity = labelled(|r| r.space_complexity.as_str());
    let thoughts = results
        .iter()
        .enumerate()
        .flat_map(|(i, r)| r.thoughts.iter().map(move |t| format!("[Task {}] {t}", i + 1)))
        .collect();
    let fallback_used = results.iter().any(|r| r.fallback_used);

    SolutionResult {
        code,
        thoughts,
        time_complexity,
        space_complexity,
        kind: Some(ContentKind::Mixed),
        tasks: results,
        fallback_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(code: &str, thoughts: &[&str], time: &str) -> SolutionResult {
        SolutionResult {
            code: code.into(),
            thoughts: thoughts.iter().map(|t| (*t).to_owned()).collect(),
            time_complexity: time.into(),
            space_complexity: "O(1)".into(),
            kind: Some(ContentKind::CodingTask),
            ..SolutionResult::default()
        }
    }

    #[test]
    fn merge_keeps_task_order() {
        let merged = merge_solutions(
            vec![
                solution("a()", &["first"], "O(n)"),
                solution("b()", &["second", "third"], "O(log n)"),
            ],
            "python",
        );
        assert_eq!(
            merged.code,
            "# ===== Task 1 =====\na()\n\n# ===== Task 2 =====\nb()"
        );
        assert_eq!(merged.time_complexity, "Task 1: O(n); Task 2: O(log n)");
        assert_eq!(merged.space_complexity, "Task 1: O(1); Task 2: O(1)");
        assert_eq!(
            merged.thoughts,
            ["[Task 1] first", "[Task 2] second", "[Task 2] third"]
        );
        assert_eq!(merged.kind, Some(ContentKind::Mixed));
        assert_eq!(merged.tasks.len(), 2);
        assert!(!merged.fallback_used);
    }

    #[test]
    fn merge_uses_language_comment_syntax() {
        let merged = merge_solutions(vec![solution("x", &[], "O(1)")], "java");
        assert!(merged.code.starts_with("// ===== Task 1 ====="));
    }

    #[test]
    fn merge_propagates_fallback() {
        let mut fallback = solution("raw", &[], "O(n)");
        fallback.fallback_used = true;
        let merged = merge_solutions(vec![solution("x", &[], "O(1)"), fallback], "go");
        assert!(merged.fallback_used);
    }

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Cancelled.is_terminal());
        assert!(!PipelineState::Solving.is_terminal());
    }
}
