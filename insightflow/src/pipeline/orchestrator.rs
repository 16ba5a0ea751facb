//! Runs the five stages in order over one workflow context.
//!
//! The orchestrator is the only writer of a [`WorkflowContext`]. Stages see
//! snapshots and return values; every merge, status change and log entry
//! happens here, and each log entry is mirrored to the event sink.

use super::options::{WorkflowOptions, WorkflowRequest};
use super::result::WorkflowResult;
use super::retry::{RetryConfig, RetryDecision, RetryState};
use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::context::{ContextSnapshot, WorkflowContext};
use crate::core::{LogEntry, Passage, ProgressEvent, StageRole, WorkflowStatus};
use crate::errors::{
    ConfigError, InsightflowError, StageDegraded, StageError, WorkflowAborted,
    WorkflowErrorPayload,
};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::services::Generation;
use crate::stages::{
    build_contribution, citations, default_stages, sanitize_generation, Stage, StagePorts,
    StageSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};

/// Drives workflow runs.
///
/// One orchestrator may serve many concurrent runs; at most
/// `max_concurrent_workflows` of them execute at a time.
pub struct Orchestrator {
    config: EngineConfig,
    ports: StagePorts,
    stages: Vec<Arc<dyn Stage>>,
    sink: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("stages", &self.stages)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the built-in stages.
    pub fn new(config: EngineConfig, ports: StagePorts) -> Result<Self, ConfigError> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_workflows));
        Ok(Self {
            config,
            ports,
            stages: default_stages(),
            sink: Arc::new(NoOpEventSink),
            permits,
        })
    }

    /// Sets the progress event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the stage implementations.
    ///
    /// There must be exactly one stage per role, in sequence order.
    pub fn with_stages(mut self, stages: Vec<Arc<dyn Stage>>) -> Result<Self, ConfigError> {
        let roles: Vec<StageRole> = stages.iter().map(|s| s.role()).collect();
        if roles != StageRole::ALL {
            return Err(ConfigError::new(
                "stages",
                format!("expected one stage per role in sequence order, got {roles:?}"),
            ));
        }
        self.stages = stages;
        Ok(self)
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs a workflow to completion.
    ///
    /// Stage failures never surface as `Err`: they are reported through the
    /// result's status and error payload. `Err` means invalid options or a
    /// broken engine invariant.
    pub async fn run(&self, request: WorkflowRequest) -> Result<WorkflowResult, InsightflowError> {
        self.run_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Runs a workflow that stops when `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        request: WorkflowRequest,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, InsightflowError> {
        request.options.validate()?;
        let plan = RunPlan::new(&self.config, &request.options);
        let ctx = WorkflowContext::new(request.query, plan.retry.max_attempts());
        let span = tracing::info_span!("workflow", run_id = %ctx.run_id());

        let run = Run {
            orchestrator: self,
            ctx,
            plan,
            cancel,
        };

        async move {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = self.permits.acquire() => Some(permit.map_err(|_| {
                    WorkflowAborted {
                        stage: None,
                        cancelled: false,
                        reason: "orchestrator is shutting down".to_string(),
                    }
                })?),
            };
            match permit {
                Some(_permit) => run.execute().await,
                None => run.cancel_before_start().await,
            }
        }
        .instrument(span)
        .await
    }
}

/// Effective settings for one run: engine config plus per-run options.
#[derive(Debug, Clone)]
struct RunPlan {
    retry: RetryConfig,
    stage_timeout_ms: u64,
    settings: [StageSettings; 5],
}

impl RunPlan {
    fn new(config: &EngineConfig, options: &WorkflowOptions) -> Self {
        let mut retry = config.retry.clone();
        if let Some(max_retries) = options.max_retries {
            retry.max_retries = max_retries;
        }
        let settings = StageRole::ALL.map(|role| {
            let mut settings = StageSettings::from_config(config, role);
            if let Some(model) = &options.model {
                settings.model.clone_from(model);
            }
            if let Some(temperature) = options.temperature_overrides.get(&role) {
                settings.temperature = *temperature;
            }
            settings
        });
        Self {
            retry,
            stage_timeout_ms: options
                .per_stage_timeout_ms
                .unwrap_or(config.per_stage_timeout_ms),
            settings,
        }
    }

    fn settings(&self, role: StageRole) -> &StageSettings {
        &self.settings[role.index()]
    }
}

/// A result the stage may keep.
#[derive(Debug)]
struct Accepted {
    passages: Vec<Passage>,
    generation: Generation,
    ungrounded: bool,
}

/// A failed attempt, possibly with a partial result worth keeping.
#[derive(Debug)]
struct Rejected {
    error: StageError,
    partial: Option<Accepted>,
}

impl From<StageError> for Rejected {
    fn from(error: StageError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

enum StageOutcome {
    Continue,
    Abort(WorkflowErrorPayload),
}

/// One attempt: prepare, retrieve, generate, validate.
async fn run_attempt(
    stage: &dyn Stage,
    snapshot: &ContextSnapshot,
    ports: &StagePorts,
    settings: &StageSettings,
) -> Result<Accepted, Rejected> {
    let spec = stage.prepare_query(snapshot, settings)?;
    let passages = stage.retrieve(&spec, ports, settings).await?;
    let generation = stage.generate(&passages, snapshot, ports, settings).await?;

    if passages.is_empty() {
        return Ok(Accepted {
            generation: Generation {
                text: citations::strip_citations(&generation.text),
                grounded: false,
            },
            passages,
            ungrounded: true,
        });
    }

    match stage.validate(&generation, &passages) {
        Ok(()) => Ok(Accepted {
            passages,
            generation,
            ungrounded: false,
        }),
        Err(violation) => Err(Rejected {
            error: violation.into(),
            partial: Some(Accepted {
                generation: sanitize_generation(&generation, &passages),
                passages,
                ungrounded: true,
            }),
        }),
    }
}

struct Run<'a> {
    orchestrator: &'a Orchestrator,
    ctx: WorkflowContext,
    plan: RunPlan,
    cancel: &'a CancellationToken,
}

impl Run<'_> {
    async fn execute(mut self) -> Result<WorkflowResult, InsightflowError> {
        info!(query = %self.ctx.query(), "Workflow started");
        let started = format!("query: {}", self.ctx.query());
        self.log(LogEntry::workflow("workflow.started", started)).await;

        let stages = self.orchestrator.stages.clone();
        let mut aborted = false;
        for stage in &stages {
            if let StageOutcome::Abort(payload) = self.run_stage(stage.as_ref()).await? {
                self.ctx.set_error(payload);
                aborted = true;
                break;
            }
        }

        let status = if aborted {
            WorkflowStatus::Aborted
        } else {
            self.ctx.derive_final_status()
        };
        self.finish(status).await
    }

    async fn cancel_before_start(mut self) -> Result<WorkflowResult, InsightflowError> {
        let aborted = WorkflowAborted::cancelled(None, self.cancel_reason());
        info!("Workflow cancelled before it started");
        self.ctx.set_error(WorkflowErrorPayload::from(&aborted));
        self.finish(WorkflowStatus::Aborted).await
    }

    async fn finish(mut self, status: WorkflowStatus) -> Result<WorkflowResult, InsightflowError> {
        self.ctx.finish(status)?;
        self.log(LogEntry::workflow("workflow.finished", status.to_string()))
            .await;
        info!(%status, progress = self.ctx.progress(), "Workflow finished");
        Ok(WorkflowResult::from_snapshot(self.ctx.snapshot()))
    }

    fn cancel_reason(&self) -> String {
        self.cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string())
    }

    /// Appends to the log and emits the matching progress event.
    async fn log(&mut self, entry: LogEntry) {
        let entry = self.ctx.append_log(entry).clone();
        let event = ProgressEvent::from_entry(
            self.ctx.run_id(),
            &entry,
            entry.stage.map(|s| self.ctx.status(s)),
            self.ctx.workflow_status(),
            self.ctx.progress(),
        );
        self.orchestrator.sink.emit(&event).await;
    }

    async fn run_stage(&mut self, stage: &dyn Stage) -> Result<StageOutcome, InsightflowError> {
        let role = stage.role();
        let settings = self.plan.settings(role).clone();
        let timer = SpanTimer::start(format!("stage.{role}"));

        self.ctx.begin_stage(role)?;
        let started = format!(
            "model={} temperature={} top_k={}",
            settings.model, settings.temperature, settings.top_k
        );
        self.log(LogEntry::stage(role, "stage.started", started)).await;

        let mut retry = RetryState::new();
        let mut partial: Option<Accepted> = None;
        loop {
            let attempt = self.ctx.increment_attempt(role)?;
            let snapshot = self.ctx.snapshot();
            debug!(stage = %role, attempt, "Running stage attempt");

            let rejected = match self.attempt(stage, &snapshot, &settings).await {
                None => return self.cancel_stage(role).await,
                Some(Ok(accepted)) => return self.merge(stage, &snapshot, accepted, timer).await,
                Some(Err(rejected)) => rejected,
            };

            let Rejected {
                error,
                partial: candidate,
            } = rejected;
            warn!(stage = %role, attempt, kind = error.kind(), "Stage attempt failed: {}", error);
            let detail = format!("attempt {attempt}: {}: {error}", error.kind());
            self.log(LogEntry::stage(role, "stage.attempt_failed", detail)).await;
            if candidate.is_some() {
                partial = candidate;
            }

            match retry.record_failure(error.retry_class(), &self.plan.retry) {
                RetryDecision::Retry(delay) => {
                    if !delay.is_zero() {
                        let detail = format!("retrying in {}ms", delay.as_millis());
                        self.log(LogEntry::stage(role, "stage.retry_scheduled", detail)).await;
                    }
                    let cancelled = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => true,
                        () = tokio::time::sleep(delay) => false,
                    };
                    if cancelled {
                        return self.cancel_stage(role).await;
                    }
                }
                RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                    return self.give_up(stage, partial, &error, timer).await;
                }
            }
        }
    }

    /// Runs one attempt under the stage timeout. `None` means cancelled.
    async fn attempt(
        &self,
        stage: &dyn Stage,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Option<Result<Accepted, Rejected>> {
        let budget_ms = self.plan.stage_timeout_ms;
        let attempt = run_attempt(stage, snapshot, &self.orchestrator.ports, settings);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = tokio::time::timeout(Duration::from_millis(budget_ms), attempt) => {
                Some(result.unwrap_or_else(|_| {
                    Err(StageError::Timeout {
                        stage: stage.role(),
                        after_ms: budget_ms,
                    }
                    .into())
                }))
            }
        }
    }

    async fn merge(
        &mut self,
        stage: &dyn Stage,
        snapshot: &ContextSnapshot,
        accepted: Accepted,
        timer: SpanTimer,
    ) -> Result<StageOutcome, InsightflowError> {
        let role = stage.role();
        let contribution = build_contribution(
            stage,
            &accepted.generation,
            &accepted.passages,
            snapshot,
            accepted.ungrounded,
        );
        let passage_count = accepted.passages.len();
        let cited = contribution.citations.len();
        self.ctx.record_passages(role, accepted.passages)?;

        if accepted.ungrounded {
            self.ctx.degrade_stage(role, contribution)?;
            let degraded = StageDegraded::new(
                role,
                "no passages were retrieved; the contribution is ungrounded",
            );
            warn!(stage = %role, "{degraded}");
            self.log(LogEntry::stage(role, "stage.degraded", degraded.reason))
                .await;
        } else {
            self.ctx.complete_stage(role, contribution)?;
            let detail = format!("{passage_count} passages, {cited} cited");
            self.log(LogEntry::stage(role, "stage.completed", detail)).await;
        }

        info!(stage = %role, duration_ms = timer.finish(), "Stage finished");
        Ok(StageOutcome::Continue)
    }

    async fn give_up(
        &mut self,
        stage: &dyn Stage,
        partial: Option<Accepted>,
        error: &StageError,
        timer: SpanTimer,
    ) -> Result<StageOutcome, InsightflowError> {
        let role = stage.role();
        let reason = format!("{}: {error}", error.kind());

        if let Some(partial) = partial {
            let snapshot = self.ctx.snapshot();
            let contribution =
                build_contribution(stage, &partial.generation, &partial.passages, &snapshot, true);
            self.ctx.record_passages(role, partial.passages)?;
            self.ctx.degrade_stage(role, contribution)?;
            let degraded = StageDegraded::new(role, format!("kept a partial result after {reason}"));
            warn!(stage = %role, duration_ms = timer.finish(), "{degraded}");
            self.log(LogEntry::stage(role, "stage.degraded", degraded.reason))
                .await;
            return Ok(StageOutcome::Continue);
        }

        self.ctx.fail_stage(role)?;
        warn!(stage = %role, duration_ms = timer.finish(), "Stage failed: {reason}");
        self.log(LogEntry::stage(role, "stage.failed", reason.clone()))
            .await;

        if !role.is_critical() {
            return Ok(StageOutcome::Continue);
        }
        let aborted = WorkflowAborted::stage_failed(role, reason);
        self.log(LogEntry::workflow("workflow.aborted", aborted.to_string()))
            .await;
        Ok(StageOutcome::Abort(WorkflowErrorPayload::new(
            error.kind(),
            Some(role),
            aborted.to_string(),
        )))
    }

    async fn cancel_stage(&mut self, role: StageRole) -> Result<StageOutcome, InsightflowError> {
        let reason = self.cancel_reason();
        self.ctx.fail_stage(role)?;
        info!(stage = %role, %reason, "Stage cancelled");
        self.log(LogEntry::stage(role, "stage.cancelled", reason.clone()))
            .await;
        let aborted = WorkflowAborted::cancelled(Some(role), reason);
        Ok(StageOutcome::Abort(WorkflowErrorPayload::from(&aborted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGeneration, ScriptedRetrieval};

    fn ports() -> StagePorts {
        StagePorts::new(
            Arc::new(ScriptedRetrieval::new()),
            Arc::new(ScriptedGeneration::new()),
        )
    }

    #[test]
    fn test_run_plan_applies_options() {
        let options = WorkflowOptions::new()
            .with_model("small-model")
            .with_temperature(StageRole::Reviewer, 0.9)
            .with_max_retries(5)
            .with_per_stage_timeout_ms(1234);
        let plan = RunPlan::new(&EngineConfig::default(), &options);

        assert_eq!(plan.retry.max_attempts(), 6);
        assert_eq!(plan.stage_timeout_ms, 1234);
        assert_eq!(plan.settings(StageRole::Researcher).model, "small-model");
        assert!((plan.settings(StageRole::Reviewer).temperature - 0.9).abs() < f32::EPSILON);
        assert!((plan.settings(StageRole::Researcher).temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_with_stages_requires_full_sequence() {
        let orchestrator = Orchestrator::new(EngineConfig::default(), ports()).unwrap();
        let mut stages = default_stages();
        stages.swap(0, 1);
        assert!(orchestrator.with_stages(stages).is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig::default().with_fan_out(0);
        assert!(Orchestrator::new(config, ports()).is_err());
    }

    #[tokio::test]
    async fn test_invalid_options_are_an_error() {
        let orchestrator = Orchestrator::new(EngineConfig::default(), ports()).unwrap();
        let request = WorkflowRequest::new("q")
            .with_options(WorkflowOptions::new().with_per_stage_timeout_ms(0));
        assert!(matches!(
            orchestrator.run(request).await,
            Err(InsightflowError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orchestrator = Orchestrator::new(EngineConfig::default(), ports()).unwrap();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let result = orchestrator
            .run_with_cancellation(WorkflowRequest::new("q"), &token)
            .await
            .unwrap();
        assert_eq!(result.status, WorkflowStatus::Aborted);
        assert_eq!(result.error.unwrap().kind, "cancelled");
        assert!(result.log.iter().all(|e| e.stage.is_none()));
    }
}
