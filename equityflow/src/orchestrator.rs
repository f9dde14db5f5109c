//! The pipeline orchestrator.
//!
//! [`ScenarioPipeline`] sequences the three stage invokers so that stage N+1
//! consumes stage N's output, re-runs the whole chain whenever the input set
//! changes, and exposes the aggregated pending/fetching/error state. Only the
//! most recently requested input's result is ever observable: any newer input
//! cancels in-flight work and out-of-order completions are discarded by
//! version comparison.

use crate::cancellation::CancelReason;
use crate::errors::{ConfigError, ErrorKind};
use crate::invoker::{StageInvoker, StageOutcome};
use crate::model::{
    OpportunityCost, PerPeriodDataset, PipelineInput, ProjectionInput, ScenarioResult,
};
use crate::retry::RetryPolicy;
use crate::stages::{OpportunityStage, PayoutStage, ProjectionStage};
use crate::state::StageState;
use crate::version::{InvocationVersion, InvocationVersioner};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Where the pipeline currently is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// No valid input has been supplied.
    Idle,
    /// Stage 1 (projection) is running.
    Projecting,
    /// Stage 2 (opportunity cost) is running.
    Evaluating,
    /// Stage 3 (payout) is running.
    Settling,
    /// The chain settled with a result.
    Complete,
    /// The chain settled with a surfaced error.
    Failed,
}

impl PipelinePhase {
    /// Returns true while any stage of the chain is running.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Projecting | Self::Evaluating | Self::Settling)
    }
}

/// Read-only aggregate snapshot of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// All input groups are present and individually well-formed.
    pub has_valid_data: bool,
    /// Current phase of the chain.
    pub phase: PipelinePhase,
    /// Any stage is awaiting its first-ever result.
    pub is_pending: bool,
    /// Any stage is refreshing while previous data is still held.
    pub is_fetching: bool,
    /// Any stage is pending or fetching.
    pub is_calculating: bool,
    /// First surfaced error across stages, in stage order.
    pub error: Option<ErrorKind>,
    /// User-facing error type string, absent for `Cancelled`.
    pub error_type: Option<&'static str>,
    /// Stage 1 data, for progressive display.
    pub projection: Option<PerPeriodDataset>,
    /// Stage 2 data, for progressive display.
    pub opportunity: Option<OpportunityCost>,
    /// The final scenario outcome.
    pub result: Option<ScenarioResult>,
    /// When the chain last settled (completed or failed).
    pub settled_at: Option<DateTime<Utc>>,
}

impl PipelineResult {
    /// Serializes the snapshot for a UI boundary.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One stage's state cell plus its invocation machinery.
struct StageCell<T> {
    state: Mutex<StageState<T>>,
    invoker: StageInvoker,
}

impl<T> StageCell<T> {
    fn new(name: &'static str, retry: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(StageState::new()),
            invoker: StageInvoker::new(name, retry),
        }
    }
}

struct PipelineInner {
    id: Uuid,
    versions: InvocationVersioner,
    input: Mutex<PipelineInput>,
    phase: Mutex<PipelinePhase>,
    settled_at: Mutex<Option<DateTime<Utc>>>,
    projection: StageCell<PerPeriodDataset>,
    opportunity: StageCell<OpportunityCost>,
    scenario: StageCell<ScenarioResult>,
    projection_stage: Arc<dyn ProjectionStage>,
    opportunity_stage: Arc<dyn OpportunityStage>,
    payout_stage: Arc<dyn PayoutStage>,
}

impl PipelineInner {
    fn cancel_all(&self, reason: CancelReason) {
        self.projection.invoker.cancel_active(reason);
        self.opportunity.invoker.cancel_active(reason);
        self.scenario.invoker.cancel_active(reason);
    }

    /// Clears in-flight flags and errors on every stage, retaining data.
    fn interrupt_all(&self) {
        self.projection.state.lock().interrupt();
        self.opportunity.state.lock().interrupt();
        self.scenario.state.lock().interrupt();
    }

    fn clear_all(&self) {
        self.projection.state.lock().clear();
        self.opportunity.state.lock().clear();
        self.scenario.state.lock().clear();
    }

    /// Moves to `phase` if `version` is still current.
    fn enter_phase(&self, version: InvocationVersion, phase: PipelinePhase) -> bool {
        if self.versions.is_current(version) {
            *self.phase.lock() = phase;
            true
        } else {
            false
        }
    }

    fn settle(&self, version: InvocationVersion, phase: PipelinePhase) {
        if self.versions.is_current(version) {
            *self.phase.lock() = phase;
            *self.settled_at.lock() = Some(Utc::now());
        }
    }
}

/// Invocation-control layer over the three-stage scenario computation.
///
/// Owns the versioner, the per-stage state, and the in-flight cancellation
/// tokens. Dropping the pipeline cancels all outstanding tokens so orphaned
/// completions never run abort hooks after the consumer is gone.
pub struct ScenarioPipeline {
    inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for ScenarioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioPipeline")
            .field("id", &self.inner.id)
            .field("phase", &*self.inner.phase.lock())
            .finish()
    }
}

impl ScenarioPipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> ScenarioPipelineBuilder {
        ScenarioPipelineBuilder::new()
    }

    /// Returns the pipeline's identity, as used in log fields.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> PipelinePhase {
        *self.inner.phase.lock()
    }

    /// The input-change event: replaces the input set and re-triggers the
    /// chain.
    ///
    /// A valid input cancels in-flight work and restarts from stage 1,
    /// retaining prior stage data so callers can keep displaying it while the
    /// refresh runs. An invalid input clears all stage state and parks the
    /// pipeline in [`PipelinePhase::Idle`].
    ///
    /// Must be called from within a tokio runtime: the chain runs as a
    /// spawned task.
    pub fn set_input(&self, input: PipelineInput) {
        let inner = &self.inner;
        let captured = input.captured();
        *inner.input.lock() = input;

        // Invalidate whatever is in flight before anything else; a late
        // completion must already be stale by the time we touch state.
        let version = inner.versions.next();
        inner.cancel_all(CancelReason::Superseded);
        *inner.settled_at.lock() = None;

        match captured {
            None => {
                tracing::debug!(pipeline = %inner.id, %version, "input invalid, going idle");
                inner.clear_all();
                *inner.phase.lock() = PipelinePhase::Idle;
            }
            Some(projection_input) => {
                tracing::debug!(pipeline = %inner.id, %version, "input replaced, restarting chain");
                inner.interrupt_all();
                *inner.phase.lock() = PipelinePhase::Projecting;
                tokio::spawn(run_chain(inner.clone(), version, projection_input));
            }
        }
    }

    /// Restarts the chain from stage 1 with the current input.
    ///
    /// Cancels any active tokens, clears all stage state (including retained
    /// data), and allocates a fresh version. A no-op when the current input
    /// is invalid.
    pub fn retry(&self) {
        let inner = &self.inner;
        let Some(projection_input) = inner.input.lock().captured() else {
            tracing::debug!(pipeline = %inner.id, "retry ignored: input invalid");
            return;
        };

        let version = inner.versions.next();
        inner.cancel_all(CancelReason::Retry);
        inner.clear_all();
        *inner.settled_at.lock() = None;
        *inner.phase.lock() = PipelinePhase::Projecting;

        tracing::debug!(pipeline = %inner.id, %version, "retrying chain from stage 1");
        tokio::spawn(run_chain(inner.clone(), version, projection_input));
    }

    /// Manually aborts whatever is in flight.
    ///
    /// If the cancelled call is still current when it settles, `Cancelled`
    /// is surfaced as the error so the caller can reflect it.
    pub fn cancel(&self) {
        tracing::debug!(pipeline = %self.inner.id, "manual cancel requested");
        self.inner.cancel_all(CancelReason::UserRequested);
    }

    /// Takes a read-only aggregate snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PipelineResult {
        let inner = &self.inner;
        let projection = inner.projection.state.lock().clone();
        let opportunity = inner.opportunity.state.lock().clone();
        let scenario = inner.scenario.state.lock().clone();

        let is_pending =
            projection.is_pending || opportunity.is_pending || scenario.is_pending;
        let is_fetching =
            projection.is_fetching || opportunity.is_fetching || scenario.is_fetching;
        let error = projection
            .error
            .or(opportunity.error)
            .or(scenario.error);

        PipelineResult {
            has_valid_data: inner.input.lock().is_complete(),
            phase: *inner.phase.lock(),
            is_pending,
            is_fetching,
            is_calculating: is_pending || is_fetching,
            error,
            error_type: error.and_then(ErrorKind::user_facing_type),
            projection: projection.data,
            opportunity: opportunity.data,
            result: scenario.data,
            settled_at: *inner.settled_at.lock(),
        }
    }
}

impl Drop for ScenarioPipeline {
    fn drop(&mut self) {
        // Teardown: nothing outstanding may mutate state or run abort hooks
        // after the consumer is gone.
        self.inner.versions.next();
        self.inner.cancel_all(CancelReason::Teardown);
    }
}

/// Runs one full chain for a captured input, honoring version currency at
/// every boundary.
async fn run_chain(
    inner: Arc<PipelineInner>,
    version: InvocationVersion,
    input: ProjectionInput,
) {
    if !inner.enter_phase(version, PipelinePhase::Projecting) {
        return;
    }
    let stage = inner.projection_stage.clone();
    let stage_input = input.clone();
    let outcome = inner
        .projection
        .invoker
        .invoke(&inner.versions, version, &inner.projection.state, move |token| {
            let stage = stage.clone();
            let stage_input = stage_input.clone();
            async move { stage.project(&stage_input, &token).await }.boxed()
        })
        .await;
    let dataset = match outcome {
        StageOutcome::Completed(dataset) => dataset,
        StageOutcome::Failed(kind) => {
            tracing::debug!(pipeline = %inner.id, %version, %kind, "chain failed at projection");
            inner.settle(version, PipelinePhase::Failed);
            return;
        }
        StageOutcome::Discarded => return,
    };

    if !inner.enter_phase(version, PipelinePhase::Evaluating) {
        return;
    }
    let stage = inner.opportunity_stage.clone();
    let outcome = inner
        .opportunity
        .invoker
        .invoke(&inner.versions, version, &inner.opportunity.state, move |token| {
            let stage = stage.clone();
            let dataset = dataset.clone();
            async move { stage.evaluate(&dataset, &token).await }.boxed()
        })
        .await;
    let cost = match outcome {
        StageOutcome::Completed(cost) => cost,
        StageOutcome::Failed(kind) => {
            tracing::debug!(pipeline = %inner.id, %version, %kind, "chain failed at opportunity");
            inner.settle(version, PipelinePhase::Failed);
            return;
        }
        StageOutcome::Discarded => return,
    };

    if !inner.enter_phase(version, PipelinePhase::Settling) {
        return;
    }
    let stage = inner.payout_stage.clone();
    let equity = input.equity.clone();
    let outcome = inner
        .scenario
        .invoker
        .invoke(&inner.versions, version, &inner.scenario.state, move |token| {
            let stage = stage.clone();
            let cost = cost.clone();
            let equity = equity.clone();
            async move { stage.settle(&cost, &equity, &token).await }.boxed()
        })
        .await;
    match outcome {
        StageOutcome::Completed(_) => {
            tracing::debug!(pipeline = %inner.id, %version, "chain complete");
            inner.settle(version, PipelinePhase::Complete);
        }
        StageOutcome::Failed(kind) => {
            tracing::debug!(pipeline = %inner.id, %version, %kind, "chain failed at payout");
            inner.settle(version, PipelinePhase::Failed);
        }
        StageOutcome::Discarded => {}
    }
}

/// Builder for [`ScenarioPipeline`].
#[derive(Default)]
pub struct ScenarioPipelineBuilder {
    projection: Option<Arc<dyn ProjectionStage>>,
    opportunity: Option<Arc<dyn OpportunityStage>>,
    payout: Option<Arc<dyn PayoutStage>>,
    retry: RetryPolicy,
}

impl ScenarioPipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage 1 implementation.
    #[must_use]
    pub fn projection_stage(mut self, stage: Arc<dyn ProjectionStage>) -> Self {
        self.projection = Some(stage);
        self
    }

    /// Sets the stage 2 implementation.
    #[must_use]
    pub fn opportunity_stage(mut self, stage: Arc<dyn OpportunityStage>) -> Self {
        self.opportunity = Some(stage);
        self
    }

    /// Sets the stage 3 implementation.
    #[must_use]
    pub fn payout_stage(mut self, stage: Arc<dyn PayoutStage>) -> Self {
        self.payout = Some(stage);
        self
    }

    /// Sets the retry policy applied to every stage invocation.
    #[must_use]
    pub fn retry_policy(mut self, retry: impl Into<RetryPolicy>) -> Self {
        self.retry = retry.into();
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingStage`] if any stage implementation was
    /// not supplied.
    pub fn build(self) -> Result<ScenarioPipeline, ConfigError> {
        let projection_stage = self
            .projection
            .ok_or(ConfigError::MissingStage("projection"))?;
        let opportunity_stage = self
            .opportunity
            .ok_or(ConfigError::MissingStage("opportunity"))?;
        let payout_stage = self.payout.ok_or(ConfigError::MissingStage("payout"))?;

        let retry = self.retry;
        Ok(ScenarioPipeline {
            inner: Arc::new(PipelineInner {
                id: Uuid::new_v4(),
                versions: InvocationVersioner::new(),
                input: Mutex::new(PipelineInput::empty()),
                phase: Mutex::new(PipelinePhase::Idle),
                settled_at: Mutex::new(None),
                projection: StageCell::new("projection", retry),
                opportunity: StageCell::new("opportunity", retry),
                scenario: StageCell::new("payout", retry),
                projection_stage,
                opportunity_stage,
                payout_stage,
            }),
        })
    }
}
