//! Scripted stage implementations and fixtures for tests.
//!
//! Each scripted stage pops one pre-queued response per call, records call
//! counts, and can be gated so a call stays in flight until the test releases
//! it (or until its cancellation token fires).

use crate::cancellation::CancellationToken;
use crate::errors::StageFailure;
use crate::model::{
    EquityParams, GrowthParams, JobParams, OpportunityCost, PeriodPoint, PerPeriodDataset,
    PipelineInput, ProjectionInput, ScenarioResult,
};
use crate::stages::{OpportunityStage, PayoutStage, ProjectionStage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared scripting core for the three stage mocks.
#[derive(Debug)]
pub struct ScriptedStage<T> {
    responses: Mutex<VecDeque<Result<T, StageFailure>>>,
    calls: AtomicUsize,
    aborted: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    ignore_cancel: AtomicBool,
}

impl<T> Default for ScriptedStage<T> {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
            gate: Mutex::new(None),
            ignore_cancel: AtomicBool::new(false),
        }
    }
}

impl<T: Clone + Send> ScriptedStage<T> {
    /// Creates an unscripted stage; unscripted calls fail generically.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_ok(&self, value: T) {
        self.responses.lock().push_back(Ok(value));
    }

    /// Queues a remote failure with a message.
    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(StageFailure::remote(message)));
    }

    /// Installs a gate; every subsequent call waits until [`Self::release`]
    /// or cancellation.
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Removes the gate for future calls.
    pub fn ungate(&self) {
        *self.gate.lock() = None;
    }

    /// Releases one gated call.
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    /// Makes the stage ignore its cancellation token, simulating a remote
    /// call whose response arrives despite the abort.
    pub fn ignore_cancellation(&self) {
        self.ignore_cancel.store(true, Ordering::SeqCst);
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that observed cancellation and aborted.
    #[must_use]
    pub fn aborted_count(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Runs one scripted call: pop the response, wait on the gate, observe
    /// the token, answer.
    pub async fn next(&self, token: &CancellationToken) -> Result<T, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StageFailure::remote("unscripted call")));

        let gate = self.gate.lock().clone();
        let honor_cancel = !self.ignore_cancel.load(Ordering::SeqCst);

        if let Some(gate) = gate {
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            token.on_cancel(move |_| {
                let _ = tx.send(());
            });

            if honor_cancel {
                tokio::select! {
                    () = gate.notified() => {}
                    _ = rx => {
                        self.aborted.fetch_add(1, Ordering::SeqCst);
                        return Err(StageFailure::Aborted);
                    }
                }
            } else {
                gate.notified().await;
            }
        }

        if honor_cancel && token.is_cancelled() {
            self.aborted.fetch_add(1, Ordering::SeqCst);
            return Err(StageFailure::Aborted);
        }

        response
    }
}

/// Scripted stage 1 implementation.
#[derive(Debug, Default)]
pub struct ScriptedProjection {
    inner: ScriptedStage<PerPeriodDataset>,
}

impl ScriptedProjection {
    /// Creates an unscripted projection stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for ScriptedProjection {
    type Target = ScriptedStage<PerPeriodDataset>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl ProjectionStage for ScriptedProjection {
    async fn project(
        &self,
        _input: &ProjectionInput,
        token: &CancellationToken,
    ) -> Result<PerPeriodDataset, StageFailure> {
        self.inner.next(token).await
    }
}

/// Scripted stage 2 implementation.
#[derive(Debug, Default)]
pub struct ScriptedOpportunity {
    inner: ScriptedStage<OpportunityCost>,
}

impl ScriptedOpportunity {
    /// Creates an unscripted opportunity stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for ScriptedOpportunity {
    type Target = ScriptedStage<OpportunityCost>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl OpportunityStage for ScriptedOpportunity {
    async fn evaluate(
        &self,
        _dataset: &PerPeriodDataset,
        token: &CancellationToken,
    ) -> Result<OpportunityCost, StageFailure> {
        self.inner.next(token).await
    }
}

/// Scripted stage 3 implementation.
#[derive(Debug, Default)]
pub struct ScriptedPayout {
    inner: ScriptedStage<ScenarioResult>,
}

impl ScriptedPayout {
    /// Creates an unscripted payout stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for ScriptedPayout {
    type Target = ScriptedStage<ScenarioResult>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl PayoutStage for ScriptedPayout {
    async fn settle(
        &self,
        _cost: &OpportunityCost,
        _equity: &EquityParams,
        token: &CancellationToken,
    ) -> Result<ScenarioResult, StageFailure> {
        self.inner.next(token).await
    }
}

/// A complete, well-formed pipeline input.
#[must_use]
pub fn complete_input() -> PipelineInput {
    PipelineInput::new(
        JobParams {
            base_salary: 160_000.0,
            market_salary: 185_000.0,
            horizon_months: 48,
        },
        EquityParams {
            grant_shares: 20_000.0,
            strike_price: 1.8,
            preferred_price: 9.5,
            vesting_months: 48,
            cliff_months: 12,
        },
        GrowthParams {
            annual_growth_rate: 0.25,
            dilution_per_round: 0.12,
            expected_rounds: 2,
        },
    )
}

/// A small projection dataset tagged by `seed` for telling runs apart.
#[must_use]
pub fn dataset(seed: u32) -> PerPeriodDataset {
    PerPeriodDataset {
        points: vec![PeriodPoint {
            month: seed,
            cash: f64::from(seed) * -1_000.0,
            vested_equity_value: f64::from(seed) * 2_000.0,
        }],
    }
}

/// An opportunity cost tagged by `seed`.
#[must_use]
pub fn cost(seed: u32) -> OpportunityCost {
    OpportunityCost {
        per_period: vec![f64::from(seed)],
        total: f64::from(seed) * 100.0,
    }
}

/// A scenario result tagged by `seed`.
#[must_use]
pub fn scenario(seed: u32) -> ScenarioResult {
    ScenarioResult {
        payout: f64::from(seed) * 10_000.0,
        breakeven_label: format!("month {seed}"),
        opportunity_cost_total: f64::from(seed) * 100.0,
    }
}
