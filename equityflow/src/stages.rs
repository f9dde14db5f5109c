//! External stage contracts.
//!
//! The three remote computations are injected behind async traits. Each call
//! receives a [`CancellationToken`] and must fail with
//! [`StageFailure::Aborted`] when the token fires after the call starts.
//! The financial math behind these traits is out of scope for this crate.

use crate::cancellation::CancellationToken;
use crate::errors::StageFailure;
use crate::model::{
    EquityParams, OpportunityCost, PerPeriodDataset, ProjectionInput, ScenarioResult,
};
use async_trait::async_trait;

/// Stage 1: projects the offer into a per-period dataset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectionStage: Send + Sync {
    /// Runs the projection for a captured input set.
    async fn project(
        &self,
        input: &ProjectionInput,
        token: &CancellationToken,
    ) -> Result<PerPeriodDataset, StageFailure>;
}

/// Stage 2: derives the opportunity cost from the projection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OpportunityStage: Send + Sync {
    /// Evaluates the opportunity cost of the projected periods.
    async fn evaluate(
        &self,
        dataset: &PerPeriodDataset,
        token: &CancellationToken,
    ) -> Result<OpportunityCost, StageFailure>;
}

/// Stage 3: settles the final scenario outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutStage: Send + Sync {
    /// Nets the payout against the opportunity cost for the grant.
    async fn settle(
        &self,
        cost: &OpportunityCost,
        equity: &EquityParams,
        token: &CancellationToken,
    ) -> Result<ScenarioResult, StageFailure>;
}
