//! Domain data model for the equity scenario pipeline.
//!
//! The pipeline input is the union of three parameter groups supplied
//! incrementally by the user (typing, sliders); each group is optional until
//! provided. The stage outputs are opaque to the control layer beyond their
//! shapes: the actual financial math lives behind the stage traits.

use serde::{Deserialize, Serialize};

/// Compensation parameters for the offer being evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Annual base salary of the offer.
    pub base_salary: f64,
    /// Annual salary of the comparison (market) position.
    pub market_salary: f64,
    /// Evaluation horizon in months.
    pub horizon_months: u32,
}

impl JobParams {
    /// Returns true if the group is individually well-formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.base_salary.is_finite()
            && self.base_salary > 0.0
            && self.market_salary.is_finite()
            && self.market_salary > 0.0
            && self.horizon_months > 0
    }
}

/// Equity grant parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityParams {
    /// Number of shares in the grant.
    pub grant_shares: f64,
    /// Strike price per share.
    pub strike_price: f64,
    /// Last preferred price per share.
    pub preferred_price: f64,
    /// Total vesting length in months.
    pub vesting_months: u32,
    /// Cliff length in months.
    pub cliff_months: u32,
}

impl EquityParams {
    /// Returns true if the group is individually well-formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.grant_shares.is_finite()
            && self.grant_shares > 0.0
            && self.strike_price.is_finite()
            && self.strike_price >= 0.0
            && self.preferred_price.is_finite()
            && self.preferred_price > 0.0
            && self.vesting_months > 0
            && self.cliff_months <= self.vesting_months
    }
}

/// Growth and dilution assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    /// Assumed annual company growth rate (e.g. 0.3 for 30%).
    pub annual_growth_rate: f64,
    /// Fractional dilution applied per funding round.
    pub dilution_per_round: f64,
    /// Expected number of future funding rounds over the horizon.
    pub expected_rounds: u32,
}

impl GrowthParams {
    /// Returns true if the group is individually well-formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.annual_growth_rate.is_finite()
            && self.annual_growth_rate > -1.0
            && self.dilution_per_round.is_finite()
            && (0.0..1.0).contains(&self.dilution_per_round)
    }
}

/// The union of all parameter groups required to run the pipeline.
///
/// Groups are optional until the user has supplied them; the pipeline only
/// runs once every group is present and individually well-formed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    /// Compensation group.
    pub job: Option<JobParams>,
    /// Equity grant group.
    pub equity: Option<EquityParams>,
    /// Growth assumption group.
    pub growth: Option<GrowthParams>,
}

impl PipelineInput {
    /// Creates an input with all groups present.
    #[must_use]
    pub fn new(job: JobParams, equity: EquityParams, growth: GrowthParams) -> Self {
        Self {
            job: Some(job),
            equity: Some(equity),
            growth: Some(growth),
        }
    }

    /// Creates an input with no groups supplied yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Captures an immutable stage-1 input if every group is present and
    /// well-formed.
    #[must_use]
    pub fn captured(&self) -> Option<ProjectionInput> {
        let job = self.job.as_ref().filter(|g| g.is_well_formed())?;
        let equity = self.equity.as_ref().filter(|g| g.is_well_formed())?;
        let growth = self.growth.as_ref().filter(|g| g.is_well_formed())?;
        Some(ProjectionInput {
            job: job.clone(),
            equity: equity.clone(),
            growth: growth.clone(),
        })
    }

    /// Returns true if all groups are present and individually well-formed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.captured().is_some()
    }
}

/// Immutable snapshot of a complete input set, as handed to stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionInput {
    /// Compensation group.
    pub job: JobParams,
    /// Equity grant group.
    pub equity: EquityParams,
    /// Growth assumption group.
    pub growth: GrowthParams,
}

/// One period of the projected comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPoint {
    /// Month index, starting at 1.
    pub month: u32,
    /// Cumulative cash compensation delta for this period.
    pub cash: f64,
    /// Value of equity vested through this period.
    pub vested_equity_value: f64,
}

/// Stage 1 output: the per-period projection over the horizon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerPeriodDataset {
    /// Projection points in period order.
    pub points: Vec<PeriodPoint>,
}

impl PerPeriodDataset {
    /// Number of projected periods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the projection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Stage 2 output: the opportunity cost of taking the offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCost {
    /// Opportunity cost per period, aligned with the projection.
    pub per_period: Vec<f64>,
    /// Total opportunity cost over the horizon.
    pub total: f64,
}

/// Stage 3 output: the final scenario outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Net payout of the scenario at the horizon.
    pub payout: f64,
    /// Human-readable breakeven description ("month 18", "never", ...).
    pub breakeven_label: String,
    /// Total opportunity cost the payout was netted against.
    pub opportunity_cost_total: f64,
}
