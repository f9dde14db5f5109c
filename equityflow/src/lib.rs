//! # Equityflow
//!
//! Invocation-control layer for a three-stage equity scenario pipeline.
//!
//! The actual financial math lives behind injected stage traits; this crate
//! provides the concurrency discipline around them:
//!
//! - **Version-stamped invocations**: only the most recently requested
//!   input's result is ever observable; out-of-order completions are
//!   discarded
//! - **Cancellation tokens**: in-flight work made irrelevant by newer input
//!   is aborted, with teardown guarantees
//! - **Stale-while-revalidate state**: callers can distinguish a first load
//!   from a refresh that still has displayable data
//! - **Bounded retry**: per-stage retry with cancellation always exempt
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use equityflow::prelude::*;
//!
//! let pipeline = ScenarioPipeline::builder()
//!     .projection_stage(projection)
//!     .opportunity_stage(opportunity)
//!     .payout_stage(payout)
//!     .retry_policy(true)
//!     .build()?;
//!
//! pipeline.set_input(input);
//! let snapshot = pipeline.snapshot();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod invoker;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod state;
pub mod testing;
pub mod version;


/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelReason, CancellationToken};
    pub use crate::errors::{ConfigError, ErrorKind, StageFailure};
    pub use crate::invoker::{StageInvoker, StageOutcome};
    pub use crate::model::{
        EquityParams, GrowthParams, JobParams, OpportunityCost, PeriodPoint, PerPeriodDataset,
        PipelineInput, ProjectionInput, ScenarioResult,
    };
    pub use crate::orchestrator::{
        PipelinePhase, PipelineResult, ScenarioPipeline, ScenarioPipelineBuilder,
    };
    pub use crate::retry::{RetryDecision, RetryPolicy};
    pub use crate::stages::{OpportunityStage, PayoutStage, ProjectionStage};
    pub use crate::state::StageState;
    pub use crate::version::{InvocationVersion, InvocationVersioner};
}
