//! Sequential pipeline orchestration.
//!
//! [`controller::PipelineController`] owns the start/cancel contracts
//! and the detached step loop; [`runners`] build per-step inputs;
//! [`executor::StepExecutor`] drives one remote job end to end. All
//! persisted state flows through the [`store::PipelineStore`] seam --
//! the request path and the background loop communicate only through
//! it, never through shared memory.

pub mod artifacts;
pub mod controller;
pub mod executor;
pub mod fetch;
pub mod pg;
pub mod runners;
pub mod store;
pub mod webhook;

pub use controller::{PipelineController, StartError, StartOptions};
pub use executor::{ExecuteError, StepExecutor, TIMED_OUT_MESSAGE};
pub use fetch::{AssetFetcher, FetchError, FsHttpFetcher};
pub use pg::PgStore;
pub use runners::{PrepareError, StepPlan, StepRegistry, StepRunner};
pub use store::{PipelineStore, StoreError};
pub use webhook::{apply_remote_update, WebhookOutcome};
