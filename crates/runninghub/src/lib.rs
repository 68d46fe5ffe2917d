//! Client for the RunningHub job-processing API.
//!
//! RunningHub runs hosted AI applications identified by an app id.
//! A job is submitted as a list of `(nodeId, fieldName, fieldValue)`
//! triples, then polled until it reports a terminal status. Status
//! payloads arrive in two incompatible wire shapes; [`response`]
//! normalizes both into one canonical form so callers never branch on
//! the shape.

pub mod apps;
pub mod client;
pub mod poller;
pub mod response;

pub use apps::{build_node_inputs, AppConfig, FieldType, JobParams, NodeBinding};
pub use client::{JobApi, RunningHubClient, RunningHubConfig, RunningHubError, SubmitResponse};
pub use poller::{wait_for_completion, PollConfig, PollObserver, PollOutcome};
pub use response::{first_output_url, normalize_status, NormalizedStatus, RemoteStatus, TaskUsage};
