//! Polling ingestion service: fetch, filter, deduplicate, count.

pub mod filter;
pub mod polling;
pub mod service;
pub mod shutdown;
pub mod sink;
pub mod stats;

pub use filter::{matches, FilterEvaluator};
pub use polling::{PollState, PollingLoop, ServiceState};
pub use service::{ServiceStatus, StreamSettings, StreamingService};
pub use shutdown::{wait_for_termination, CancellationToken};
pub use sink::{DeduplicatingSink, SaveResult};
pub use stats::{StatsRegister, StatsSnapshot, TickTally};
