pub mod aggregate;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod watchlist;

pub use pipeline::{PipelineError, TimeWindow};
pub use report::{ReportGenerator, Sheet};
