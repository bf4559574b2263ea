//! The metered proxy pipeline: one parameterised state machine shared by
//! every API in the catalog.

mod downstream;
mod error;
mod orchestrator;
mod stage;

pub use downstream::{DownstreamClient, DownstreamResponse, OutboundBody};
pub use error::{DownstreamError, PipelineError, PipelineFailure, GENERIC_ERROR_MESSAGE};
pub use orchestrator::{CallOptions, EnvLookup, FundsSummary, Pipeline, ProxyCall, ProxyOutcome};
pub use stage::PipelineStage;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const OUTPUT_IMAGE_CONTENT_TYPE: &str = "image/png";
