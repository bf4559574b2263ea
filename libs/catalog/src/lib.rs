//! API catalog and pricing for the Request Directory gateway.
//!
//! The catalog is a static TOML file describing every proxied downstream API:
//! its enablement, required environment, downstream endpoint, request
//! encoding, declared inputs/outputs and pricing. Pricing resolves to a
//! [`CostModel`] that turns a measured call duration into an actual charge.

pub mod catalog;
pub mod cost;
pub mod credits;
pub mod definition;
pub mod error;

pub use catalog::{Catalog, ResolvedApi};
pub use cost::{duration_proportional_cost, CostEstimator, CostModel, Estimate};
pub use credits::{Credits, CREDIT_SCALE};
pub use definition::{
    ApiDefinition, InputField, OutputField, PricingSpec, RequestEncoding, RequestSpec,
    DEFAULT_UPLOAD_FIELD, IMAGE_FIELD_TYPE,
};
pub use error::CatalogError;

pub const DEFAULT_CATALOG_FILENAME: &str = "config.toml";
