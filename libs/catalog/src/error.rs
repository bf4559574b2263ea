use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unable to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid definition for API {api_id}: {reason}")]
    InvalidDefinition { api_id: String, reason: String },
    #[error("API {0} not found")]
    NotFound(String),
    #[error("API {0} is not enabled")]
    Disabled(String),
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
    #[error("API {0} has no downstream endpoint configured")]
    MissingEndpoint(String),
    #[error("API {0} is not implemented yet")]
    NotImplemented(String),
}
