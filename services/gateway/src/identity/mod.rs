mod context;
mod error;
mod extractor;

pub use context::{AuthenticatedIdentity, Permissions};
pub use error::IdentityError;
pub use extractor::{mint_token, IdentityClaims, IdentityExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Token,
    Header,
}

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Permission sentinel granting access to every API in the catalog.
pub const EVERYTHING_PERMISSION: &str = "everything";
