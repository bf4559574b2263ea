use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing identity: no bearer token or trusted user header")]
    MissingIdentity,

    #[error("Invalid identity token: {0}")]
    InvalidToken(String),

    #[error("Identity token has an empty subject")]
    EmptySubject,

    #[error("Key is not permitted to call {0}")]
    Forbidden(String),
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        IdentityError::InvalidToken(err.to_string())
    }
}
