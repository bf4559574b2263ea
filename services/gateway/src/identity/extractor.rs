use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AuthenticatedIdentity, IdentityError, IdentitySource, Permissions, AUTHORIZATION_HEADER,
    USER_ID_HEADER,
};
use crate::config::GatewayConfig;

/// Claims of the short-lived token minted by the key-verification middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    pub exp: usize,
}

pub struct IdentityExtractor {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    trust_identity_header: bool,
}

impl IdentityExtractor {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];

        Self {
            decoding_key: config
                .identity_jwt_secret
                .as_ref()
                .map(|secret| DecodingKey::from_secret(secret.as_bytes())),
            validation,
            trust_identity_header: config.trust_identity_header,
        }
    }

    pub fn extract_from_token(&self, token: &str) -> Result<AuthenticatedIdentity, IdentityError> {
        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or(IdentityError::MissingIdentity)?;

        let claims = decode::<IdentityClaims>(token, decoding_key, &self.validation)?.claims;
        let user_id = claims.sub.trim();
        if user_id.is_empty() {
            return Err(IdentityError::EmptySubject);
        }

        let permissions = claims
            .permissions
            .as_deref()
            .map(Permissions::from_claim)
            .unwrap_or(Permissions::Everything);

        debug!(user_id = %user_id, "identity established from token");
        Ok(AuthenticatedIdentity::new(user_id, IdentitySource::Token).with_permissions(permissions))
    }

    /// A bearer token, when present, is authoritative: an invalid token is
    /// never retried against the trusted header.
    pub fn extract_from_request(
        &self,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedIdentity, IdentityError> {
        if self.decoding_key.is_some() {
            if let Some(token) = headers
                .get(AUTHORIZATION_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
            {
                return self.extract_from_token(token.trim()).map_err(|err| {
                    warn!(error = %err, "rejected identity token");
                    err
                });
            }
        }

        if self.trust_identity_header {
            if let Some(user_id) = headers
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                debug!(user_id = %user_id, "identity established from trusted header");
                return Ok(AuthenticatedIdentity::new(user_id, IdentitySource::Header));
            }
        }

        Err(IdentityError::MissingIdentity)
    }
}

/// Mints an identity token the way the key-verification middleware does.
pub fn mint_token(
    secret: &str,
    user_id: &str,
    permissions: Option<Vec<String>>,
    ttl: Duration,
) -> Result<String, IdentityError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|err| IdentityError::InvalidToken(err.to_string()))?;
    let claims = IdentityClaims {
        sub: user_id.to_string(),
        permissions,
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}
