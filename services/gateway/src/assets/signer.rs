use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::AssetError;

type HmacSha256 = Hmac<Sha256>;

const MIN_KEY_LEN: usize = 32;

/// Issues and checks `expires`/`signature` query pairs for asset links.
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: &str) -> Result<Self, AssetError> {
        if secret.trim().is_empty() {
            return Err(AssetError::SigningKey("secret cannot be empty".into()));
        }

        let decoded = general_purpose::STANDARD
            .decode(secret)
            .unwrap_or_else(|_| secret.as_bytes().to_vec());
        if decoded.len() < MIN_KEY_LEN {
            return Err(AssetError::SigningKey(
                "signing key must be at least 32 bytes".into(),
            ));
        }

        Ok(Self { key: decoded })
    }

    /// Per-process key; links stop verifying after a restart.
    pub fn generate() -> Self {
        let mut key = vec![0u8; MIN_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    fn mac(&self, path: &str, expires: i64) -> Result<HmacSha256, AssetError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|err| AssetError::SigningKey(err.to_string()))?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, path: &str, expires: i64) -> Result<String, AssetError> {
        let signature = self
            .mac(path, expires)
            .map_err(|err| AssetError::Sign(err.to_string()))?
            .finalize()
            .into_bytes();
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(signature))
    }

    /// The signature is checked before the expiry so a tampered expiry is
    /// reported as a bad signature.
    pub fn verify(
        &self,
        path: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), AssetError> {
        let decoded = general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AssetError::InvalidSignature)?;

        self.mac(path, expires)?
            .verify_slice(&decoded)
            .map_err(|_| AssetError::InvalidSignature)?;

        if now > expires {
            return Err(AssetError::Expired);
        }
        Ok(())
    }
}
