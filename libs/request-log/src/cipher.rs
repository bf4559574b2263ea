use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CipherError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// What to do when a caller asks for encrypted logging but no key is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncryptionPolicy {
    /// Refuse the call before any funds are reserved.
    #[default]
    Reject,
    /// Store the payload in plaintext and log a warning.
    Plaintext,
}

impl FromStr for EncryptionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(EncryptionPolicy::Reject),
            "plaintext" => Ok(EncryptionPolicy::Plaintext),
            other => Err(format!(
                "unknown encryption policy '{other}', expected 'reject' or 'plaintext'"
            )),
        }
    }
}

impl fmt::Display for EncryptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionPolicy::Reject => f.write_str("reject"),
            EncryptionPolicy::Plaintext => f.write_str("plaintext"),
        }
    }
}

/// Stored form of an encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub nonce: String,
    pub data: String,
}

/// AES-256-GCM transform applied to logged payloads.
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCipher").finish_non_exhaustive()
    }
}

impl PayloadCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let key: [u8; KEY_LEN] = *key;
        let key = key.into();
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Builds a cipher from a 64 character hex key.
    pub fn from_hex(key: &str) -> Result<Self, CipherError> {
        let key = key.trim();
        if key.len() != KEY_LEN * 2 {
            return Err(CipherError::InvalidKey(
                "key must be 64 hex characters (32 bytes)".into(),
            ));
        }
        let bytes = hex::decode(key).map_err(|err| CipherError::InvalidKey(err.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidKey("key must be 32 bytes".into()))?;
        Ok(Self::new(&key))
    }

    pub fn encrypt(&self, payload: &Value) -> Result<EncryptedPayload, CipherError> {
        let plaintext =
            serde_json::to_vec(payload).map_err(|err| CipherError::Encoding(err.to_string()))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| CipherError::Encrypt)?;

        Ok(EncryptedPayload {
            nonce: general_purpose::STANDARD.encode(nonce),
            data: general_purpose::STANDARD.encode(ciphertext),
        })
    }

    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Value, CipherError> {
        let nonce = general_purpose::STANDARD
            .decode(&payload.nonce)
            .map_err(|err| CipherError::Encoding(err.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::Encoding(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let ciphertext = general_purpose::STANDARD
            .decode(&payload.data)
            .map_err(|err| CipherError::Encoding(err.to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|err| CipherError::Encoding(err.to_string()))
    }
}
