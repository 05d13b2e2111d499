// Session Sealing
// Authenticated encryption of the session record into a cookie-safe string

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::AuthError;
use super::session::SessionRecord;

/// Format version, first byte of the sealed payload. Reserved for key or
/// format rotation.
const SEAL_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Seals session records into opaque, tamper-evident strings and reverses
/// the operation. The trust root of the session subsystem: the browser only
/// ever holds output of `seal`, and the server trusts cookie content only
/// after `unseal` authenticates it.
///
/// Wire format: `base64url(version || nonce || aes-256-gcm ciphertext)`,
/// URL-safe without padding so the value can be used directly as a cookie
/// value.
pub struct SessionCodec {
    cipher: Aes256Gcm,
}

impl SessionCodec {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Derive the sealing key from the configured secret string.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }

    /// Seal a session record. Fails only on serialization error; encryption
    /// with a fresh random nonce cannot fail for inputs of this size.
    pub fn seal(&self, record: &SessionRecord) -> Result<String, AuthError> {
        let plaintext = serde_json::to_vec(record)?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| AuthError::InvalidSession)?;

        let mut payload = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        payload.push(SEAL_VERSION);
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Unseal a cookie value. Malformed encoding, unknown version, failed
    /// authentication (tampering or wrong key) and an expired embedded
    /// refresh-token lifetime all collapse to `InvalidSession`; callers must
    /// treat that identically to an absent session. The GCM tag check is
    /// constant-time.
    pub fn unseal(&self, sealed: &str) -> Result<SessionRecord, AuthError> {
        let payload = URL_SAFE_NO_PAD.decode(sealed).map_err(|_| {
            debug!("session cookie is not valid base64url");
            AuthError::InvalidSession
        })?;

        if payload.len() < 1 + NONCE_LEN + 16 || payload[0] != SEAL_VERSION {
            debug!("session cookie payload malformed or unknown version");
            return Err(AuthError::InvalidSession);
        }

        let nonce = Nonce::from_slice(&payload[1..1 + NONCE_LEN]);
        let ciphertext = &payload[1 + NONCE_LEN..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AuthError::InvalidSession)?;

        let record: SessionRecord =
            serde_json::from_slice(&plaintext).map_err(|_| AuthError::InvalidSession)?;

        if record.is_expired(Utc::now()) {
            debug!("sealed session past its refresh token expiry");
            return Err(AuthError::InvalidSession);
        }

        Ok(record)
    }
}
