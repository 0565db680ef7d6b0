//! Encryption keys for artifact sealing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed, non-secret key for local development runs. Artifacts sealed with
/// it are flagged in the manifest and must never ship.
pub const DEVELOPMENT_KEY_BASE64: &str = "ui6yt/8nILrWcg+xGVWliahscs6jJ6j6fDBo2gpZklY=";

pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("encryption key is required outside development mode")]
    Missing,

    #[error("encryption key is not valid base64: {0}")]
    Base64(String),

    #[error("encryption key decodes to {0} bytes, expected {KEY_LEN}")]
    Length(usize),
}

/// Where the run's key comes from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySource {
    Development,
    /// Base64 text of a 32-byte key.
    Production(String),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Development => f.write_str("Development"),
            KeySource::Production(_) => f.write_str("Production(<redacted>)"),
        }
    }
}

impl KeySource {
    pub fn is_development(&self) -> bool {
        matches!(self, KeySource::Development)
    }
}

/// A decoded AES-256 key. Held in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Missing);
        }
        let raw = STANDARD
            .decode(trimmed)
            .map_err(|e| KeyError::Base64(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Length(raw.len()))?;
        Ok(Self(bytes))
    }

    pub fn development() -> Self {
        Self(DEVELOPMENT_KEY)
    }

    /// Decode the key for a run. Called once, before any file is touched.
    pub fn resolve(source: &KeySource) -> Result<Self, KeyError> {
        match source {
            KeySource::Development => Ok(Self::development()),
            KeySource::Production(text) => Self::from_base64(text),
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// `DEVELOPMENT_KEY_BASE64`, decoded.
const DEVELOPMENT_KEY: [u8; KEY_LEN] = [
    0xba, 0x2e, 0xb2, 0xb7, 0xff, 0x27, 0x20, 0xba, 0xd6, 0x72, 0x0f, 0xb1, 0x19, 0x55, 0xa5,
    0x89, 0xa8, 0x6c, 0x72, 0xce, 0xa3, 0x27, 0xa8, 0xfa, 0x7c, 0x30, 0x68, 0xda, 0x0a, 0x59,
    0x92, 0x56,
];
