//! Artifact sealing: gzip, then AES-256-GCM, then SHA-256 over the result.
//!
//! ```text
//! Magic(4) | Version(1) | Nonce(12) | Tag(16) | Ciphertext(N)
//! ```
//!
//! The associated data is the five header bytes `Magic | Version`, so a
//! reader re-derives it from the bytes it loaded. Ciphertext is the gzip
//! stream of the container payload.

use crate::key::EncryptionKey;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// File signature of every artifact.
pub const MAGIC: [u8; 4] = *b"EXCB";

/// Artifact layout version.
pub const FORMAT_VERSION: u8 = 1;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = MAGIC.len() + 1 + NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("encryption failed")]
    Encrypt,

    #[error("artifact is {0} bytes, shorter than its {HEADER_LEN}-byte header")]
    Truncated(usize),

    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u8),

    #[error("authentication failed: wrong key or tampered artifact")]
    Authentication,
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

/// Gzip a payload into a single member.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, ArtifactError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).map_err(ArtifactError::Compress)?;
    encoder.finish().map_err(ArtifactError::Compress)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ArtifactError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(ArtifactError::Decompress)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

fn associated_data() -> [u8; 5] {
    [MAGIC[0], MAGIC[1], MAGIC[2], MAGIC[3], FORMAT_VERSION]
}

fn cipher(key: &EncryptionKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt with a fresh random nonce and frame with the artifact header.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, ArtifactError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(&nonce, &associated_data(), &mut buffer)
        .map_err(|_| ArtifactError::Encrypt)?;

    let mut out = Vec::with_capacity(HEADER_LEN + buffer.len());
    out.extend_from_slice(&associated_data());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Verify the header and tag, then return the plaintext.
pub fn decrypt(artifact: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, ArtifactError> {
    if artifact.len() < HEADER_LEN {
        return Err(ArtifactError::Truncated(artifact.len()));
    }
    let (magic, rest) = artifact.split_at(MAGIC.len());
    if magic != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(ArtifactError::BadMagic(found));
    }
    let (version, rest) = rest.split_at(1);
    if version[0] != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion(version[0]));
    }
    let (nonce, rest) = rest.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    // AAD comes from the bytes actually read, not from constants.
    let aad = &artifact[..MAGIC.len() + 1];
    let mut buffer = ciphertext.to_vec();
    cipher(key)
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| ArtifactError::Authentication)?;
    Ok(buffer)
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of the given bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A sealed artifact and the hash recorded for it in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub hash: String,
}

/// Compress, encrypt and hash a container payload.
pub fn seal(payload: &[u8], key: &EncryptionKey) -> Result<Artifact, ArtifactError> {
    let compressed = compress(payload)?;
    let bytes = encrypt(&compressed, key)?;
    let hash = content_hash(&bytes);
    tracing::debug!(
        payload = payload.len(),
        compressed = compressed.len(),
        sealed = bytes.len(),
        "sealed artifact"
    );
    Ok(Artifact { bytes, hash })
}

/// Reverse of [`seal`]: authenticate, decrypt and gunzip.
pub fn open(artifact: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, ArtifactError> {
    decompress(&decrypt(artifact, key)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
