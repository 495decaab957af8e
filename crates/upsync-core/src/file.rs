//! Update payload files and their digests.
//!
//! Files are content-addressed: the first digest of a file determines both
//! the on-disk location in a content store and the `/Content/{dir}/{name}`
//! URL pair offered to clients. The directory is the uppercase hex of the
//! digest's last byte (no zero padding), the name is the full lowercase hex.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A content digest of an update file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    /// Digest algorithm name as carried in the metadata, e.g. `SHA256`.
    pub algorithm: String,
    /// Raw digest bytes.
    pub bytes: Vec<u8>,
}

impl FileDigest {
    /// Creates a digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            bytes,
        }
    }

    /// Creates a digest by decoding a base64 value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid base64.
    pub fn from_base64(algorithm: impl Into<String>, value: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(value)
            .map_err(|e| Error::InvalidInput(format!("bad base64 digest '{value}': {e}")))?;
        Ok(Self::new(algorithm, bytes))
    }

    /// Computes the SHA-256 digest of a payload.
    #[must_use]
    pub fn sha256_of(payload: &[u8]) -> Self {
        Self::new("SHA256", Sha256::digest(payload).to_vec())
    }

    /// Returns the base64 encoding of the digest bytes.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Returns the lowercase hex encoding of the digest bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// An upstream download URL paired with the digest it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUrl {
    /// The upstream (Microsoft Update) URL.
    pub url: String,
    /// Base64 digest of the file the URL serves.
    pub digest_base64: String,
}

/// A single payload file of a software update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFile {
    /// File name as carried in the metadata.
    pub name: String,
    /// Content digests, first one authoritative for addressing.
    pub digests: Vec<FileDigest>,
    /// Upstream URLs, first one authoritative for the reply digest.
    pub urls: Vec<FileUrl>,
}

impl UpdateFile {
    /// Returns the first digest, used for content addressing.
    #[must_use]
    pub fn primary_digest(&self) -> Option<&FileDigest> {
        self.digests.first()
    }

    /// Content URL directory segment: uppercase hex of the last digest byte.
    ///
    /// One or two hex characters, no zero padding.
    #[must_use]
    pub fn content_directory(&self) -> Option<String> {
        let digest = self.primary_digest()?;
        let last = *digest.bytes.last()?;
        Some(format!("{last:X}"))
    }

    /// Content URL name segment: full lowercase hex of the first digest.
    #[must_use]
    pub fn content_name(&self) -> Option<String> {
        Some(self.primary_digest()?.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_digest(bytes: Vec<u8>) -> UpdateFile {
        UpdateFile {
            name: "payload.cab".to_string(),
            digests: vec![FileDigest::new("SHA256", bytes)],
            urls: Vec::new(),
        }
    }

    #[test]
    fn base64_round_trip() {
        let digest = FileDigest::sha256_of(b"payload");
        let decoded = FileDigest::from_base64("SHA256", &digest.to_base64()).unwrap();
        assert_eq!(decoded.bytes, digest.bytes);
    }

    #[test]
    fn directory_is_unpadded_uppercase_hex_of_last_byte() {
        let file = file_with_digest(vec![0xAB, 0x0C]);
        assert_eq!(file.content_directory().unwrap(), "C");

        let file = file_with_digest(vec![0x01, 0xCD]);
        assert_eq!(file.content_directory().unwrap(), "CD");
    }

    #[test]
    fn name_is_full_lowercase_hex() {
        let file = file_with_digest(vec![0xAB, 0xCD]);
        assert_eq!(file.content_name().unwrap(), "abcd");
    }

    #[test]
    fn missing_digest_yields_no_address() {
        let file = UpdateFile {
            name: "x".to_string(),
            digests: Vec::new(),
            urls: Vec::new(),
        };
        assert!(file.content_directory().is_none());
        assert!(file.content_name().is_none());
    }
}
