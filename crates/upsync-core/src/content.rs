//! The content store seam.
//!
//! A content source resolves an update file to a seekable byte stream with
//! a known length. The filesystem implementation lays files out the same
//! way the content URLs address them: a directory named after the uppercase
//! hex of the digest's last byte, containing the full lowercase hex name.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::file::{FileDigest, FileUrl, UpdateFile};

/// A readable, seekable stream.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// An opened content stream with its total length.
pub struct ContentStream {
    /// The byte stream, positioned at the start.
    pub reader: Box<dyn ReadSeek + Send>,
    /// Total stream length in bytes.
    pub len: u64,
}

impl std::fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStream").field("len", &self.len).finish()
    }
}

/// Read interface onto an update content store.
pub trait ContentSource: Send + Sync + 'static {
    /// Whether the store holds the payload for this file.
    fn contains(&self, file: &UpdateFile) -> bool;

    /// Opens the payload stream for this file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContentNotFound`] if the store lacks the file.
    fn open(&self, file: &UpdateFile) -> Result<ContentStream>;
}

fn addressed_key(file: &UpdateFile) -> Option<(String, String)> {
    Some((file.content_directory()?, file.content_name()?))
}

/// Content source over a local directory.
#[derive(Debug)]
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    /// Creates a content source rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, file: &UpdateFile) -> Option<PathBuf> {
        let (dir, name) = addressed_key(file)?;
        Some(self.root.join(dir).join(name))
    }
}

impl ContentSource for FsContentSource {
    fn contains(&self, file: &UpdateFile) -> bool {
        self.path_for(file).is_some_and(|path| path.is_file())
    }

    fn open(&self, file: &UpdateFile) -> Result<ContentStream> {
        let path = self.path_for(file).ok_or_else(|| Error::ContentNotFound {
            key: file.name.clone(),
        })?;
        if !path.is_file() {
            return Err(Error::ContentNotFound {
                key: path.display().to_string(),
            });
        }
        let handle = std::fs::File::open(&path)?;
        let len = handle.metadata()?.len();
        Ok(ContentStream {
            reader: Box::new(handle),
            len,
        })
    }
}

/// In-memory content source for tests and the development server.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    payloads: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentSource {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a payload and returns the update file record addressing it.
    pub fn insert(&self, name: impl Into<String>, payload: &[u8]) -> UpdateFile {
        let digest = FileDigest::sha256_of(payload);
        let file = UpdateFile {
            name: name.into(),
            urls: vec![FileUrl {
                url: format!("http://upstream.example/{}", digest.to_hex()),
                digest_base64: digest.to_base64(),
            }],
            digests: vec![digest.clone()],
        };
        self.payloads
            .write()
            .expect("content store lock poisoned")
            .insert(digest.to_hex(), payload.to_vec());
        file
    }
}

impl ContentSource for MemoryContentSource {
    fn contains(&self, file: &UpdateFile) -> bool {
        file.content_name().is_some_and(|name| {
            self.payloads
                .read()
                .ok()
                .is_some_and(|payloads| payloads.contains_key(&name))
        })
    }

    fn open(&self, file: &UpdateFile) -> Result<ContentStream> {
        let name = file.content_name().ok_or_else(|| Error::ContentNotFound {
            key: file.name.clone(),
        })?;
        let payload = self
            .payloads
            .read()
            .map_err(|_| Error::internal("content store lock poisoned"))?
            .get(&name)
            .cloned()
            .ok_or(Error::ContentNotFound { key: name })?;
        let len = payload.len() as u64;
        Ok(ContentStream {
            reader: Box::new(Cursor::new(payload)),
            len,
        })
    }
}
