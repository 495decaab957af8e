//! Content routes.
//!
//! `GET`/`HEAD /Content/{directory}/{name}` stream update payloads from the
//! content store. Keys are resolved against a map built at startup; lookups
//! are case-insensitive on both path segments. The content store is
//! independent of the catalog, so these handlers never touch the catalog
//! guard.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;

use upsync_catalog::Catalog;
use upsync_core::{ContentSource, Error, UpdateFile};

use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;

/// Maps lowercased `directory/name` keys to update files.
#[derive(Debug, Default)]
pub struct ContentMap {
    entries: HashMap<String, UpdateFile>,
}

impl ContentMap {
    /// Builds the key map over every file in the catalog.
    ///
    /// Files are deduplicated by their first digest (base64), keeping the
    /// first occurrence; the key is the content URL pair, lowercased.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut entries = HashMap::new();
        let mut seen = HashSet::new();
        for file in catalog.all_files() {
            let (Some(directory), Some(name)) = (file.content_directory(), file.content_name())
            else {
                continue;
            };
            let Some(digest) = file.primary_digest() else {
                continue;
            };
            if !seen.insert(digest.to_base64()) {
                continue;
            }
            entries.insert(format!("{directory}/{name}").to_lowercase(), file.clone());
        }
        tracing::debug!(files = entries.len(), "content map built");
        Self { entries }
    }

    /// Looks up a file by its URL pair, case-insensitively.
    #[must_use]
    pub fn lookup(&self, directory: &str, name: &str) -> Option<&UpdateFile> {
        self.entries
            .get(&format!("{directory}/{name}").to_lowercase())
    }

    /// Number of addressable files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A requested byte range, before resolution against the stream length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`.
    From(u64, Option<u64>),
    /// `bytes=-suffix`.
    Suffix(u64),
}

fn parse_range(headers: &HeaderMap) -> Option<RangeSpec> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?.split(',').next()?.trim();
    let (start, end) = spec.split_once('-')?;
    if start.is_empty() {
        return end.parse().ok().map(RangeSpec::Suffix);
    }
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some(RangeSpec::From(start, end))
}

fn resolve_range(spec: RangeSpec, total: u64) -> Option<(u64, u64)> {
    match spec {
        RangeSpec::From(start, end) => {
            if start >= total {
                return None;
            }
            let end = end.map_or(total - 1, |e| e.min(total - 1));
            (start <= end).then_some((start, end))
        }
        RangeSpec::Suffix(suffix) => {
            if suffix == 0 || total == 0 {
                return None;
            }
            Some((total.saturating_sub(suffix), total - 1))
        }
    }
}

/// Serves `GET` and `HEAD` for a content-addressed file.
///
/// # Errors
///
/// Returns 404 when the key or the payload is missing, 416 for an
/// unsatisfiable range, 500 on stream failures.
pub async fn content(
    State(state): State<AppState>,
    method: Method,
    Path((directory, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> ServiceResult<Response> {
    let miss = || Error::ContentNotFound {
        key: format!("{directory}/{name}"),
    };
    let file = state
        .content_map
        .lookup(&directory, &name)
        .cloned()
        .ok_or_else(miss)?;
    let store = state.content.clone().ok_or_else(miss)?;
    if !store.contains(&file) {
        return Err(ServiceError::Core(miss()));
    }

    if method == Method::HEAD {
        // Open only to learn the length; the stream is dropped unread.
        let len = tokio::task::spawn_blocking(move || store.open(&file).map(|stream| stream.len))
            .await
            .map_err(Error::internal)??;
        return Ok(base_response(&name)
            .header(header::CONTENT_LENGTH, len)
            .body(Body::empty())
            .map_err(Error::internal)?);
    }

    let range = parse_range(&headers);
    let (total, resolved, bytes) = tokio::task::spawn_blocking(
        move || -> upsync_core::Result<(u64, Option<(u64, u64)>, Bytes)> {
            let mut stream = store.open(&file)?;
            let total = stream.len;
            match range.map(|spec| resolve_range(spec, total)) {
                Some(Some((start, end))) => {
                    stream.reader.seek(SeekFrom::Start(start))?;
                    let mut buf = vec![0u8; usize::try_from(end - start + 1).unwrap_or(0)];
                    stream.reader.read_exact(&mut buf)?;
                    Ok((total, Some((start, end)), Bytes::from(buf)))
                }
                Some(None) => Ok((total, None, Bytes::new())),
                None => {
                    let mut buf = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
                    stream.reader.read_to_end(&mut buf)?;
                    Ok((total, None, Bytes::from(buf)))
                }
            }
        },
    )
    .await
    .map_err(Error::internal)??;

    if range.is_some() && resolved.is_none() {
        return Ok(Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total}"))
            .body(Body::empty())
            .map_err(Error::internal)?);
    }

    let builder = match resolved {
        Some((start, end)) => base_response(&name)
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}")),
        None => base_response(&name),
    };
    Ok(builder.body(Body::from(bytes)).map_err(Error::internal)?)
}

fn base_response(name: &str) -> axum::http::response::Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .header(header::ACCEPT_RANGES, "bytes")
}
