// Resource identifier resolution
//
// Identifiers arrive from the host as opaque strings. Remote identifiers are
// passed through untouched; local ones are turned into filesystem paths.

use crate::error::{AudioError, Result};
use crate::state::PlaybackMode;
use std::path::{Path, PathBuf};

const HTTP: &str = "http://";
const HTTPS: &str = "https://";
const FILE: &str = "file://";
const ASSET: &str = "asset://";

/// A resource identifier resolved for a specific backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResource {
    File(PathBuf),
    Url(String),
}

impl ResolvedResource {
    pub fn mode(&self) -> PlaybackMode {
        match self {
            ResolvedResource::File(_) => PlaybackMode::Local,
            ResolvedResource::Url(_) => PlaybackMode::Remote,
        }
    }

    /// Extension used as a probe hint by the decoder
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            ResolvedResource::File(path) => path.as_path(),
            ResolvedResource::Url(url) => {
                let no_query = url.split(['?', '#']).next().unwrap_or(url);
                Path::new(no_query)
            }
        };
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

pub fn is_remote(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with(HTTP) || lower.starts_with(HTTPS)
}

/// Resolve `uri` for the requested `mode`.
///
/// Relative identifiers and `asset://` identifiers are looked up under
/// `asset_root`. Schemes the session cannot open on its own (`content://`,
/// anything unknown) and identifiers that do not match `mode` are rejected
/// with `ResourceUnavailable`.
pub fn resolve(uri: &str, mode: PlaybackMode, asset_root: Option<&Path>) -> Result<ResolvedResource> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(AudioError::ResourceUnavailable("empty resource identifier".into()));
    }

    let resolved = if is_remote(trimmed) {
        ResolvedResource::Url(trimmed.to_string())
    } else if let Some(path) = trimmed.strip_prefix(FILE) {
        if path.is_empty() {
            return Err(AudioError::ResourceUnavailable(format!("no path in {}", uri)));
        }
        ResolvedResource::File(PathBuf::from(path))
    } else if let Some(rel) = trimmed.strip_prefix(ASSET) {
        ResolvedResource::File(resolve_asset(rel, asset_root, uri)?)
    } else if trimmed.starts_with('/') {
        ResolvedResource::File(PathBuf::from(trimmed))
    } else if trimmed.contains("://") {
        return Err(AudioError::ResourceUnavailable(format!(
            "unsupported scheme in {}",
            uri
        )));
    } else {
        ResolvedResource::File(resolve_asset(trimmed, asset_root, uri)?)
    };

    if resolved.mode() != mode {
        return Err(AudioError::ResourceUnavailable(format!(
            "{} cannot be played in {:?} mode",
            uri, mode
        )));
    }

    log::debug!("Resolved {} -> {:?}", uri, resolved);
    Ok(resolved)
}

fn resolve_asset(rel: &str, asset_root: Option<&Path>, uri: &str) -> Result<PathBuf> {
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return Err(AudioError::ResourceUnavailable(format!("no asset path in {}", uri)));
    }
    if Path::new(rel)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(AudioError::ResourceUnavailable(format!(
            "asset path escapes asset root: {}",
            uri
        )));
    }
    let root = asset_root.ok_or_else(|| {
        AudioError::ResourceUnavailable(format!("no asset root configured for {}", uri))
    })?;
    Ok(root.join(rel))
}
