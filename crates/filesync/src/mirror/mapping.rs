//! The configured category → filename → URL mapping.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Component, Path, PathBuf},
};

use reqwest::Url;
use thiserror::Error;

/// Mapping exactly as it appears under `files.mirror` in configuration.
pub type RawMirrorMapping = BTreeMap<String, BTreeMap<String, String>>;

/// Errors detected while validating the mirror mapping. Always fatal at startup.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid mirror category `{0}`: must be a single path component")]
    InvalidCategory(String),

    #[error("invalid mirror filename `{filename}` in category `{category}`: must be a single path component")]
    InvalidFilename { category: String, filename: String },

    #[error("invalid URL `{url}` for {category}/{filename}: {reason}")]
    InvalidUrl {
        category: String,
        filename: String,
        url: String,
        reason: String,
    },

    #[error("{category}/{filename} collides with another mirror entry's local path")]
    DuplicatePath { category: String, filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MirrorSource {
    category: String,
    filename: String,
    url: Url,
}

/// Validated, immutable set of files the mirror is responsible for.
#[derive(Debug, Clone, Default)]
pub struct MirrorMapping {
    sources: Vec<MirrorSource>,
}

/// One file to synchronise during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub category: String,
    /// `<mirror root>/<category>/<filename>`.
    pub local_path: PathBuf,
    pub url: Url,
}

impl MirrorMapping {
    /// Validate `raw` and build the mapping.
    ///
    /// Local paths are compared case-insensitively so that a mapping which is
    /// valid on Linux does not silently overwrite itself on a case-insensitive
    /// filesystem.
    ///
    /// # Errors
    ///
    /// Returns the first [`MappingError`] found.
    pub fn from_raw(raw: &RawMirrorMapping) -> Result<Self, MappingError> {
        let mut sources = Vec::new();
        let mut seen = HashSet::new();

        for (category, files) in raw {
            if !is_single_component(category) {
                return Err(MappingError::InvalidCategory(category.clone()));
            }
            for (filename, url) in files {
                if !is_single_component(filename) {
                    return Err(MappingError::InvalidFilename {
                        category: category.clone(),
                        filename: filename.clone(),
                    });
                }
                let url = parse_url(url).map_err(|reason| MappingError::InvalidUrl {
                    category: category.clone(),
                    filename: filename.clone(),
                    url: url.clone(),
                    reason,
                })?;
                if !seen.insert((category.to_lowercase(), filename.to_lowercase())) {
                    return Err(MappingError::DuplicatePath {
                        category: category.clone(),
                        filename: filename.clone(),
                    });
                }
                sources.push(MirrorSource {
                    category: category.clone(),
                    filename: filename.clone(),
                    url,
                });
            }
        }

        Ok(Self { sources })
    }

    /// Number of configured files.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Materialise the entries for one pass under `root`.
    pub fn entries(&self, root: &Path) -> Vec<MirrorEntry> {
        self.sources
            .iter()
            .map(|s| MirrorEntry {
                category: s.category.clone(),
                local_path: root.join(&s.category).join(&s.filename),
                url: s.url.clone(),
            })
            .collect()
    }
}

fn is_single_component(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn parse_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme `{other}`")),
    }
}
