//! Registry store implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use conductor_core::{FileStructure, RegistryContent, ServerConfigSet};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{RegistryError, Result};

/// Extension of files shown in directory listings.
const DATA_EXTENSION: &str = "json";

/// Extensions whose content is parsed as JSON when it looks like JSON.
const JSON_EXTENSIONS: [&str; 2] = ["json", "txt"];

/// Read-through cache over the descriptor tree.
///
/// Paths are registry-relative: a leading `/` is ignored and `\` is treated
/// as `/`. Cached entries live until [`RegistryStore::clear_cache`].
pub struct RegistryStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, RegistryContent>>,
}

impl RegistryStore {
    /// Open a registry rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Opened registry");
        Ok(Self {
            root,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical form of a registry path: `/`-separated, no leading slash,
    /// no empty or `.` segments.
    pub fn normalize(path: &str) -> Result<String> {
        let unified = path.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(RegistryError::PathEscape(path.to_string())),
                other => segments.push(other),
            }
        }
        Ok(segments.join("/"))
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let key = Self::normalize(path)?;
        let full = if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&key)
        };
        Ok((key, full))
    }

    /// Immediate children of a directory: subdirectories and `.json` files,
    /// each sorted.
    pub async fn list(&self, path: &str) -> Result<FileStructure> {
        let (_, full) = self.resolve(path)?;
        let is_dir = tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(RegistryError::NotFound(path.to_string()));
        }

        let mut structure = FileStructure::default();
        let mut entries = tokio::fs::read_dir(&full).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                structure.directories.push(name);
            } else if file_type.is_file() && has_extension(&name, &[DATA_EXTENSION]) {
                structure.files.push(name);
            }
        }

        structure.directories.sort();
        structure.files.sort();
        trace!(
            path,
            directories = structure.directories.len(),
            files = structure.files.len(),
            "Listed registry directory"
        );
        Ok(structure)
    }

    /// Like [`list`](Self::list), keeping only directories whose name
    /// contains `keyword` (case-insensitive). Files are not filtered.
    pub async fn filter_list(&self, path: &str, keyword: &str) -> Result<FileStructure> {
        let mut structure = self.list(path).await?;
        let needle = keyword.to_lowercase();
        structure
            .directories
            .retain(|dir| dir.to_lowercase().contains(&needle));
        Ok(structure)
    }

    /// Read and classify a file, memoizing the result.
    pub async fn read(&self, path: &str) -> Result<RegistryContent> {
        let (key, full) = self.resolve(path)?;

        let cached = self.cache.read().get(&key).cloned();
        if let Some(hit) = cached {
            trace!(path = %key, "Registry cache hit");
            return Ok(hit);
        }

        let is_file = tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(RegistryError::NotFound(path.to_string()));
        }

        let bytes = tokio::fs::read(&full).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let content = classify_file(&key, &text)?;

        debug!(path = %key, "Loaded registry file");
        self.cache.write().insert(key, content.clone());
        Ok(content)
    }

    /// Read a file that must be a server collection.
    pub async fn get_server_config(&self, path: &str) -> Result<ServerConfigSet> {
        match self.read(path).await? {
            RegistryContent::ServerSet(set) => Ok(set),
            _ => Err(RegistryError::format(path, "not an mcpServers manifest")),
        }
    }

    /// Whether `path` exists under the root.
    pub async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((_, full)) => tokio::fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Drop every memoized read.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Number of memoized reads.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|want| e.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

fn classify_file(key: &str, text: &str) -> Result<RegistryContent> {
    let looks_like_json = text
        .trim_start()
        .starts_with(|c: char| c == '{' || c == '[');

    if !has_extension(key, &JSON_EXTENSIONS) || !looks_like_json {
        return Ok(RegistryContent::Text(text.to_string()));
    }

    match serde_json::from_str(text) {
        Ok(value) => {
            RegistryContent::classify(value).map_err(|e| RegistryError::format(key, e))
        }
        Err(e) if has_extension(key, &[DATA_EXTENSION]) => Err(RegistryError::format(key, e)),
        Err(_) => Ok(RegistryContent::Text(text.to_string())),
    }
}
