//! Per-request pipeline state.

use std::collections::HashMap;
use std::fmt;

use conductor_core::RegistryContent;
use conductor_registry::RegistryStore;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::types::{DiscoveryResult, SubTask};

/// Stages of one request, in the only order they may happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Received,
    Decomposed,
    Discovered,
    Planned,
    Executed,
    Synthesized,
}

impl PipelineState {
    /// The stage after this one; `None` once synthesized.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Decomposed),
            Self::Decomposed => Some(Self::Discovered),
            Self::Discovered => Some(Self::Planned),
            Self::Planned => Some(Self::Executed),
            Self::Executed => Some(Self::Synthesized),
            Self::Synthesized => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Synthesized
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Decomposed => "decomposed",
            Self::Discovered => "discovered",
            Self::Planned => "planned",
            Self::Executed => "executed",
            Self::Synthesized => "synthesized",
        };
        f.write_str(s)
    }
}

/// Registry content loaded during one request, keyed by registry path.
///
/// A failed load is remembered as `None` so it is not retried.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: HashMap<String, Option<RegistryContent>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content for a discovery result: its snapshot, else an earlier load of
    /// the same path, else a fresh registry read.
    pub async fn load(&mut self, store: &RegistryStore, discovery: &DiscoveryResult) -> Option<RegistryContent> {
        let path = discovery.mcp_path.as_str();
        if path.is_empty() {
            return None;
        }

        if let Some(snapshot) = &discovery.snapshot {
            self.entries
                .entry(path.to_string())
                .or_insert_with(|| Some(snapshot.clone()));
            return Some(snapshot.clone());
        }

        if let Some(cached) = self.entries.get(path) {
            return cached.clone();
        }

        let loaded = match store.read(path).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path, error = %e, "Registry content unavailable");
                None
            }
        };
        self.entries.insert(path.to_string(), loaded.clone());
        loaded
    }

    /// Whether `path` has been loaded, successfully or not.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one request owns while it moves through the pipeline.
#[derive(Debug)]
pub struct RequestContext {
    state: PipelineState,
    pub task_map: HashMap<String, SubTask>,
    pub discovery_map: HashMap<String, DiscoveryResult>,
    pub content_cache: ContentCache,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Received,
            task_map: HashMap::new(),
            discovery_map: HashMap::new(),
            content_cache: ContentCache::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `to`, which must be the stage right after the current one.
    pub fn advance(&mut self, to: PipelineState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(OrchestratorError::IllegalTransition { from: self.state, to });
        }
        info!(from = %self.state, to = %to, "Pipeline stage complete");
        self.state = to;
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_advance_in_order() {
        let mut ctx = RequestContext::new();
        for to in [
            PipelineState::Decomposed,
            PipelineState::Discovered,
            PipelineState::Planned,
            PipelineState::Executed,
            PipelineState::Synthesized,
        ] {
            ctx.advance(to).unwrap();
        }
        assert!(ctx.state().is_terminal());
        assert!(ctx.advance(PipelineState::Synthesized).is_err());
    }

    #[test]
    fn test_rejects_skip_and_backward() {
        let mut ctx = RequestContext::new();
        let err = ctx.advance(PipelineState::Planned).unwrap_err();
        assert_eq!(err.to_string(), "illegal pipeline transition from received to planned");

        ctx.advance(PipelineState::Decomposed).unwrap();
        assert!(ctx.advance(PipelineState::Received).is_err());
        assert!(ctx.advance(PipelineState::Decomposed).is_err());
        assert_eq!(ctx.state(), PipelineState::Decomposed);
    }

    #[tokio::test]
    async fn test_content_cache_prefers_snapshot_then_memo() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/x.json"), r#"{"k": 1}"#).unwrap();
        let store = RegistryStore::new(dir.path()).unwrap();
        let mut cache = ContentCache::new();

        let snapshot = RegistryContent::Text("snap".to_string());
        let with_snapshot = DiscoveryResult::found("t1", "/a/x.json").with_snapshot(Some(snapshot.clone()));
        assert_eq!(cache.load(&store, &with_snapshot).await, Some(snapshot.clone()));

        // The second result for the same path has no snapshot and hits the memo.
        let bare = DiscoveryResult::found("t2", "/a/x.json");
        assert_eq!(cache.load(&store, &bare).await, Some(snapshot));

        let missing = DiscoveryResult::found("t3", "/a/missing.json");
        assert_eq!(cache.load(&store, &missing).await, None);
        assert!(cache.contains("/a/missing.json"));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.load(&store, &DiscoveryResult::not_found("t4")).await, None);
        assert_eq!(cache.len(), 2);
    }
}
