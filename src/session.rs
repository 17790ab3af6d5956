//! Per-session state: interaction history, project theme, credential and the
//! preprocessed-table cache. Everything the prompt builders need is read from
//! here and passed in explicitly; nothing is process-global.

use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::loader::{load_grants_from_slice, read_source};
use crate::preprocess::{preprocess, PreprocessedTables};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_INTERACTIONS: usize = 20;

/// Most recent user questions, oldest first, capped at `MAX_INTERACTIONS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionLog {
    entries: VecDeque<String>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, interaction: impl Into<String>) {
        self.entries.push_back(interaction.into());
        while self.entries.len() > MAX_INTERACTIONS {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Preprocessed tables keyed by a hash of the source bytes.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<u64, PreprocessedTables>,
}

impl TableCache {
    pub fn get_or_preprocess(&mut self, bytes: &[u8]) -> Result<PreprocessedTables> {
        let key = content_key(bytes);
        if let Some(tables) = self.tables.get(&key) {
            debug!("Table cache hit for {:016x}", key);
            return Ok(tables.clone());
        }

        let dataset = load_grants_from_slice(bytes)?;
        let tables = preprocess(&dataset)?;
        self.tables.insert(key, tables.clone());
        Ok(tables)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

fn content_key(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Whether AI features can run for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAvailability {
    Enabled,
    Disabled,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub interactions: InteractionLog,
    pub project_theme: Option<String>,
    api_key: Option<String>,
    cache: TableCache,
}

impl Session {
    pub fn new(api_key: Option<String>) -> Self {
        let id = Uuid::new_v4();
        info!("Starting session {}", id);
        Self {
            id,
            interactions: InteractionLog::new(),
            project_theme: None,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            cache: TableCache::default(),
        }
    }

    pub fn with_project_theme(mut self, theme: impl Into<String>) -> Self {
        let theme = theme.into();
        self.project_theme = if theme.trim().is_empty() { None } else { Some(theme) };
        self
    }

    pub fn ai_availability(&self) -> AiAvailability {
        if self.api_key.is_some() {
            AiAvailability::Enabled
        } else {
            AiAvailability::Disabled
        }
    }

    /// Query engine bound to this session's credential, if one was supplied.
    pub fn engine(&self, config: &AppConfig) -> Option<LlmClient> {
        self.api_key
            .as_ref()
            .map(|key| LlmClient::from_config(key.clone(), config))
    }

    /// Load and preprocess an upload or a file, reusing earlier results for
    /// identical bytes.
    pub fn load_tables(&mut self, path: Option<&Path>, upload: Option<&[u8]>) -> Result<PreprocessedTables> {
        match (upload, path) {
            (Some(bytes), _) => self.cache.get_or_preprocess(bytes),
            (None, Some(path)) => {
                let bytes = read_source(path)?;
                self.cache.get_or_preprocess(&bytes)
            }
            (None, None) => Err(crate::error::GrantScopeError::SourceNotFound),
        }
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }
}
