//! Model Registry: the in-memory set of models a serving process should have loaded.
//!
//! Entries keep insertion order. Names and base paths are each unique across the
//! registry. Every check runs before any mutation, so a failed call leaves the
//! registry exactly as it was.

use serde::{Deserialize, Serialize};
use serving_proto::serving::servable_version_policy::{All, Latest, PolicyChoice, Specific};
use serving_proto::{ModelConfig, ModelServerConfig, ServableVersionPolicy};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::document::{Document, Message};
use crate::text_format::{self, ParseError};
use crate::wire::{self, ConversionError};

/// Platform written for entries that do not name one.
pub const DEFAULT_MODEL_PLATFORM: &str = "tensorflow";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VersionPolicy {
    /// Serve the newest `num_versions` versions found under the base path.
    Latest { num_versions: u32 },
    All,
    Specific { versions: Vec<i64> },
}

impl VersionPolicy {
    fn to_message(&self) -> Message {
        match self {
            VersionPolicy::Latest { num_versions } => {
                Message::new().with("latest", Message::new().with("num_versions", i64::from(*num_versions)))
            }
            VersionPolicy::All => Message::new().with("all", Message::new()),
            VersionPolicy::Specific { versions } => {
                let mut specific = Message::new();
                for v in versions {
                    specific.push("versions", *v);
                }
                Message::new().with("specific", specific)
            }
        }
    }
}

impl From<PolicyChoice> for VersionPolicy {
    fn from(choice: PolicyChoice) -> Self {
        match choice {
            PolicyChoice::Latest(l) => VersionPolicy::Latest { num_versions: l.num_versions },
            PolicyChoice::All(_) => VersionPolicy::All,
            PolicyChoice::Specific(s) => VersionPolicy::Specific { versions: s.versions },
        }
    }
}

impl From<&VersionPolicy> for ServableVersionPolicy {
    fn from(policy: &VersionPolicy) -> Self {
        let choice = match policy {
            VersionPolicy::Latest { num_versions } => PolicyChoice::Latest(Latest { num_versions: *num_versions }),
            VersionPolicy::All => PolicyChoice::All(All {}),
            VersionPolicy::Specific { versions } => PolicyChoice::Specific(Specific { versions: versions.clone() }),
        };
        ServableVersionPolicy { policy_choice: Some(choice) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub base_path: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_policy: Option<VersionPolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub version_labels: BTreeMap<String, i64>,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            platform: DEFAULT_MODEL_PLATFORM.to_string(),
            version_policy: None,
            version_labels: BTreeMap::new(),
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = Some(policy);
        self
    }

    pub fn with_version_label(mut self, label: impl Into<String>, version: i64) -> Self {
        self.version_labels.insert(label.into(), version);
        self
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::InvalidEntry("model name must not be empty".into()));
        }
        if self.base_path.is_empty() {
            return Err(RegistryError::InvalidEntry(format!("model `{}` has an empty base path", self.name)));
        }
        if self.platform.is_empty() {
            return Err(RegistryError::InvalidEntry(format!("model `{}` has an empty platform", self.name)));
        }
        Ok(())
    }

    /// Document form, as it appears under `model_config_list.config`.
    pub fn to_message(&self) -> Message {
        let mut m = Message::new()
            .with("name", self.name.as_str())
            .with("base_path", self.base_path.as_str())
            .with("model_platform", self.platform.as_str());
        if let Some(policy) = &self.version_policy {
            m.push("model_version_policy", policy.to_message());
        }
        for (label, version) in &self.version_labels {
            m.push("version_labels", Message::new().with("key", label.as_str()).with("value", *version));
        }
        m
    }
}

impl From<ModelConfig> for ModelEntry {
    fn from(config: ModelConfig) -> Self {
        let platform = if config.model_platform.is_empty() {
            DEFAULT_MODEL_PLATFORM.to_string()
        } else {
            config.model_platform
        };
        Self {
            name: config.name,
            base_path: config.base_path,
            platform,
            version_policy: config.model_version_policy.and_then(|p| p.policy_choice).map(VersionPolicy::from),
            version_labels: config.version_labels,
        }
    }
}

impl From<&ModelEntry> for ModelConfig {
    fn from(entry: &ModelEntry) -> Self {
        ModelConfig {
            name: entry.name.clone(),
            base_path: entry.base_path.clone(),
            model_platform: entry.platform.clone(),
            model_version_policy: entry.version_policy.as_ref().map(ServableVersionPolicy::from),
            version_labels: entry.version_labels.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry is not initialized; call initialize_blank or load first")]
    NotInitialized,
    #[error("a model named `{0}` is already registered")]
    DuplicateName(String),
    #[error("base path `{0}` is already used by another model")]
    DuplicatePath(String),
    #[error("no model named `{0}` in the registry")]
    NotFound(String),
    #[error("invalid model entry: {0}")]
    InvalidEntry(String),
    #[error("failed to parse registry text: {0}")]
    Parse(#[from] ParseError),
    #[error("registry does not match the wire schema: {0}")]
    Conversion(#[from] ConversionError),
    #[error("registry file i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegistryState {
    #[default]
    Uninitialized,
    Ready(Vec<ModelEntry>),
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    state: RegistryState,
}

impl ModelRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> &RegistryState { &self.state }

    pub fn is_ready(&self) -> bool { matches!(self.state, RegistryState::Ready(_)) }

    /// Replaces whatever is held with an empty registry.
    pub fn initialize_blank(&mut self) {
        self.state = RegistryState::Ready(Vec::new());
        debug!("registry initialized blank");
    }

    /// Replaces the registry with the models described by protobuf text.
    pub fn load(&mut self, text: &str) -> Result<(), RegistryError> {
        let document = text_format::decode_text(text)?;
        let entries = entries_from_document(&document)?;
        info!(models = entries.len(), "registry loaded");
        self.state = RegistryState::Ready(entries);
        Ok(())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        self.load(&text)?;
        debug!(path = %path.display(), "registry file read");
        Ok(())
    }

    /// Rehydrates from a config message, e.g. one fetched back from a server.
    pub fn load_wire(&mut self, config: &ModelServerConfig) -> Result<(), RegistryError> {
        let entries = entries_from_document(&wire::from_wire(config))?;
        info!(models = entries.len(), "registry loaded from wire config");
        self.state = RegistryState::Ready(entries);
        Ok(())
    }

    fn entries(&self) -> Result<&Vec<ModelEntry>, RegistryError> {
        match &self.state {
            RegistryState::Ready(entries) => Ok(entries),
            RegistryState::Uninitialized => Err(RegistryError::NotInitialized),
        }
    }

    fn entries_mut(&mut self) -> Result<&mut Vec<ModelEntry>, RegistryError> {
        match &mut self.state {
            RegistryState::Ready(entries) => Ok(entries),
            RegistryState::Uninitialized => Err(RegistryError::NotInitialized),
        }
    }

    pub fn list_models(&self) -> Result<&[ModelEntry], RegistryError> {
        self.entries().map(Vec::as_slice)
    }

    pub fn get_model(&self, name: &str) -> Result<Option<&ModelEntry>, RegistryError> {
        Ok(self.entries()?.iter().find(|e| e.name == name))
    }

    pub fn contains(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.get_model(name)?.is_some())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.entries()?.is_empty())
    }

    pub fn add_model(&mut self, entry: ModelEntry) -> Result<(), RegistryError> {
        let entries = self.entries_mut()?;
        entry.validate()?;
        if entries.iter().any(|e| e.name == entry.name) {
            return Err(RegistryError::DuplicateName(entry.name));
        }
        if entries.iter().any(|e| e.base_path == entry.base_path) {
            return Err(RegistryError::DuplicatePath(entry.base_path));
        }
        debug!(name = %entry.name, base_path = %entry.base_path, platform = %entry.platform, "model added");
        entries.push(entry);
        Ok(())
    }

    /// Removes the entry called `name`. Names are unique, so at most one entry matches.
    pub fn remove_model(&mut self, name: &str) -> Result<ModelEntry, RegistryError> {
        let entries = self.entries_mut()?;
        let idx = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let removed = entries.remove(idx);
        debug!(name, base_path = %removed.base_path, "model removed");
        Ok(removed)
    }

    /// Mapping view of the current entries.
    pub fn document(&self) -> Result<Document, RegistryError> {
        let mut list = Message::new();
        for entry in self.entries()? {
            list.push("config", entry.to_message());
        }
        Ok(Document::new(Message::new().with("model_config_list", list)))
    }

    pub fn to_text(&self) -> Result<String, RegistryError> {
        Ok(text_format::encode_text(&self.document()?))
    }

    /// Writes the text encoding next to `path` and renames it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let text = self.to_text()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        info!(path = %path.display(), models = self.len()?, "registry saved");
        Ok(())
    }

    pub fn to_wire(&self) -> Result<ModelServerConfig, RegistryError> {
        Ok(wire::to_wire(&self.document()?)?)
    }
}

fn entries_from_document(document: &Document) -> Result<Vec<ModelEntry>, RegistryError> {
    let config = wire::to_wire(document)?;
    let entries: Vec<ModelEntry> = config
        .model_config_list()
        .map(|list| list.config.iter().cloned().map(ModelEntry::from).collect())
        .unwrap_or_default();
    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for entry in &entries {
        if !names.insert(entry.name.as_str()) {
            return Err(RegistryError::DuplicateName(entry.name.clone()));
        }
        if !paths.insert(entry.base_path.as_str()) {
            return Err(RegistryError::DuplicatePath(entry.base_path.clone()));
        }
    }
    Ok(entries)
}
