//! Provider vocabularies
//!
//! All provider-specific knowledge lives here: the labels and roles a webmail UI uses
//! for the controls and fields the compose flow touches. Adding a provider means adding
//! one entry, either to the built-in table or to a vocabulary file.

use crate::errors::CourierError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

fn default_control_role() -> String {
    "button".to_string()
}

/// The UI labels needed to compose and send a message with one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVocabulary {
    #[serde(default)]
    pub provider: String,
    pub compose_control: String,
    pub to_field: String,
    pub subject_field: String,
    pub body_field: String,
    pub send_control: String,
    /// Role used for both compose and send controls
    #[serde(default = "default_control_role")]
    pub control_role: String,
    /// Web entry point; only consumed by session drivers that navigate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_url: Option<String>,
}

impl ProviderVocabulary {
    fn builtin(
        provider: &str,
        labels: [&str; 5],
        entry_url: &str,
    ) -> Self {
        let [compose, to, subject, body, send] = labels;
        Self {
            provider: provider.to_string(),
            compose_control: compose.to_string(),
            to_field: to.to_string(),
            subject_field: subject.to_string(),
            body_field: body.to_string(),
            send_control: send.to_string(),
            control_role: default_control_role(),
            entry_url: Some(entry_url.to_string()),
        }
    }

    /// Rejects entries with an empty label; a partial vocabulary would only surface
    /// later as a confusing resolution timeout.
    pub fn validate(&self) -> Result<(), CourierError> {
        let fields = [
            ("provider", &self.provider),
            ("compose_control", &self.compose_control),
            ("to_field", &self.to_field),
            ("subject_field", &self.subject_field),
            ("body_field", &self.body_field),
            ("send_control", &self.send_control),
            ("control_role", &self.control_role),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(CourierError::InvalidVocabulary(format!(
                    "'{field}' is empty for provider '{}'",
                    self.provider
                )));
            }
        }
        Ok(())
    }
}

/// Normalizes a provider identifier for lookups.
pub fn normalize_provider_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// Immutable provider-id → vocabulary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyTable {
    entries: BTreeMap<String, ProviderVocabulary>,
}

impl Default for VocabularyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VocabularyTable {
    /// The compiled-in providers.
    pub fn builtin() -> Self {
        let entries = [
            ProviderVocabulary::builtin(
                "gmail",
                ["Compose", "To", "Subject", "Message Body", "Send"],
                "https://mail.google.com",
            ),
            ProviderVocabulary::builtin(
                "outlook",
                ["New message", "To", "Add a subject", "Message body", "Send"],
                "https://outlook.live.com/mail/",
            ),
        ]
        .into_iter()
        .map(|v| (v.provider.clone(), v))
        .collect();
        Self { entries }
    }

    /// Builds a table from explicit entries, validating each one.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ProviderVocabulary>,
    ) -> Result<Self, CourierError> {
        let mut table = BTreeMap::new();
        for mut vocab in entries {
            vocab.provider = normalize_provider_id(&vocab.provider);
            vocab.validate()?;
            table.insert(vocab.provider.clone(), vocab);
        }
        Ok(Self { entries: table })
    }

    /// Parses a `provider-id: { ...labels }` mapping from YAML.
    pub fn from_yaml_str(source: &str) -> Result<Self, CourierError> {
        let raw: BTreeMap<String, ProviderVocabulary> = serde_yaml::from_str(source)?;
        Self::from_keyed(raw)
    }

    /// Parses a `{"provider-id": { ...labels }}` mapping from JSON.
    pub fn from_json_str(source: &str) -> Result<Self, CourierError> {
        let raw: BTreeMap<String, ProviderVocabulary> = serde_json::from_str(source)?;
        Self::from_keyed(raw)
    }

    /// Loads a vocabulary file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        debug!("Loading vocabulary from {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    fn from_keyed(raw: BTreeMap<String, ProviderVocabulary>) -> Result<Self, CourierError> {
        Self::from_entries(raw.into_iter().map(|(key, mut vocab)| {
            vocab.provider = key;
            vocab
        }))
    }

    /// Returns a new table where `other`'s entries replace or extend this table's.
    pub fn merge(mut self, other: VocabularyTable) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn lookup(&self, provider_id: &str) -> Result<&ProviderVocabulary, CourierError> {
        self.entries
            .get(&normalize_provider_id(provider_id))
            .ok_or_else(|| CourierError::UnsupportedProvider(provider_id.trim().to_string()))
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderVocabulary> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
