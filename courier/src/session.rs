use crate::errors::CourierError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Opaque reference to an element resolved by a [`UiSession`].
///
/// Handles are only meaningful to the session that issued them and may go stale when
/// the UI re-renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
    /// What the session matched, for logs
    pub description: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.description, self.id)
    }
}

/// The capability a session driver provides over a live UI.
///
/// Resolution methods return [`CourierError::ElementNotFound`] when nothing matches
/// right now; callers poll. `wait_visible` returns [`CourierError::Timeout`] when the
/// element does not become visible and enabled in time.
#[async_trait::async_trait]
pub trait UiSession: Send + Sync {
    /// Resolve a control by role and accessible name
    async fn resolve_control(
        &self,
        role: &str,
        name: &str,
        fuzzy: bool,
    ) -> Result<ElementHandle, CourierError>;

    /// Resolve an input field by label
    async fn resolve_field(&self, label: &str, fuzzy: bool)
        -> Result<ElementHandle, CourierError>;

    async fn wait_visible(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), CourierError>;

    async fn click(&self, handle: &ElementHandle) -> Result<(), CourierError>;

    async fn set_value(&self, handle: &ElementHandle, text: &str) -> Result<(), CourierError>;

    /// Best-effort point-in-time capture for post-hoc debugging
    async fn capture_diagnostic(&self, tag: &str) -> Result<PathBuf, CourierError>;

    /// Text rendering of the current UI, if the session can produce one
    async fn snapshot(&self) -> Result<Option<String>, CourierError> {
        Ok(None)
    }

    /// Monotonic counter that changes whenever the UI changes, if the session tracks one
    fn revision(&self) -> Option<u64> {
        None
    }
}
