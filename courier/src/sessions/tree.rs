//! In-memory UI tree session
//!
//! A [`TreeSession`] drives a [`UiNode`] tree instead of a browser. The tree can be
//! loaded from JSON, which makes it the session of choice for dry runs against a
//! recorded page and for tests. Clicking a node makes the nodes listed in its
//! `reveals` visible, and nodes with `reveal_after_ms` appear on their own after that
//! much session time, so asynchronous re-rendering can be reproduced.

use crate::errors::CourierError;
use crate::selector::text_matches;
use crate::session::{ElementHandle, UiSession};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument};

const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(50);

const EDITABLE_ROLES: &[&str] = &[
    "textbox", "textfield", "textarea", "input", "edit", "combobox", "searchbox", "document",
];

fn default_true() -> bool {
    true
}

/// Represents a node in the UI tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the role-based guess of whether the node accepts text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    /// Node becomes visible this long after the session started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_after_ms: Option<u64>,
    /// Ids of nodes made visible when this node is clicked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reveals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            id: None,
            role: role.into(),
            name: None,
            label: None,
            value: None,
            visible: true,
            enabled: true,
            editable: None,
            reveal_after_ms: None,
            reveals: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn revealing(mut self, ids: &[&str]) -> Self {
        self.reveals = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn appearing_after(mut self, after: Duration) -> Self {
        self.visible = false;
        self.reveal_after_ms = Some(after.as_millis() as u64);
        self
    }

    pub fn with_children(mut self, children: Vec<UiNode>) -> Self {
        self.children = children;
        self
    }

    pub fn is_editable(&self) -> bool {
        self.editable.unwrap_or_else(|| {
            EDITABLE_ROLES
                .iter()
                .any(|role| self.role.eq_ignore_ascii_case(role))
        })
    }

    fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.label.clone())
            .unwrap_or_else(|| self.role.clone())
    }

    fn node_at(&self, path: &[usize]) -> Option<&UiNode> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get(*first)?.node_at(rest),
        }
    }

    fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut UiNode> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get_mut(*first)?.node_at_mut(rest),
        }
    }
}

/// An interaction the session performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Clicked { element: String },
    Filled { element: String, value: String },
}

#[derive(Debug)]
struct TreeState {
    root: UiNode,
    revision: u64,
    events: Vec<SessionEvent>,
}

#[derive(Serialize)]
struct DiagnosticDump<'a> {
    tag: &'a str,
    revision: u64,
    events: &'a [SessionEvent],
    tree: &'a UiNode,
}

/// [`UiSession`] over an in-memory [`UiNode`] tree.
#[derive(Debug)]
pub struct TreeSession {
    state: Mutex<TreeState>,
    started: Instant,
    diagnostics_dir: Option<PathBuf>,
}

impl TreeSession {
    pub fn new(root: UiNode) -> Self {
        Self {
            state: Mutex::new(TreeState {
                root,
                revision: 0,
                events: Vec::new(),
            }),
            started: Instant::now(),
            diagnostics_dir: None,
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self, CourierError> {
        Ok(Self::new(serde_json::from_str(source)?))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CourierError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&source)
    }

    /// Directory diagnostic dumps are written to; without one, captures fail.
    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    /// A copy of the tree in its current state.
    pub fn tree(&self) -> Option<UiNode> {
        self.lock().ok().map(|s| s.root.clone())
    }

    /// Current value of the first editable node matching `label`.
    pub fn value_of(&self, label: &str) -> Option<String> {
        let state = self.lock().ok()?;
        let path = find_matches(&state.root, &|n| field_matches(n, label, true))
            .into_iter()
            .next()?;
        let value = state.root.node_at(&path)?.value.clone();
        value
    }

    fn lock(&self) -> Result<MutexGuard<'_, TreeState>, CourierError> {
        self.state
            .lock()
            .map_err(|_| CourierError::Platform("UI tree lock poisoned".to_string()))
    }

    fn revealed_by_time(&self, node: &UiNode) -> bool {
        node.reveal_after_ms
            .is_some_and(|ms| self.started.elapsed() >= Duration::from_millis(ms))
    }

    /// A node is shown when it and every ancestor is visible.
    fn is_shown(&self, root: &UiNode, path: &[usize]) -> bool {
        let mut node = root;
        if !(node.visible || self.revealed_by_time(node)) {
            return false;
        }
        for index in path {
            match node.children.get(*index) {
                Some(child) => node = child,
                None => return false,
            }
            if !(node.visible || self.revealed_by_time(node)) {
                return false;
            }
        }
        true
    }

    fn resolve(
        &self,
        what: String,
        predicate: &dyn Fn(&UiNode) -> bool,
    ) -> Result<ElementHandle, CourierError> {
        let state = self.lock()?;
        let matches = find_matches(&state.root, predicate);
        // Prefer something on screen; fall back to a hidden match so the caller can
        // wait for it to appear.
        let path = matches
            .iter()
            .find(|path| self.is_shown(&state.root, path))
            .or_else(|| matches.first())
            .ok_or_else(|| CourierError::ElementNotFound(what.clone()))?;
        let node = state
            .root
            .node_at(path)
            .ok_or_else(|| CourierError::ElementNotFound(what.clone()))?;
        debug!("Resolved {what} at {}", path_id(path));
        Ok(ElementHandle::new(
            path_id(path),
            format!("{} \"{}\"", node.role, node.display_name()),
        ))
    }

    /// Returns the node path for an interactable handle.
    fn interactable(
        &self,
        state: &TreeState,
        handle: &ElementHandle,
    ) -> Result<Vec<usize>, CourierError> {
        let path = parse_path_id(&handle.id)
            .filter(|p| state.root.node_at(p).is_some())
            .ok_or_else(|| CourierError::ElementNotFound(format!("stale handle {handle}")))?;
        if !self.is_shown(&state.root, &path) {
            return Err(CourierError::ElementNotVisible(handle.to_string()));
        }
        let enabled = state.root.node_at(&path).is_some_and(|n| n.enabled);
        if !enabled {
            return Err(CourierError::ElementNotEnabled(handle.to_string()));
        }
        Ok(path)
    }
}

fn control_matches(node: &UiNode, role: &str, name: &str, fuzzy: bool) -> bool {
    node.role.eq_ignore_ascii_case(role)
        && node
            .name
            .as_deref()
            .is_some_and(|n| text_matches(n, name, fuzzy))
}

fn field_matches(node: &UiNode, label: &str, fuzzy: bool) -> bool {
    node.is_editable()
        && node
            .label
            .as_deref()
            .or(node.name.as_deref())
            .is_some_and(|l| text_matches(l, label, fuzzy))
}

/// Depth-first, document order.
fn find_matches(root: &UiNode, predicate: &dyn Fn(&UiNode) -> bool) -> Vec<Vec<usize>> {
    fn walk(
        node: &UiNode,
        path: &mut Vec<usize>,
        predicate: &dyn Fn(&UiNode) -> bool,
        out: &mut Vec<Vec<usize>>,
    ) {
        if predicate(node) {
            out.push(path.clone());
        }
        for (i, child) in node.children.iter().enumerate() {
            path.push(i);
            walk(child, path, predicate, out);
            path.pop();
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), predicate, &mut out);
    out
}

fn reveal_ids(node: &mut UiNode, ids: &[String]) -> usize {
    let mut count = 0;
    if node.id.as_ref().is_some_and(|id| ids.contains(id)) && !node.visible {
        node.visible = true;
        count += 1;
    }
    for child in node.children.iter_mut() {
        count += reveal_ids(child, ids);
    }
    count
}

fn path_id(path: &[usize]) -> String {
    let parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
    format!("n{}", parts.join("."))
}

fn parse_path_id(id: &str) -> Option<Vec<usize>> {
    let rest = id.strip_prefix('n')?;
    if rest.is_empty() {
        return Some(Vec::new());
    }
    rest.split('.').map(|p| p.parse().ok()).collect()
}

fn render(node: &UiNode, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.role);
    for text in [&node.name, &node.label, &node.value].into_iter().flatten() {
        out.push_str(&format!(" \"{text}\""));
    }
    out.push('\n');
    for child in &node.children {
        render(child, depth + 1, out);
    }
}

#[async_trait::async_trait]
impl UiSession for TreeSession {
    async fn resolve_control(
        &self,
        role: &str,
        name: &str,
        fuzzy: bool,
    ) -> Result<ElementHandle, CourierError> {
        self.resolve(format!("role:{role}|name:{name}"), &|n| {
            control_matches(n, role, name, fuzzy)
        })
    }

    async fn resolve_field(
        &self,
        label: &str,
        fuzzy: bool,
    ) -> Result<ElementHandle, CourierError> {
        self.resolve(format!("label:{label}"), &|n| field_matches(n, label, fuzzy))
    }

    #[instrument(level = "debug", skip(self))]
    async fn wait_visible(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), CourierError> {
        let deadline = Instant::now() + timeout;
        let path = parse_path_id(&handle.id)
            .ok_or_else(|| CourierError::ElementNotFound(format!("stale handle {handle}")))?;
        loop {
            {
                let state = self.lock()?;
                if state.root.node_at(&path).is_none() {
                    return Err(CourierError::ElementNotFound(format!("stale handle {handle}")));
                }
                let enabled = state.root.node_at(&path).is_some_and(|n| n.enabled);
                if enabled && self.is_shown(&state.root, &path) {
                    return Ok(());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CourierError::Timeout(format!(
                    "{handle} not visible and enabled after {timeout:?}"
                )));
            }
            sleep(VISIBILITY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn click(&self, handle: &ElementHandle) -> Result<(), CourierError> {
        let mut state = self.lock()?;
        let path = self.interactable(&state, handle)?;
        let reveals = state
            .root
            .node_at(&path)
            .map(|n| n.reveals.clone())
            .unwrap_or_default();
        let revealed = reveal_ids(&mut state.root, &reveals);
        state.revision += 1;
        state.events.push(SessionEvent::Clicked {
            element: handle.description.clone(),
        });
        debug!("Clicked {handle}, revealed {revealed} node(s)");
        Ok(())
    }

    async fn set_value(&self, handle: &ElementHandle, text: &str) -> Result<(), CourierError> {
        let mut state = self.lock()?;
        let path = self.interactable(&state, handle)?;
        let node = state
            .root
            .node_at_mut(&path)
            .ok_or_else(|| CourierError::ElementNotFound(handle.to_string()))?;
        if !node.is_editable() {
            return Err(CourierError::Platform(format!(
                "{handle} does not accept text input"
            )));
        }
        node.value = Some(text.to_string());
        state.revision += 1;
        state.events.push(SessionEvent::Filled {
            element: handle.description.clone(),
            value: text.to_string(),
        });
        Ok(())
    }

    async fn capture_diagnostic(&self, tag: &str) -> Result<PathBuf, CourierError> {
        let dir = self.diagnostics_dir.as_ref().ok_or_else(|| {
            CourierError::Config("no diagnostics directory configured".to_string())
        })?;
        let json = {
            let state = self.lock()?;
            let json = serde_json::to_string_pretty(&DiagnosticDump {
                tag,
                revision: state.revision,
                events: &state.events,
                tree: &state.root,
            })?;
            json
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{tag}.json"));
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    async fn snapshot(&self) -> Result<Option<String>, CourierError> {
        let state = self.lock()?;
        let mut out = String::new();
        render(&state.root, 0, &mut out);
        Ok(Some(out))
    }

    fn revision(&self) -> Option<u64> {
        self.lock().ok().map(|s| s.revision)
    }
}
