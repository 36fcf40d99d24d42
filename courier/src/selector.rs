use serde::{Deserialize, Serialize};

/// Selects a control (something you activate) by role and accessible name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlSelector {
    pub role: String,
    pub name: String,
}

impl ControlSelector {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
        }
    }
}

/// Selects an input field by its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSelector {
    pub label: String,
}

impl FieldSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Represents ways to locate a UI element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// Select by role and name
    Control(ControlSelector),
    /// Select by field label
    Field(FieldSelector),
    /// Represents an invalid selector string, with a reason.
    Invalid { reason: String },
}

impl Selector {
    /// The human-readable text this selector matches against.
    pub fn label(&self) -> &str {
        match self {
            Selector::Control(c) => &c.name,
            Selector::Field(f) => &f.label,
            Selector::Invalid { .. } => "",
        }
    }
}

impl From<ControlSelector> for Selector {
    fn from(selector: ControlSelector) -> Self {
        Selector::Control(selector)
    }
}

impl From<FieldSelector> for Selector {
    fn from(selector: FieldSelector) -> Self {
        Selector::Field(selector)
    }
}

impl std::fmt::Display for ControlSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "role:{}|name:{}", self.role, self.name)
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "label:{}", self.label)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Control(c) => c.fmt(f),
            Selector::Field(l) => l.fmt(f),
            Selector::Invalid { reason } => write!(f, "invalid:{reason}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // role|name, with optional role:/name: prefixes (preferred precise format)
        if let Some((role_part, name_part)) = s.split_once('|') {
            let role = role_part.trim();
            let role = role.strip_prefix("role:").unwrap_or(role).trim();
            let name = name_part.trim();
            let name = name.strip_prefix("name:").unwrap_or(name).trim();
            if role.is_empty() || name.is_empty() {
                return Selector::Invalid {
                    reason: format!("Both role and name are required in \"{s}\""),
                };
            }
            return Selector::Control(ControlSelector::new(role, name));
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("label:") => {
                let label = s["label:".len()..].trim();
                if label.is_empty() {
                    Selector::Invalid {
                        reason: "Empty label selector".to_string(),
                    }
                } else {
                    Selector::Field(FieldSelector::new(label))
                }
            }
            // Buttons are the common case, so a bare name: selects a button
            _ if lower.starts_with("name:") => {
                let name = s["name:".len()..].trim();
                if name.is_empty() {
                    Selector::Invalid {
                        reason: "Empty name selector".to_string(),
                    }
                } else {
                    Selector::Control(ControlSelector::new("button", name))
                }
            }
            _ if lower.starts_with("role:") => Selector::Invalid {
                reason: format!("Role selector \"{s}\" needs a name, e.g. role:button|name:Send"),
            },
            _ => Selector::Invalid {
                reason: format!(
                    "Unknown selector format: \"{s}\". Use 'role:<role>|name:<name>', 'name:<name>' or 'label:<label>'."
                ),
            },
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compares an element's text against a wanted label.
///
/// Exact matching compares whitespace-normalized text. Fuzzy matching is
/// case-insensitive and accepts the wanted label anywhere inside the candidate, which
/// absorbs decorations like "Send (Ctrl+Enter)" or "To recipients".
pub fn text_matches(candidate: &str, wanted: &str, fuzzy: bool) -> bool {
    let candidate = normalize_whitespace(candidate);
    let wanted = normalize_whitespace(wanted);
    if wanted.is_empty() {
        return false;
    }
    if fuzzy {
        candidate.to_lowercase().contains(&wanted.to_lowercase())
    } else {
        candidate == wanted
    }
}
