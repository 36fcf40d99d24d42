//! Plan compilation
//!
//! A [`Plan`] is the layout-independent description of what to do: five abstract
//! actions built purely from a [`TaskRequest`] and a [`ProviderVocabulary`]. Nothing in
//! here touches a live UI.

use crate::errors::CourierError;
use crate::parser::TaskRequest;
use crate::selector::{ControlSelector, FieldSelector, Selector};
use crate::vocabulary::{ProviderVocabulary, VocabularyTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AbstractAction {
    Activate { selector: ControlSelector },
    Fill { selector: FieldSelector, value: String },
}

impl AbstractAction {
    pub fn selector(&self) -> Selector {
        match self {
            AbstractAction::Activate { selector } => Selector::Control(selector.clone()),
            AbstractAction::Fill { selector, .. } => Selector::Field(selector.clone()),
        }
    }

    /// Short verb used in logs and diagnostic tags.
    pub fn kind(&self) -> &'static str {
        match self {
            AbstractAction::Activate { .. } => "activate",
            AbstractAction::Fill { .. } => "fill",
        }
    }
}

impl std::fmt::Display for AbstractAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractAction::Activate { selector } => {
                write!(f, "Activate({} \"{}\")", selector.role, selector.name)
            }
            AbstractAction::Fill { selector, value } => {
                write!(f, "Fill(\"{}\", {value:?})", selector.label)
            }
        }
    }
}

/// Ordered actions for one task against one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub provider: String,
    pub actions: Vec<AbstractAction>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AbstractAction> {
        self.actions.iter()
    }
}

/// Emits open composer → fill recipient → fill subject → fill body → send.
pub fn compile(task: &TaskRequest, vocab: &ProviderVocabulary) -> Plan {
    let control = |name: &str| AbstractAction::Activate {
        selector: ControlSelector::new(vocab.control_role.as_str(), name),
    };
    let fill = |label: &str, value: &str| AbstractAction::Fill {
        selector: FieldSelector::new(label),
        value: value.to_string(),
    };

    let plan = Plan {
        provider: vocab.provider.clone(),
        actions: vec![
            control(&vocab.compose_control),
            fill(&vocab.to_field, &task.recipient),
            fill(&vocab.subject_field, &task.subject),
            fill(&vocab.body_field, &task.body),
            control(&vocab.send_control),
        ],
    };
    debug!(provider = %plan.provider, actions = plan.len(), "Compiled plan");
    plan
}

/// Looks the provider up first, so an unknown provider fails before anything else.
pub fn compile_for(
    task: &TaskRequest,
    provider_id: &str,
    table: &VocabularyTable,
) -> Result<Plan, CourierError> {
    let vocab = table.lookup(provider_id)?;
    Ok(compile(task, vocab))
}

/// A selector label that could not be found in a UI snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWarning {
    pub index: usize,
    pub label: String,
}

impl std::fmt::Display for SnapshotWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "label \"{}\" (action #{}) not found in snapshot, may need adjustment",
            self.label, self.index
        )
    }
}

/// Advisory consistency check of a plan against a static UI snapshot.
///
/// Snapshots lag the interactive state (compose fields only exist after the composer
/// is open), so absences are reported as warnings and never fail compilation.
pub fn check_snapshot(plan: &Plan, snapshot: &str) -> Vec<SnapshotWarning> {
    let haystack = snapshot.to_lowercase();
    plan.iter()
        .enumerate()
        .filter_map(|(index, action)| {
            let selector = action.selector();
            let label = selector.label();
            if haystack.contains(&label.to_lowercase()) {
                None
            } else {
                let warning = SnapshotWarning {
                    index,
                    label: label.to_string(),
                };
                warn!(provider = %plan.provider, "{warning}");
                Some(warning)
            }
        })
        .collect()
}
