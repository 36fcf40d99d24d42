//! Instruction parsing
//!
//! Turns a free-text instruction into a [`TaskRequest`]. The default [`PatternParser`]
//! accepts one fixed grammar:
//!
//! ```text
//! send [an] email to <address> about <subject> saying '<body>'
//! ```
//!
//! Anything richer belongs behind the [`InstructionParser`] trait.

use crate::errors::CourierError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static INSTRUCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*send\s+(?:an\s+)?e-?mail\s+to\s+(?P<to>\S+)\s+about\s+(?P<subject>.+?)\s+saying\s+(?:'(?P<sq>.+)'|"(?P<dq>.+)")\s*$"#,
    )
    .expect("instruction pattern is valid")
});

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<local>[A-Za-z0-9._%+-]+)@(?P<domain>[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+)$")
        .expect("address pattern is valid")
});

/// Structured parameters of a "send an email" task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Anything that can turn instruction text into a [`TaskRequest`].
pub trait InstructionParser: Send + Sync {
    fn parse(&self, instruction: &str) -> Result<TaskRequest, CourierError>;
}

/// Fixed-grammar parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternParser;

impl InstructionParser for PatternParser {
    fn parse(&self, instruction: &str) -> Result<TaskRequest, CourierError> {
        let caps = INSTRUCTION_RE.captures(instruction).ok_or_else(|| {
            CourierError::UnparseableInstruction(
                "expected: send email to <address> about <subject> saying '<body>'".to_string(),
            )
        })?;

        // Both alternatives are anchored, so exactly one of them matched.
        let body = caps
            .name("sq")
            .or_else(|| caps.name("dq"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let subject = caps["subject"].trim().to_string();
        let recipient = normalize_address(&caps["to"])?;

        if subject.is_empty() {
            return Err(unparseable("subject is empty"));
        }
        if body.trim().is_empty() {
            return Err(unparseable("body is empty"));
        }
        reject_control_chars("recipient", &recipient, &[])?;
        reject_control_chars("subject", &subject, &[])?;
        reject_control_chars("body", &body, &['\n', '\t'])?;

        Ok(TaskRequest {
            recipient,
            subject,
            body,
        })
    }
}

/// Parses with the default [`PatternParser`].
pub fn parse(instruction: &str) -> Result<TaskRequest, CourierError> {
    PatternParser.parse(instruction)
}

fn unparseable(reason: impl Into<String>) -> CourierError {
    CourierError::UnparseableInstruction(reason.into())
}

/// Validates the address shape and lowercases the domain; the local part is kept as
/// written since it may be case-sensitive.
fn normalize_address(raw: &str) -> Result<String, CourierError> {
    let malformed = || unparseable(format!("malformed recipient address '{raw}'"));
    let caps = ADDRESS_RE.captures(raw).ok_or_else(malformed)?;
    let local = &caps["local"];
    let domain = &caps["domain"];

    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(malformed());
    }
    if domain
        .split('.')
        .any(|label| label.starts_with('-') || label.ends_with('-'))
    {
        return Err(malformed());
    }

    Ok(format!("{local}@{}", domain.to_ascii_lowercase()))
}

fn reject_control_chars(field: &str, value: &str, allowed: &[char]) -> Result<(), CourierError> {
    match value
        .chars()
        .find(|c| c.is_control() && !allowed.contains(c))
    {
        Some(c) => Err(unparseable(format!(
            "{field} contains control character U+{:04X}",
            c as u32
        ))),
        None => Ok(()),
    }
}
