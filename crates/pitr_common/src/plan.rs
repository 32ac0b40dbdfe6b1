//! Execution plan document.
//!
//! A plan lists what a destructive command would do without doing it:
//! the equivalent command line, numbered actions, skipped steps, affected
//! resources, the expected outcome and known risks.

use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub step: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub impact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl Resource {
    pub fn new(kind: &str, name: impl Into<String>, impact: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.into(),
            impact: impact.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub command: String,
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    pub affects: Vec<Resource>,
    pub expected: String,
    pub risks: Vec<String>,
}

impl Plan {
    /// Append an action, numbering it after the existing ones
    pub fn push_action(&mut self, description: impl Into<String>) {
        let step = self.actions.len() + 1;
        self.actions.push(Action {
            step,
            description: description.into(),
        });
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Execution Plan");
        let _ = writeln!(out, "==============");
        let _ = writeln!(out);
        let _ = writeln!(out, "Command:  {}", self.command);
        let _ = writeln!(out);

        let _ = writeln!(out, "Actions:");
        for action in &self.actions {
            let _ = writeln!(out, "  {}. {}", action.step, action.description);
        }
        for skipped in &self.skipped {
            let _ = writeln!(out, "  [-] {}", skipped);
        }
        let _ = writeln!(out);

        if !self.affects.is_empty() {
            let _ = writeln!(out, "Affects:");
            let kind_w = self.affects.iter().map(|r| r.kind.len()).max().unwrap_or(0);
            let name_w = self.affects.iter().map(|r| r.name.len()).max().unwrap_or(0);
            let impact_w = self.affects.iter().map(|r| r.impact.len()).max().unwrap_or(0);
            for r in &self.affects {
                let line = format!(
                    "  {:<kind_w$}  {:<name_w$}  {:<impact_w$}  {}",
                    r.kind, r.name, r.impact, r.detail
                );
                let _ = writeln!(out, "{}", line.trim_end());
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "Expected: {}", self.expected);

        if !self.risks.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Risks:");
            for risk in &self.risks {
                let _ = writeln!(out, "  [!] {}", risk);
            }
        }
        out
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.to_text(),
            other => other
                .encode(self)
                .unwrap_or_else(|e| format!("plan render failed: {e}")),
        }
    }
}
