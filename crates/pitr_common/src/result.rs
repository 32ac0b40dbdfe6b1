//! Structured operation outcome.
//!
//! Every command ends with an `Outcome`: success flag, code, message,
//! optional detail and an optional data payload. The exit status of the
//! process is derived from the code.

use crate::codes::Code;
use crate::errors::PitrError;
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub code: Code,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Code::SUCCESS,
            message: message.into(),
            detail: None,
            data: None,
        }
    }

    pub fn fail(code: Code, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            detail: None,
            data: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = if detail.is_empty() { None } else { Some(detail) };
        self
    }

    /// Attach a payload. Serialization failures leave the payload empty.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            // a failed outcome never exits 0, even with a category-0 code
            match self.code.exit_code() {
                0 => 1,
                n => n,
            }
        }
    }

    /// Text form: one status line plus detail
    pub fn to_text(&self) -> String {
        let mut out = if self.success {
            format!("[OK] {}", self.message)
        } else {
            format!("[ERROR] {} (code {})", self.message, self.code)
        };
        if let Some(detail) = &self.detail {
            out.push_str("\n  ");
            out.push_str(detail);
        }
        out
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.to_text(),
            other => other
                .encode(self)
                .unwrap_or_else(|e| format!("{{\"success\":false,\"message\":\"render failed: {e}\"}}")),
        }
    }
}

impl From<PitrError> for Outcome {
    fn from(err: PitrError) -> Self {
        let outcome = Outcome::fail(err.code, err.message);
        match err.detail {
            Some(detail) => outcome.with_detail(detail),
            None => outcome,
        }
    }
}
