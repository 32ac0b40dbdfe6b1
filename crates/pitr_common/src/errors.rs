//! Tagged errors carried between components.

use crate::codes::Code;
use crate::exec::CommandError;
use thiserror::Error;

/// An error tagged with an outcome code, a short message and optional detail
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct PitrError {
    pub code: Code,
    pub message: String,
    pub detail: Option<String>,
}

impl PitrError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    /// Tag a command failure, keeping its description as detail
    pub fn from_command(code: Code, message: impl Into<String>, err: &CommandError) -> Self {
        Self::new(code, message).with_detail(err.to_string())
    }
}

pub type PitrResult<T> = std::result::Result<T, PitrError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::PITR_STOP_FAILED;

    #[test]
    fn test_empty_detail_is_dropped() {
        let err = PitrError::new(PITR_STOP_FAILED, "stop failed").with_detail("");
        assert_eq!(err.detail, None);
        assert_eq!(err.to_string(), "stop failed");
    }
}
