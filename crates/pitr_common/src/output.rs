//! Structured output formats shared by results and plans.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Yaml,
}

impl OutputFormat {
    pub fn is_structured(self) -> bool {
        self != OutputFormat::Text
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::JsonPretty => "json-pretty",
            OutputFormat::Yaml => "yaml",
        }
    }

    /// Serialize a value in a structured format. `Text` falls back to YAML,
    /// callers own their text rendering.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<String, String> {
        match self {
            OutputFormat::Json => serde_json::to_string(value).map_err(|e| e.to_string()),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            OutputFormat::Yaml | OutputFormat::Text => {
                serde_yaml::to_string(value).map_err(|e| e.to_string())
            }
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("JSON-PRETTY".parse::<OutputFormat>().unwrap(), OutputFormat::JsonPretty);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
