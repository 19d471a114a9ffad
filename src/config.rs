use serde::{Deserialize, Serialize};
use std::path::Path;
use std::fs;
use anyhow::{Context, Result};

/// How the command-line tool prints a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// RFC 4515 string.
    #[default]
    Text,
    /// Hex-encoded BER.
    Ber,
    /// Diagnostic JSON tree.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Output format: text, ber, json.
    #[serde(default)]
    pub output: OutputFormat,
    /// Exact-case attribute lookup when matching records (default true).
    #[serde(default = "default_strict_case")]
    pub strict_case: bool,
    /// Maximum parenthesis nesting accepted from input. Unlimited when unset.
    pub max_depth: Option<usize>,
}

fn default_strict_case() -> bool {
    true
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Read config {}", path.display()))?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        // An empty document is valid and means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputFormat::default(),
            strict_case: true,
            max_depth: None,
        }
    }
}
