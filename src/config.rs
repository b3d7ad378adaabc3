//! Engine configuration
//!
//! Everything has a default matching the behavior of the original platform,
//! so `EngineConfig::default()` is a valid configuration. A JSON document may
//! override any subset of the fields:
//!
//! ```json
//! {
//!   "generation": { "policy": "skip_existing" },
//!   "stats": { "completion_rule": "strict" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// What to do when a module that already has exercises is generated again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPolicy {
    /// Add another full set next to the existing one
    #[default]
    Append,
    /// Leave the module untouched if it has any exercise
    SkipExisting,
    /// Drop the existing set and build a new one
    Replace,
}

impl FromStr for RegenerationPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "skip_existing" | "skip" => Ok(Self::SkipExisting),
            "replace" => Ok(Self::Replace),
            other => Err(CoreError::Config(format!("unknown regeneration policy: {}", other))),
        }
    }
}

/// How `modules_completed` is derived in student reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRule {
    /// A module counts as completed once any of its exercises was attempted.
    /// Same number as `modules_attempted`.
    #[default]
    Attempted,
    /// A module counts only when every exercise has a correct attempt
    Strict,
}

impl FromStr for CompletionRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attempted" => Ok(Self::Attempted),
            "strict" => Ok(Self::Strict),
            other => Err(CoreError::Config(format!("unknown completion rule: {}", other))),
        }
    }
}

/// Prompt templates, `{word}` is replaced by the word being asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionTemplates {
    pub english_prompt: String,
    pub russian_prompt: String,
}

impl Default for QuestionTemplates {
    fn default() -> Self {
        Self {
            english_prompt: "What is the translation of: {word}?".to_string(),
            russian_prompt: "Как переводится: {word}?".to_string(),
        }
    }
}

impl QuestionTemplates {
    pub fn english_question(&self, word: &str) -> String {
        self.english_prompt.replace("{word}", word)
    }

    pub fn russian_question(&self, word: &str) -> String {
        self.russian_prompt.replace("{word}", word)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub policy: RegenerationPolicy,
    pub templates: QuestionTemplates,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub completion_rule: CompletionRule,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub generation: GenerationConfig,
    pub stats: StatsConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}
