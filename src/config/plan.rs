//! Warmup plan files
//!
//! A plan is the options and task list for one run, stored as YAML or JSON:
//!
//! ```yaml
//! options:
//!   timeout_ms: 5000
//!   max_bind_attempts: 10
//! tasks:
//!   - /health
//!   - path: /search?q=warm
//!     timeout_ms: 2000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use super::WarmupOptions;
use crate::error::WarmupError;
use crate::task::WarmupTaskSpec;

/// Options plus the raw task list of a plan file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmupPlan {
    #[serde(default)]
    pub options: WarmupOptions,

    /// Strings or objects; validated by [`WarmupPlan::task_specs`]
    #[serde(default)]
    pub tasks: Vec<Value>,
}

impl WarmupPlan {
    /// Load a plan from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

        let plan: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML plan: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON plan: {}", path.display()))?
        };

        Ok(plan)
    }

    /// Typed task specs, failing on the first malformed entry
    pub fn task_specs(&self) -> Result<Vec<WarmupTaskSpec>, WarmupError> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, value)| WarmupTaskSpec::from_value(index, value))
            .collect()
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}
