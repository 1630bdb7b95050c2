use crate::error::{AdaptError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ADAPT_DIR: &str = ".adapt";
pub const MODELS_DIR: &str = ".adapt/models";

pub const CONFIG_FILE: &str = ".adapt/config.yaml";
pub const OUTCOMES_FILE: &str = ".adapt/outcomes.jsonl";
pub const VALIDATION_FILE: &str = ".adapt/prediction-validation.jsonl";
pub const EVENTS_FILE: &str = ".adapt/events.jsonl";

pub const TEMPLATE_WEIGHTS_FILE: &str = "template-weights.json";
pub const ITERATION_MODEL_FILE: &str = "iteration-model.json";
pub const MODEL_ROUTING_FILE: &str = "model-routing.json";
pub const RISK_KEYWORDS_FILE: &str = "risk-keywords.json";
pub const COMPLEXITY_CLUSTERS_FILE: &str = "complexity-clusters.json";

pub const FAILURES_FILE: &str = "failures.json";
pub const GLOBAL_PATTERNS_FILE: &str = "global.json";

/// Default memory root, relative to the user's home directory.
pub const HOME_MEMORY_DIR: &str = ".adapt/memory";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn outcomes_path(root: &Path) -> PathBuf {
    root.join(OUTCOMES_FILE)
}

pub fn validation_path(root: &Path) -> PathBuf {
    root.join(VALIDATION_FILE)
}

pub fn events_path(root: &Path) -> PathBuf {
    root.join(EVENTS_FILE)
}

pub fn model_path(root: &Path, file: &str) -> PathBuf {
    root.join(MODELS_DIR).join(file)
}

pub fn repo_failures_path(memory_dir: &Path, repo: &str) -> PathBuf {
    memory_dir.join(repo).join(FAILURES_FILE)
}

pub fn global_patterns_path(memory_dir: &Path) -> PathBuf {
    memory_dir.join(GLOBAL_PATTERNS_FILE)
}

/// `~/.adapt/memory`, shared by every repository on the machine.
pub fn default_memory_dir() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(HOME_MEMORY_DIR))
        .ok_or(AdaptError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            outcomes_path(root),
            PathBuf::from("/tmp/proj/.adapt/outcomes.jsonl")
        );
        assert_eq!(
            model_path(root, TEMPLATE_WEIGHTS_FILE),
            PathBuf::from("/tmp/proj/.adapt/models/template-weights.json")
        );
        assert_eq!(
            repo_failures_path(Path::new("/m"), "api"),
            PathBuf::from("/m/api/failures.json")
        );
    }
}
