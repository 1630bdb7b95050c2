use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// OutcomesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomesConfig {
    /// Oldest log lines beyond this count are dropped after each append.
    #[serde(default = "default_max_outcomes")]
    pub max_entries: usize,
}

fn default_max_outcomes() -> usize {
    10_000
}

impl Default for OutcomesConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_outcomes(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_weight_min")]
    pub weight_min: f64,
    #[serde(default = "default_weight_max")]
    pub weight_max: f64,
}

fn default_template_min_samples() -> usize {
    5
}

fn default_weight_min() -> f64 {
    0.1
}

fn default_weight_max() -> f64 {
    2.0
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            min_samples: default_template_min_samples(),
            weight_min: default_weight_min(),
            weight_max: default_weight_max(),
        }
    }
}

impl TemplateConfig {
    /// `(weight_min, weight_max)`, or the default bounds when the configured
    /// pair is not a positive, non-empty range.
    pub fn weight_bounds(&self) -> (f64, f64) {
        let (min, max) = (self.weight_min, self.weight_max);
        if min.is_finite() && max.is_finite() && min > 0.0 && min < max {
            (min, max)
        } else {
            (default_weight_min(), default_weight_max())
        }
    }
}

// ---------------------------------------------------------------------------
// BucketConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_bucket_min_samples")]
    pub min_samples: usize,
}

fn default_bucket_min_samples() -> usize {
    50
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            min_samples: default_bucket_min_samples(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Only the trailing `window` validation entries are considered.
    #[serde(default = "default_validation_window")]
    pub window: usize,
    #[serde(default = "default_validation_min_samples")]
    pub min_samples: usize,
    /// Minimum |mean delta| before a correction is applied.
    #[serde(default = "default_validation_threshold")]
    pub threshold: f64,
    #[serde(default = "default_validation_factor")]
    pub factor: f64,
    #[serde(default = "default_validation_max_entries")]
    pub max_entries: usize,
}

fn default_validation_window() -> usize {
    50
}

fn default_validation_min_samples() -> usize {
    5
}

fn default_validation_threshold() -> f64 {
    1.0
}

fn default_validation_factor() -> f64 {
    0.3
}

fn default_validation_max_entries() -> usize {
    5_000
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            window: default_validation_window(),
            min_samples: default_validation_min_samples(),
            threshold: default_validation_threshold(),
            factor: default_validation_factor(),
            max_entries: default_validation_max_entries(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoutingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_cheap_model")]
    pub cheap_model: String,
    #[serde(default = "default_expensive_model")]
    pub expensive_model: String,
    #[serde(default = "default_min_cheap_samples")]
    pub min_cheap_samples: usize,
    /// Percentage (0-100) the cheap tier must reach to be recommended.
    #[serde(default = "default_cheap_success_threshold")]
    pub cheap_success_threshold: f64,
}

fn default_cheap_model() -> String {
    "sonnet".to_string()
}

fn default_expensive_model() -> String {
    "opus".to_string()
}

fn default_min_cheap_samples() -> usize {
    3
}

fn default_cheap_success_threshold() -> f64 {
    90.0
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cheap_model: default_cheap_model(),
            expensive_model: default_expensive_model(),
            min_cheap_samples: default_min_cheap_samples(),
            cheap_success_threshold: default_cheap_success_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Memory root holding per-repo stores; `~/.adapt/memory` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_prune_days")]
    pub prune_days: i64,
    #[serde(default = "default_strength_threshold")]
    pub strength_threshold: u32,
    #[serde(default = "default_boost_days")]
    pub boost_days: i64,
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: usize,
}

fn default_prune_days() -> i64 {
    30
}

fn default_strength_threshold() -> u32 {
    3
}

fn default_boost_days() -> i64 {
    7
}

fn default_promotion_threshold() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prune_days: default_prune_days(),
            strength_threshold: default_strength_threshold(),
            boost_days: default_boost_days(),
            promotion_threshold: default_promotion_threshold(),
        }
    }
}

impl MemoryConfig {
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(d) => Ok(d.clone()),
            None => paths::default_memory_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// CiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// Workflow-runs endpoint. CI metrics are skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name of the environment variable holding a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default = "default_ci_timeout")]
    pub timeout_secs: u64,
}

fn default_ci_timeout() -> u64 {
    5
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            url: None,
            token_env: None,
            timeout_secs: default_ci_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// TuningConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub outcomes: OutcomesConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub ci: CiConfig,
}

impl TuningConfig {
    /// Load `.adapt/config.yaml`. A missing file yields defaults; a file that
    /// fails to parse is an error so callers can decide how to degrade.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Like [`load`](Self::load) but never fails: unreadable config is
    /// reported and replaced by defaults.
    pub fn load_or_default(root: &Path) -> Self {
        match Self::load(root) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "invalid config.yaml, using defaults");
                Self::default()
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.template.weight_min <= 0.0 || self.template.weight_min >= self.template.weight_max
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "template weight bounds [{}, {}] are invalid",
                    self.template.weight_min, self.template.weight_max
                ),
            });
        }

        if self.routing.cheap_model == self.routing.expensive_model {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "routing.cheap_model and routing.expensive_model are both '{}'",
                    self.routing.cheap_model
                ),
            });
        }

        if !(0.0..=100.0).contains(&self.routing.cheap_success_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "routing.cheap_success_threshold={} must be a percentage",
                    self.routing.cheap_success_threshold
                ),
            });
        }

        if self.buckets.min_samples < 3 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "buckets.min_samples={} is too small to split into thirds",
                    self.buckets.min_samples
                ),
            });
        }

        if self.memory.prune_days < 0 || self.memory.boost_days < 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "memory.prune_days={} and memory.boost_days={} must not be negative",
                    self.memory.prune_days, self.memory.boost_days
                ),
            });
        }

        if self.memory.boost_days > self.memory.prune_days {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "memory.boost_days={} exceeds memory.prune_days={}",
                    self.memory.boost_days, self.memory.prune_days
                ),
            });
        }

        if self.outcomes.max_entries == 0 || self.validation.max_entries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "log caps must be greater than zero".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
