pub mod analyze;
pub mod capture;
pub mod evolve;
pub mod recommend;
pub mod report;
pub mod tune;

use adapt_core::config::{TuningConfig, WarnLevel};
use std::path::PathBuf;

/// Global flags shared by every command.
pub struct Context {
    pub root: PathBuf,
    pub memory_dir: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    /// Load `.adapt/config.yaml` and surface validation warnings on stderr.
    pub fn config(&self) -> TuningConfig {
        let cfg = TuningConfig::load_or_default(&self.root);
        for w in cfg.validate() {
            let tag = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            eprintln!("config {tag}: {}", w.message);
        }
        cfg
    }

    /// `--memory-dir` first, then `memory.dir` from config, then the home default.
    pub fn memory_dir(&self, cfg: &TuningConfig) -> anyhow::Result<PathBuf> {
        match &self.memory_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(cfg.memory.resolve_dir()?),
        }
    }
}
