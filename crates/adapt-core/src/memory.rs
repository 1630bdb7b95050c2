//! Failure memory: per-repository failure patterns and their evolution.
//!
//! Layout (memory root defaults to `~/.adapt/memory`):
//!   <memory>/<repo>/failures.json   failure entries for one repository
//!   <memory>/global.json            patterns promoted across repositories
//!
//! Evolution prunes stale entries, strengthens recurring recent ones, and
//! promotes patterns that recur often enough across all stores.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const MAX_PATTERN_CHARS: usize = 200;
pub const STRENGTH_MULTIPLIER: f64 = 1.5;
pub const PROMOTION_SOURCE: &str = "cross-repo";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub pattern: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub fix: String,
    #[serde(default = "one")]
    pub seen_count: u32,
    pub last_seen: DateTime<Utc>,
    #[serde(default = "neutral_weight")]
    pub weight: f64,
}

fn one() -> u32 {
    1
}

fn neutral_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureStore {
    #[serde(default)]
    pub failures: Vec<FailureEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotedPattern {
    pub pattern: String,
    pub promoted_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStore {
    #[serde(default)]
    pub patterns: Vec<PromotedPattern>,
}

impl FailureStore {
    /// `Ok(None)` when the repository has no store yet.
    pub fn load(memory_dir: &Path, repo: &str) -> Result<Option<Self>> {
        io::read_json(&paths::repo_failures_path(memory_dir, repo))
    }

    pub fn save(&self, memory_dir: &Path, repo: &str) -> Result<()> {
        io::write_json(&paths::repo_failures_path(memory_dir, repo), self)
    }
}

impl GlobalStore {
    pub fn load(memory_dir: &Path) -> Self {
        io::load_json_or_default(&paths::global_patterns_path(memory_dir))
    }

    pub fn save(&self, memory_dir: &Path) -> Result<()> {
        io::write_json(&paths::global_patterns_path(memory_dir), self)
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p.pattern == pattern)
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// First non-empty line of an error, trimmed and cut to 200 characters.
pub fn pattern_from_error(error: &str) -> Option<String> {
    let line = error.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.chars().take(MAX_PATTERN_CHARS).collect())
}

/// Record a failure in a repository's store. An existing entry with the same
/// pattern is bumped; otherwise a new one is appended.
pub fn capture_failure(
    memory_dir: &Path,
    repo: &str,
    stage: &str,
    error: &str,
    now: DateTime<Utc>,
) -> Result<Option<FailureEntry>> {
    let Some(pattern) = pattern_from_error(error) else {
        return Ok(None);
    };
    let mut store = FailureStore::load(memory_dir, repo)?.unwrap_or_default();
    let entry = match store.failures.iter_mut().find(|f| f.pattern == pattern) {
        Some(existing) => {
            existing.seen_count += 1;
            existing.last_seen = now;
            if existing.stage.is_empty() {
                existing.stage = stage.to_string();
            }
            existing.clone()
        }
        None => {
            let entry = FailureEntry {
                pattern,
                stage: stage.to_string(),
                root_cause: String::new(),
                fix: String::new(),
                seen_count: 1,
                last_seen: now,
                weight: neutral_weight(),
            };
            store.failures.push(entry.clone());
            entry
        }
    };
    store.save(memory_dir, repo)?;
    tracing::info!(repo, seen = entry.seen_count, "failure captured");
    Ok(Some(entry))
}

// ---------------------------------------------------------------------------
// Evolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoEvolution {
    pub repo: String,
    pub pruned: usize,
    pub strengthened: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvolutionReport {
    pub repos: Vec<RepoEvolution>,
    /// Repositories whose store could not be read and was left untouched.
    pub skipped: Vec<String>,
    /// Repositories whose evolved store could not be written back.
    pub failed: Vec<String>,
    pub promoted: Vec<String>,
}

/// Start of a trailing window of `days`. `None` for a negative window; a
/// window reaching past the representable range starts at the earliest time.
fn window_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days < 0 {
        return None;
    }
    Some(
        Duration::try_days(days)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

/// Prune and strengthen one store in place. Returns (pruned, strengthened).
pub fn evolve_store(
    store: &mut FailureStore,
    cfg: &MemoryConfig,
    now: DateTime<Utc>,
) -> (usize, usize) {
    let before = store.failures.len();
    if let Some(cutoff) = window_start(now, cfg.prune_days) {
        store.failures.retain(|f| f.last_seen >= cutoff);
    }
    let pruned = before - store.failures.len();

    let boost_cutoff = window_start(now, cfg.boost_days);
    let mut strengthened = 0;
    for f in &mut store.failures {
        let recent = boost_cutoff.is_some_and(|cutoff| f.last_seen >= cutoff);
        if f.seen_count >= cfg.strength_threshold && recent {
            f.weight *= STRENGTH_MULTIPLIER;
            strengthened += 1;
        }
    }
    (pruned, strengthened)
}

/// Patterns whose raw occurrence count across all stores reaches
/// `threshold`. Occurrences are not deduplicated per repository.
pub fn promotion_candidates<'a>(
    stores: impl IntoIterator<Item = &'a FailureStore>,
    threshold: usize,
) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for store in stores {
        for f in &store.failures {
            *counts.entry(f.pattern.as_str()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= threshold)
        .map(|(p, _)| p.to_string())
        .collect()
}

/// Repository names under the memory root that have a failure store.
pub fn list_repos(memory_dir: &Path) -> Result<Vec<String>> {
    if !memory_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut repos = Vec::new();
    for entry in std::fs::read_dir(memory_dir)? {
        let entry = entry?;
        let path: PathBuf = entry.path();
        if path.is_dir() && path.join(paths::FAILURES_FILE).is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                repos.push(name.to_string());
            }
        }
    }
    repos.sort();
    Ok(repos)
}

/// Run one evolution pass over every repository store under `memory_dir`.
pub fn evolve(memory_dir: &Path, cfg: &MemoryConfig, now: DateTime<Utc>) -> Result<EvolutionReport> {
    let mut report = EvolutionReport::default();
    let mut stores = Vec::new();

    for repo in list_repos(memory_dir)? {
        let mut store = match FailureStore::load(memory_dir, &repo) {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "unreadable failure store, skipping");
                report.skipped.push(repo);
                continue;
            }
        };
        let (pruned, strengthened) = evolve_store(&mut store, cfg, now);
        if pruned > 0 || strengthened > 0 {
            if let Err(e) = store.save(memory_dir, &repo) {
                tracing::warn!(repo = %repo, error = %e, "failed to write failure store, leaving it unchanged");
                report.failed.push(repo);
                continue;
            }
        }
        tracing::debug!(repo = %repo, pruned, strengthened, "failure store evolved");
        report.repos.push(RepoEvolution {
            repo,
            pruned,
            strengthened,
            remaining: store.failures.len(),
        });
        stores.push(store);
    }

    // A corrupt global store is never overwritten; promotion waits for repair.
    let mut global = match io::read_json::<GlobalStore>(&paths::global_patterns_path(memory_dir)) {
        Ok(g) => g.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "unreadable global pattern store, skipping promotion");
            return Ok(report);
        }
    };
    let mut seen: HashSet<String> = global.patterns.iter().map(|p| p.pattern.clone()).collect();
    for pattern in promotion_candidates(&stores, cfg.promotion_threshold) {
        if !seen.insert(pattern.clone()) {
            continue;
        }
        global.patterns.push(PromotedPattern {
            pattern: pattern.clone(),
            promoted_at: now,
            source: PROMOTION_SOURCE.to_string(),
        });
        report.promoted.push(pattern);
    }
    if !report.promoted.is_empty() {
        global.save(memory_dir)?;
    }

    tracing::info!(
        repos = report.repos.len(),
        promoted = report.promoted.len(),
        "memory evolution complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(pattern: &str, seen_count: u32, age_days: i64, now: DateTime<Utc>) -> FailureEntry {
        FailureEntry {
            pattern: pattern.to_string(),
            stage: "build".to_string(),
            root_cause: String::new(),
            fix: String::new(),
            seen_count,
            last_seen: now - Duration::days(age_days),
            weight: 1.0,
        }
    }

    #[test]
    fn prunes_stale_entries() {
        let now = Utc::now();
        let mut store = FailureStore {
            failures: vec![entry("old", 1, 31, now), entry("recent", 1, 29, now)],
        };
        let (pruned, _) = evolve_store(&mut store, &MemoryConfig::default(), now);
        assert_eq!(pruned, 1);
        assert_eq!(store.failures.len(), 1);
        assert_eq!(store.failures[0].pattern, "recent");
    }

    #[test]
    fn strengthening_compounds() {
        let now = Utc::now();
        let mut store = FailureStore {
            failures: vec![entry("hot", 3, 2, now), entry("rare", 2, 2, now), entry("cold", 5, 10, now)],
        };
        let cfg = MemoryConfig::default();
        let (_, strengthened) = evolve_store(&mut store, &cfg, now);
        assert_eq!(strengthened, 1);
        assert!((store.failures[0].weight - 1.5).abs() < 1e-9);
        evolve_store(&mut store, &cfg, now);
        assert!((store.failures[0].weight - 2.25).abs() < 1e-9);
        assert_eq!(store.failures[1].weight, 1.0);
        assert_eq!(store.failures[2].weight, 1.0);
    }

    #[test]
    fn promotion_counts_raw_occurrences() {
        let now = Utc::now();
        let single_repo = FailureStore {
            failures: vec![entry("dup", 1, 0, now); 3],
        };
        assert_eq!(
            promotion_candidates([&single_repo], 3),
            vec!["dup".to_string()]
        );
        let a = FailureStore {
            failures: vec![entry("x", 1, 0, now)],
        };
        assert!(promotion_candidates([&a, &a], 3).is_empty());
    }

    #[test]
    fn pattern_is_first_line_truncated() {
        let long = format!("\n  {}\nsecond", "e".repeat(300));
        let p = pattern_from_error(&long).unwrap();
        assert_eq!(p.chars().count(), 200);
        assert!(pattern_from_error("  \n \n").is_none());
    }

    #[test]
    fn capture_bumps_existing_pattern() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        capture_failure(dir.path(), "api", "test", "panic at main.rs\nbacktrace", now).unwrap();
        let e = capture_failure(dir.path(), "api", "test", "panic at main.rs", now)
            .unwrap()
            .unwrap();
        assert_eq!(e.seen_count, 2);
        let store = FailureStore::load(dir.path(), "api").unwrap().unwrap();
        assert_eq!(store.failures.len(), 1);
    }

    #[test]
    fn evolve_promotes_across_repos_once() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        for repo in ["api", "web", "cli"] {
            FailureStore {
                failures: vec![entry("linker error", 1, 1, now), entry(repo, 1, 1, now)],
            }
            .save(dir.path(), repo)
            .unwrap();
        }
        let cfg = MemoryConfig::default();
        let report = evolve(dir.path(), &cfg, now).unwrap();
        assert_eq!(report.repos.len(), 3);
        assert_eq!(report.promoted, vec!["linker error".to_string()]);

        let again = evolve(dir.path(), &cfg, now).unwrap();
        assert!(again.promoted.is_empty());
        let global = GlobalStore::load(dir.path());
        assert_eq!(global.patterns.len(), 1);
        assert_eq!(global.patterns[0].source, "cross-repo");
    }

    #[test]
    fn evolve_skips_corrupt_store() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken/failures.json"), "{oops").unwrap();
        let report = evolve(dir.path(), &MemoryConfig::default(), Utc::now()).unwrap();
        assert_eq!(report.skipped, vec!["broken".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("broken/failures.json")).unwrap(),
            "{oops"
        );
    }

    #[test]
    fn evolve_persists_pruning() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        FailureStore {
            failures: vec![entry("old", 1, 40, now), entry("new", 1, 1, now)],
        }
        .save(dir.path(), "api")
        .unwrap();
        evolve(dir.path(), &MemoryConfig::default(), now).unwrap();
        let store = FailureStore::load(dir.path(), "api").unwrap().unwrap();
        assert_eq!(store.failures.len(), 1);
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        capture_failure(dir.path(), "api", "build", "linker error", now).unwrap();
        let cfg = MemoryConfig {
            prune_days: 1_000_000_000,
            boost_days: i64::MAX,
            ..MemoryConfig::default()
        };
        let report = evolve(dir.path(), &cfg, now).unwrap();
        assert_eq!(report.repos[0].pruned, 0);
        assert_eq!(report.repos[0].remaining, 1);
    }

    #[test]
    fn negative_prune_window_keeps_everything() {
        let now = Utc::now();
        let mut store = FailureStore {
            failures: vec![entry("old", 3, 400, now), entry("new", 3, 0, now)],
        };
        let cfg = MemoryConfig {
            prune_days: -1,
            boost_days: -1,
            ..MemoryConfig::default()
        };
        assert_eq!(evolve_store(&mut store, &cfg, now), (0, 0));
        assert_eq!(store.failures.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_store_does_not_stop_other_repos() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        for repo in ["locked", "open"] {
            FailureStore {
                failures: vec![entry("stale", 1, 40, now), entry("fresh", 1, 1, now)],
            }
            .save(dir.path(), repo)
            .unwrap();
        }
        let locked = dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permissions are not enforced for a privileged user.
        let check = locked.join(".write-check");
        if std::fs::write(&check, "").is_ok() {
            let _ = std::fs::remove_file(&check);
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = evolve(dir.path(), &MemoryConfig::default(), now).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.failed, vec!["locked".to_string()]);
        assert_eq!(report.repos.len(), 1);
        assert_eq!(report.repos[0].repo, "open");
        assert_eq!(report.repos[0].pruned, 1);
        let open = FailureStore::load(dir.path(), "open").unwrap().unwrap();
        assert_eq!(open.failures.len(), 1);
        let untouched = FailureStore::load(dir.path(), "locked").unwrap().unwrap();
        assert_eq!(untouched.failures.len(), 2);
    }

    #[test]
    fn missing_memory_dir_is_empty_pass() {
        let dir = TempDir::new().unwrap();
        let report = evolve(&dir.path().join("none"), &MemoryConfig::default(), Utc::now()).unwrap();
        assert!(report.repos.is_empty());
    }
}
