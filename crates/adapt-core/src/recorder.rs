use crate::ci::CiMetricsSource;
use crate::config::TuningConfig;
use crate::error::{AdaptError, Result};
use crate::events;
use crate::outcome::{self, CiMetricsRecord, LogEntry, OutcomeRecord};
use crate::pipeline_state::PipelineState;
use chrono::Utc;
use std::path::Path;

/// What a single `analyze-outcome` call produced.
#[derive(Debug, Clone)]
pub struct RecordedOutcome {
    pub record: OutcomeRecord,
    pub ci: Option<CiMetricsRecord>,
}

/// Parse a pipeline state file and append its outcome to the log.
///
/// A missing state file is an error. CI metrics are best-effort: a failed
/// fetch is logged and the outcome is still recorded.
pub fn record_outcome(
    root: &Path,
    cfg: &TuningConfig,
    state_file: &Path,
    ci: Option<&dyn CiMetricsSource>,
) -> Result<RecordedOutcome> {
    if !state_file.is_file() {
        return Err(AdaptError::StateFileNotFound(
            state_file.display().to_string(),
        ));
    }
    let text = std::fs::read_to_string(state_file)?;
    let now = Utc::now();
    let record = PipelineState::parse(&text).into_record(now);

    outcome::append(root, &LogEntry::Outcome(record.clone()))?;

    events::emit_best_effort(
        root,
        events::OUTCOME_RECORDED,
        serde_json::json!({
            "issue_id": record.issue_id,
            "template": record.template,
            "result": record.result,
            "iterations": record.iterations,
            "cost": record.cost,
        }),
    );

    let ci_record = ci.and_then(|source| match source.fetch() {
        Ok(Some(m)) => Some(CiMetricsRecord {
            ts: now,
            issue_id: record.issue_id.clone(),
            ci_success_rate: m.success_rate.clamp(0.0, 100.0),
            ci_avg_duration_s: m.avg_duration_s.max(0.0),
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "ci metrics unavailable, recording outcome without them");
            None
        }
    });
    if let Some(ci_record) = &ci_record {
        if let Err(e) = outcome::append(root, &LogEntry::CiMetrics(ci_record.clone())) {
            tracing::warn!(error = %e, "failed to append ci metrics");
        }
    }

    match outcome::rotate(root, cfg.outcomes.max_entries) {
        Ok(0) => {}
        Ok(dropped) => tracing::debug!(dropped, "rotated outcome log"),
        Err(e) => tracing::warn!(error = %e, "failed to rotate outcome log"),
    }

    tracing::info!(
        issue = %record.issue_id,
        template = %record.template,
        result = %record.result,
        "outcome recorded"
    );
    Ok(RecordedOutcome {
        record,
        ci: ci_record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::CiMetrics;
    use crate::outcome::PipelineResult;
    use tempfile::TempDir;

    struct FixedCi(Option<CiMetrics>);

    impl CiMetricsSource for FixedCi {
        fn fetch(&self) -> Result<Option<CiMetrics>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenCi;

    impl CiMetricsSource for BrokenCi {
        fn fetch(&self) -> Result<Option<CiMetrics>> {
            Err(AdaptError::CiFetch("timed out".to_string()))
        }
    }

    fn write_state(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("pipeline-state.md");
        std::fs::write(
            &path,
            "issue: 9\ntemplate: fast\nstatus: failure\niterations: 3\ncost: 0.5\nlabels: auth\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn records_outcome_and_event() {
        let dir = TempDir::new().unwrap();
        let state = write_state(&dir);
        let out = record_outcome(dir.path(), &TuningConfig::default(), &state, None).unwrap();
        assert_eq!(out.record.result, PipelineResult::Failure);
        assert!(out.ci.is_none());

        let logged = outcome::load_outcomes(dir.path());
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].template, "fast");

        let evs = events::list(dir.path());
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].data["iterations"], 3);
    }

    #[test]
    fn missing_state_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = record_outcome(
            dir.path(),
            &TuningConfig::default(),
            &dir.path().join("nope.md"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AdaptError::StateFileNotFound(_)));
        assert!(outcome::load_entries(dir.path()).is_empty());
    }

    #[test]
    fn ci_metrics_are_linked() {
        let dir = TempDir::new().unwrap();
        let state = write_state(&dir);
        let ci = FixedCi(Some(CiMetrics {
            success_rate: 75.0,
            avg_duration_s: 42.0,
        }));
        let out = record_outcome(dir.path(), &TuningConfig::default(), &state, Some(&ci)).unwrap();
        assert_eq!(out.ci.unwrap().issue_id, "9");
        assert_eq!(outcome::load_entries(dir.path()).len(), 2);
    }

    #[test]
    fn ci_failure_does_not_abort_recording() {
        let dir = TempDir::new().unwrap();
        let state = write_state(&dir);
        let out =
            record_outcome(dir.path(), &TuningConfig::default(), &state, Some(&BrokenCi)).unwrap();
        assert!(out.ci.is_none());
        assert_eq!(outcome::load_outcomes(dir.path()).len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn rotation_failure_keeps_recorded_outcome() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let state = write_state(&dir);
        let mut cfg = TuningConfig::default();
        cfg.outcomes.max_entries = 1;
        record_outcome(dir.path(), &cfg, &state, None).unwrap();

        // Appending to the existing log still works; the rotated copy cannot
        // be created next to it.
        let adapt = dir.path().join(".adapt");
        std::fs::set_permissions(&adapt, std::fs::Permissions::from_mode(0o555)).unwrap();
        let check = adapt.join(".write-check");
        if std::fs::write(&check, "").is_ok() {
            let _ = std::fs::remove_file(&check);
            std::fs::set_permissions(&adapt, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        let result = record_outcome(dir.path(), &cfg, &state, None);
        std::fs::set_permissions(&adapt, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_ok());
        assert_eq!(outcome::load_outcomes(dir.path()).len(), 2);
    }

    #[test]
    fn log_is_capped() {
        let dir = TempDir::new().unwrap();
        let state = write_state(&dir);
        let mut cfg = TuningConfig::default();
        cfg.outcomes.max_entries = 3;
        for _ in 0..5 {
            record_outcome(dir.path(), &cfg, &state, None).unwrap();
        }
        assert_eq!(outcome::load_entries(dir.path()).len(), 3);
    }
}
