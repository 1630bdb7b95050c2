//! Best-effort CI metrics fetch.
//!
//! The endpoint is expected to answer with a GitHub Actions style
//! `workflow_runs` listing. Only completed runs are counted.

use crate::config::CiConfig;
use crate::error::{AdaptError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Aggregate CI health over the runs the source returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CiMetrics {
    pub success_rate: f64,
    pub avg_duration_s: f64,
}

pub trait CiMetricsSource {
    /// `Ok(None)` when the source has no completed runs to report.
    fn fetch(&self) -> Result<Option<CiMetrics>>;
}

#[derive(Debug, Deserialize)]
struct RunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn summarize(runs: &[WorkflowRun]) -> Option<CiMetrics> {
    let completed: Vec<&WorkflowRun> = runs.iter().filter(|r| r.conclusion.is_some()).collect();
    if completed.is_empty() {
        return None;
    }
    let successes = completed
        .iter()
        .filter(|r| r.conclusion.as_deref() == Some("success"))
        .count();
    let durations: Vec<f64> = completed
        .iter()
        .filter_map(|r| match (r.run_started_at, r.updated_at) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        })
        .collect();
    let avg_duration_s = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };
    Some(CiMetrics {
        success_rate: successes as f64 / completed.len() as f64 * 100.0,
        avg_duration_s,
    })
}

// ---------------------------------------------------------------------------
// HttpCiSource
// ---------------------------------------------------------------------------

pub struct HttpCiSource {
    url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpCiSource {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("adapt/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: url.into(),
            token,
            client,
        })
    }

    /// Build a source from config. `None` when no endpoint is configured.
    pub fn from_config(cfg: &CiConfig) -> Result<Option<Self>> {
        let Some(url) = &cfg.url else {
            return Ok(None);
        };
        let token = cfg
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        Self::new(url.clone(), token, Duration::from_secs(cfg.timeout_secs)).map(Some)
    }
}

impl CiMetricsSource for HttpCiSource {
    fn fetch(&self) -> Result<Option<CiMetrics>> {
        let mut req = self.client.get(&self.url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send()?;
        if !resp.status().is_success() {
            return Err(AdaptError::CiFetch(format!(
                "{} returned {}",
                self.url,
                resp.status()
            )));
        }
        let body: RunsResponse = resp.json()?;
        Ok(summarize(&body.workflow_runs))
    }
}
