//! Domain events emitted by the recorder and the tuning pass.
//!
//! Layout:
//!   .adapt/events.jsonl   one event per line, oldest first

use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const OUTCOME_RECORDED: &str = "outcome.recorded";
pub const ROUTING_SWITCHED_TO_CHEAP: &str = "routing.switched_to_cheap";
pub const PATTERN_PROMOTED: &str = "memory.pattern_promoted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Append an event to the project's event log.
pub fn emit(root: &Path, kind: &str, data: serde_json::Value) -> Result<Event> {
    let event = Event {
        id: Uuid::new_v4(),
        ts: Utc::now(),
        kind: kind.to_string(),
        data,
    };
    io::append_jsonl(&paths::events_path(root), &event)?;
    tracing::info!(kind, id = %event.id, "event emitted");
    Ok(event)
}

/// Emit, logging instead of propagating failures. Events never block the
/// operation that produced them.
pub fn emit_best_effort(root: &Path, kind: &str, data: serde_json::Value) {
    if let Err(e) = emit(root, kind, data) {
        tracing::warn!(kind, error = %e, "failed to write event");
    }
}

pub fn list(root: &Path) -> Vec<Event> {
    io::read_jsonl(&paths::events_path(root))
}
