use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use super::IntrospectError;
use crate::model::IntrospectionSummary;

pub type RunOutcome = Result<IntrospectionSummary, IntrospectError>;

/// Published once when a run finishes; `None` while it is still going.
pub type OutcomeReceiver = watch::Receiver<Option<RunOutcome>>;

// ---------- run state ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    /// The stored catalog is being deleted; no run may start.
    Deleting,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Deleting => "deleting",
        }
    }
}

// ---------- run ----------

pub struct IntrospectionRun {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub state: RunState,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    pub error: Option<String>,
    tx: watch::Sender<Option<RunOutcome>>,
}

impl IntrospectionRun {
    fn new(connection_id: Uuid) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            id: Uuid::now_v7(),
            connection_id,
            state: RunState::Running,
            started_at: Instant::now(),
            finished_at: None,
            error: None,
            tx,
        }
    }
}

// ---------- run store ----------

/// Why a run could not start.
#[derive(Debug)]
pub enum Conflict {
    /// Another run is in flight; its outcome can still be awaited.
    Running(OutcomeReceiver),
    Deleting,
}

/// In-memory record of the latest run per connection.
/// Enforces one running introspection per connection, and keeps runs away
/// from a connection whose catalog is being deleted.
#[derive(Default)]
pub struct RunStore {
    runs: HashMap<Uuid, IntrospectionRun>,
    deleting: HashSet<Uuid>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run for a connection.
    pub fn try_register(&mut self, connection_id: Uuid) -> Result<OutcomeReceiver, Conflict> {
        if self.deleting.contains(&connection_id) {
            return Err(Conflict::Deleting);
        }
        if let Some(existing) = self.runs.get(&connection_id)
            && existing.state == RunState::Running
        {
            return Err(Conflict::Running(existing.tx.subscribe()));
        }

        let run = IntrospectionRun::new(connection_id);
        let rx = run.tx.subscribe();
        tracing::debug!(%connection_id, run_id = %run.id, "Introspection run registered");
        // Replaces the previous finished run for this connection.
        self.runs.insert(connection_id, run);
        Ok(rx)
    }

    /// Reserve the connection for a catalog delete. False while a run or
    /// another delete holds it.
    pub fn begin_delete(&mut self, connection_id: Uuid) -> bool {
        if self.state(connection_id) == RunState::Running {
            return false;
        }
        self.deleting.insert(connection_id)
    }

    pub fn end_delete(&mut self, connection_id: Uuid) {
        self.deleting.remove(&connection_id);
    }

    pub fn state(&self, connection_id: Uuid) -> RunState {
        if self.deleting.contains(&connection_id) {
            return RunState::Deleting;
        }
        self.runs
            .get(&connection_id)
            .map(|r| r.state)
            .unwrap_or(RunState::Idle)
    }

    pub fn get(&self, connection_id: Uuid) -> Option<&IntrospectionRun> {
        self.runs.get(&connection_id)
    }

    /// Subscribe to the in-flight run, if any.
    pub fn subscribe_running(&self, connection_id: Uuid) -> Option<OutcomeReceiver> {
        self.runs
            .get(&connection_id)
            .filter(|r| r.state == RunState::Running)
            .map(|r| r.tx.subscribe())
    }

    /// Mark the run finished and hand its outcome to every waiter.
    pub fn finish(&mut self, connection_id: Uuid, outcome: RunOutcome) {
        let Some(run) = self.runs.get_mut(&connection_id) else {
            return;
        };
        match &outcome {
            Ok(_) => {
                run.state = RunState::Succeeded;
                run.error = None;
            }
            Err(e) => {
                run.state = RunState::Failed;
                run.error = Some(e.to_string());
            }
        }
        run.finished_at = Some(Instant::now());
        run.tx.send_replace(Some(outcome));
    }
}
