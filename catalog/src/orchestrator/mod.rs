//! Per-connection introspection runs: read the source catalog, normalize,
//! infer relations, swap the stored catalog, record the outcome.

use std::fmt;
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::inference::{RelationView, infer};
use crate::inspector::{CatalogSource, InspectError};
use crate::model::{
    ConnectionConfig, ConnectionStatus, Dialect, DiscoveredRelation, DiscoveredTable,
    IntrospectionSummary, NamedRelation,
};
use crate::normalizer::normalize;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::store::{MetadataStore, StoreError};

pub mod runs;

pub use runs::{Conflict, OutcomeReceiver, RunOutcome, RunState, RunStore};

// ---------- errors ----------

#[derive(Debug, Clone, PartialEq)]
pub enum IntrospectError {
    /// Unknown connection or table.
    NotFound(String),
    /// A run for this connection is already in progress.
    Busy(Uuid),
    Connectivity { dialect: Dialect, message: String },
    CatalogQuery { dialect: Dialect, message: String },
    /// Persisting failed; details are logged, not returned.
    Store,
    Registry(String),
    Internal(String),
}

impl fmt::Display for IntrospectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntrospectError::NotFound(what) => write!(f, "{what} not found"),
            IntrospectError::Busy(id) => {
                write!(f, "Introspection already in progress for connection {id}")
            }
            IntrospectError::Connectivity { dialect, message } => {
                write!(f, "Connection error ({dialect}): {message}")
            }
            IntrospectError::CatalogQuery { dialect, message } => {
                write!(f, "Catalog query error ({dialect}): {message}")
            }
            IntrospectError::Store => write!(f, "Failed to persist catalog"),
            IntrospectError::Registry(msg) => write!(f, "Connection registry error: {msg}"),
            IntrospectError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for IntrospectError {}

impl From<InspectError> for IntrospectError {
    fn from(e: InspectError) -> Self {
        match e {
            InspectError::Connectivity { dialect, message } => {
                IntrospectError::Connectivity { dialect, message }
            }
            InspectError::CatalogQuery { dialect, message } => {
                IntrospectError::CatalogQuery { dialect, message }
            }
        }
    }
}

impl From<RegistryError> for IntrospectError {
    fn from(e: RegistryError) -> Self {
        IntrospectError::Registry(e.to_string())
    }
}

impl From<StoreError> for IntrospectError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Metadata store failure");
        IntrospectError::Store
    }
}

impl IntrospectError {
    /// Failures that leave the connection in `error` status.
    fn marks_connection_failed(&self) -> bool {
        matches!(
            self,
            IntrospectError::Connectivity { .. }
                | IntrospectError::CatalogQuery { .. }
                | IntrospectError::Store
                | IntrospectError::Internal(_)
        )
    }
}

// ---------- introspector ----------

/// Entry point for running introspections and reading their results.
/// Cheap to clone; clones share the same run bookkeeping.
#[derive(Clone)]
pub struct Introspector {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn MetadataStore>,
    source: Arc<dyn CatalogSource>,
    runs: Arc<Mutex<RunStore>>,
}

impl Introspector {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<dyn MetadataStore>,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        Self {
            registry,
            store,
            source,
            runs: Arc::new(Mutex::new(RunStore::new())),
        }
    }

    /// Run a fresh introspection; fails with `Busy` if one is in flight.
    pub async fn introspect(&self, connection_id: Uuid) -> RunOutcome {
        let rx = self.launch(connection_id, false).await?;
        wait(rx).await
    }

    /// Like [`introspect`](Self::introspect), but a request that arrives while
    /// a run is in flight waits for that run and gets its outcome.
    pub async fn introspect_or_join(&self, connection_id: Uuid) -> RunOutcome {
        let rx = self.launch(connection_id, true).await?;
        wait(rx).await
    }

    pub async fn run_state(&self, connection_id: Uuid) -> RunState {
        self.runs.lock().await.state(connection_id)
    }

    pub async fn get_tables(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<DiscoveredTable>, IntrospectError> {
        self.require_connection(connection_id).await?;
        Ok(self.store.get(connection_id).await?.tables)
    }

    pub async fn get_table(&self, table_id: Uuid) -> Result<DiscoveredTable, IntrospectError> {
        self.store
            .get_table(table_id)
            .await?
            .ok_or_else(|| IntrospectError::NotFound(format!("Table {table_id}")))
    }

    pub async fn get_relations(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<DiscoveredRelation>, IntrospectError> {
        self.require_connection(connection_id).await?;
        Ok(self.store.get_relations(connection_id).await?)
    }

    /// Stored relations plus their inverses and junction-derived many-to-many links.
    pub async fn get_relation_view(
        &self,
        connection_id: Uuid,
    ) -> Result<RelationView, IntrospectError> {
        self.require_connection(connection_id).await?;
        let catalog = self.store.get(connection_id).await?;
        Ok(RelationView::build(&catalog.tables, &catalog.relations))
    }

    /// Stored relations with their table and column names resolved.
    pub async fn get_named_relations(
        &self,
        connection_id: Uuid,
    ) -> Result<Vec<NamedRelation>, IntrospectError> {
        self.require_connection(connection_id).await?;
        Ok(self.store.get(connection_id).await?.named_relations())
    }

    /// Drop the stored catalog. Refused while a run is in flight so the run
    /// cannot resurrect it; runs requested during the delete are refused too.
    pub async fn delete_metadata(&self, connection_id: Uuid) -> Result<u64, IntrospectError> {
        self.require_connection(connection_id).await?;
        if !self.runs.lock().await.begin_delete(connection_id) {
            return Err(IntrospectError::Busy(connection_id));
        }

        // Own task, so the reservation is released even if the caller goes away.
        let this = self.clone();
        let task = tokio::spawn(async move {
            let store = this.store.clone();
            let result = tokio::spawn(async move { store.delete(connection_id).await }).await;
            this.runs.lock().await.end_delete(connection_id);
            result
        });

        let removed = match task.await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) | Err(e) => {
                tracing::error!(%connection_id, error = %e, "Catalog delete task aborted");
                return Err(IntrospectError::Internal(e.to_string()));
            }
        };
        tracing::info!(%connection_id, removed_tables = removed, "Catalog metadata deleted");
        Ok(removed)
    }

    async fn require_connection(&self, connection_id: Uuid) -> Result<ConnectionConfig, IntrospectError> {
        self.registry
            .connection_config(connection_id)
            .await?
            .ok_or_else(|| IntrospectError::NotFound(format!("Connection {connection_id}")))
    }

    async fn launch(&self, connection_id: Uuid, join: bool) -> Result<OutcomeReceiver, IntrospectError> {
        if join && let Some(rx) = self.runs.lock().await.subscribe_running(connection_id) {
            tracing::debug!(%connection_id, "Joining in-flight introspection");
            return Ok(rx);
        }

        let cfg = self.require_connection(connection_id).await?;

        let rx = match self.runs.lock().await.try_register(connection_id) {
            Ok(rx) => rx,
            Err(Conflict::Running(in_flight)) if join => return Ok(in_flight),
            Err(_) => return Err(IntrospectError::Busy(connection_id)),
        };

        // The run owns its own task so an abandoned caller cannot cancel it.
        let this = self.clone();
        tokio::spawn(async move {
            let worker = this.clone();
            let handle = tokio::spawn(async move { worker.execute(cfg).await });
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(%connection_id, error = %e, "Introspection task aborted");
                    let err = IntrospectError::Internal(e.to_string());
                    this.record_failure(connection_id, &err).await;
                    Err(err)
                }
            };
            this.runs.lock().await.finish(connection_id, outcome);
        });

        Ok(rx)
    }

    async fn execute(&self, cfg: ConnectionConfig) -> RunOutcome {
        let connection_id = cfg.id;
        tracing::info!(
            %connection_id,
            dialect = %cfg.dialect,
            namespace = %cfg.effective_namespace(),
            "Introspection started"
        );

        let result = self.refresh(&cfg).await;

        match &result {
            Ok(summary) => tracing::info!(
                %connection_id,
                tables = summary.tables_count,
                relations = summary.relations_count,
                warnings = summary.warning_count(),
                "Introspection finished"
            ),
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "Introspection failed");
                self.record_failure(connection_id, e).await;
            }
        }
        result
    }

    async fn refresh(&self, cfg: &ConnectionConfig) -> RunOutcome {
        let connection_id = cfg.id;
        let raw = self.source.read_catalog(cfg).await?;

        let normalized = normalize(connection_id, &raw);
        let mut tables = normalized.tables;
        let inference = infer(&mut tables, &raw);

        self.store
            .replace(connection_id, &tables, &inference.relations)
            .await?;

        // Microseconds: what both SQLite and PostgreSQL admin stores keep.
        let completed_at = Utc::now().naive_utc().trunc_subsecs(6);
        self.registry
            .record_outcome(connection_id, ConnectionStatus::Active, Some(completed_at))
            .await?;

        let mut warnings = normalized.warnings;
        warnings.extend(inference.warnings);

        Ok(IntrospectionSummary {
            connection_id,
            tables_count: tables.len(),
            relations_count: inference.relations.len(),
            warnings,
            completed_at,
        })
    }

    /// Force `error` status; the last successful timestamp is kept.
    async fn record_failure(&self, connection_id: Uuid, error: &IntrospectError) {
        if !error.marks_connection_failed() {
            return;
        }
        if let Err(e) = self
            .registry
            .record_outcome(connection_id, ConnectionStatus::Error, None)
            .await
        {
            tracing::error!(%connection_id, error = %e, "Failed to record introspection failure");
        }
    }
}

async fn wait(mut rx: OutcomeReceiver) -> RunOutcome {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome
            .clone()
            .unwrap_or_else(|| Err(IntrospectError::Internal("run finished without outcome".into()))),
        Err(_) => Err(IntrospectError::Internal(
            "introspection run ended without reporting".to_string(),
        )),
    }
}
