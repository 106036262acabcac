//! RosterStore - Main API for host app interop, designed for UniFFI export.
//!
//! Threads one Local Store handle through the sync engine, the query engine
//! and search sessions.
//!
//! Concurrency Model:
//! - Database uses r2d2 connection pool (concurrent reads, no mutex blocking)
//! - Searches run on tokio::spawn_blocking threads, scoring fans out on rayon
//! - Syncs run as tokio tasks; same-sport syncs are serialized by the sync engine
//! - Uses global FALLBACK_RUNTIME when called outside any runtime (e.g., from UniFFI)

use crate::config::RosterConfig;
use crate::database::Database;
use crate::interface::{EntityFilter, RosterError, SearchResult, SyncReport};
use crate::models::{PlayerRecord, SyncMetadata, TeamRecord};
use crate::query::QueryEngine;
use crate::session::{SearchSession, SessionListener, SessionOptions};
use crate::sync::{BootstrapSource, HttpBootstrapSource, SyncEngine, SyncMode};
use once_cell::sync::Lazy;
use std::sync::{Arc, Once};
use tracing::{debug, warn};

/// Global fallback Tokio runtime for when async functions are called outside any runtime context.
/// This is shared across all RosterStore instances and never dropped.
/// Used by UniFFI which doesn't provide a tokio runtime.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

static RAYON_INIT: Once = Once::new();

/// Initialize global Rayon thread pool with core reservation and lower priority
fn init_rayon() {
    RAYON_INIT.call_once(|| {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        // Reserve 2 cores for Tokio (syncs, sessions), but use at least 1 thread.
        let rayon_threads = num_threads.saturating_sub(2).max(1);

        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(rayon_threads)
            .thread_name(|i| format!("rosterdex-rayon-{}", i))
            .start_handler(|_| {
                use thread_priority::*;
                let _ = set_current_thread_priority(ThreadPriority::Min);
            })
            .build_global();
    });
}

fn validate_sport(sport: &str) -> Result<String, RosterError> {
    let sport = sport.trim();
    if sport.is_empty() {
        return Err(RosterError::InvalidInput("sport must not be empty".into()));
    }
    Ok(sport.to_string())
}

#[derive(uniffi::Object)]
pub struct RosterStore {
    db: Arc<Database>,
    engine: QueryEngine,
    sync: Arc<SyncEngine>,
    config: RosterConfig,
    open_error: Option<String>,
}

// Internal implementation (not exported via FFI)
impl RosterStore {
    /// Assemble a store over an open database and an arbitrary bootstrap source
    pub fn with_source(db: Database, source: Arc<dyn BootstrapSource>, config: RosterConfig) -> Self {
        init_rayon();
        let db = Arc::new(db);
        let sync = Arc::new(SyncEngine::new(Arc::clone(&db), source, config.max_age()));
        Self {
            engine: QueryEngine::new(Arc::clone(&db)),
            db,
            sync,
            config,
            open_error: None,
        }
    }

    fn with_http_source(db: Database, config: RosterConfig) -> Result<Self, RosterError> {
        let source = HttpBootstrapSource::new(&config.backend_base_url, config.request_timeout())?;
        Ok(Self::with_source(db, Arc::new(source), config))
    }

    /// Get a tokio runtime handle - uses current runtime if available, otherwise global fallback
    fn runtime_handle(&self) -> tokio::runtime::Handle {
        tokio::runtime::Handle::try_current()
            .unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    pub fn query_engine(&self) -> QueryEngine {
        self.engine.clone()
    }

    /// Start a debounced search session over this store's data
    pub fn session(&self, sport: &str) -> SearchSession {
        self.session_with(SessionOptions {
            limit: self.config.default_limit,
            debounce: self.config.debounce(),
            ..SessionOptions::new(sport)
        })
    }

    pub fn session_with(&self, options: SessionOptions) -> SearchSession {
        SearchSession::spawn(Arc::new(self.engine.clone()), options, &self.runtime_handle())
    }
}

// FFI-exported constructors (must be in standalone impl block)
#[uniffi::export]
impl RosterStore {
    /// Open the store at the given path with default configuration
    #[uniffi::constructor]
    pub fn new(db_path: String) -> Result<Self, RosterError> {
        Self::new_with_config(db_path, RosterConfig::default())
    }

    #[uniffi::constructor]
    pub fn new_with_config(db_path: String, config: RosterConfig) -> Result<Self, RosterError> {
        let db = Database::open_with_pool_size(&db_path, config.pool_size)?;
        Self::with_http_source(db, config)
    }

    /// Open the store, or continue with an empty in-memory store when the file
    /// cannot be opened. The open failure is kept in `open_error()`.
    #[uniffi::constructor]
    pub fn open_or_in_memory(db_path: String, config: RosterConfig) -> Result<Self, RosterError> {
        match Database::open_with_pool_size(&db_path, config.pool_size) {
            Ok(db) => Self::with_http_source(db, config),
            Err(e) => {
                warn!(path = %db_path, error = %e, "local store unavailable, continuing in memory");
                let db = Database::open_in_memory()?;
                let mut store = Self::with_http_source(db, config)?;
                store.open_error = Some(e.to_string());
                Ok(store)
            }
        }
    }
}

#[uniffi::export]
impl RosterStore {
    /// Why the on-disk store could not be opened, if it could not
    pub fn open_error(&self) -> Option<String> {
        self.open_error.clone()
    }

    /// Ranked entities for a partial name. Queries shorter than two
    /// normalized characters return an empty list.
    pub async fn search(
        &self,
        sport: String,
        filter: EntityFilter,
        query: String,
        limit: u32,
    ) -> Result<Vec<SearchResult>, RosterError> {
        let sport = validate_sport(&sport)?;
        let engine = self.engine.clone();

        // We use runtime.spawn_blocking() instead of tokio::task::spawn_blocking()
        // because UniFFI may poll this future outside any tokio context
        let handle = self
            .runtime_handle()
            .spawn_blocking(move || engine.search_blocking(&sport, filter, &query, limit as usize));

        match handle.await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(e.into()),
            Err(_join_error) => Err(RosterError::Cancelled),
        }
    }

    /// Sync a sport from the backend. Without `force`, fresh sports are skipped.
    pub async fn sync_sport(&self, sport: String, force: bool) -> Result<SyncReport, RosterError> {
        let sport = validate_sport(&sport)?;
        let mode = if force { SyncMode::Force } else { SyncMode::IfDue };
        let sync = Arc::clone(&self.sync);

        let handle = self
            .runtime_handle()
            .spawn(async move { sync.sync(&sport, mode).await });

        match handle.await {
            Ok(result) => Ok(result?),
            Err(_join_error) => Err(RosterError::Cancelled),
        }
    }

    /// Called when the user picks a sport: refreshes it in the background if
    /// due. Never blocks and never surfaces errors; failures are logged.
    pub fn select_sport(&self, sport: String) {
        let Ok(sport) = validate_sport(&sport) else {
            return;
        };
        let sync = Arc::clone(&self.sync);
        self.runtime_handle().spawn(async move {
            match sync.sync(&sport, SyncMode::IfDue).await {
                Ok(report) => debug!(sport = %report.sport, status = ?report.status, "background sync finished"),
                Err(e) => warn!(sport = %sport, error = %e, "background sync failed"),
            }
        });
    }

    /// Start a debounced search session for one text input. When a listener
    /// is given, every published state is pushed to it.
    pub fn start_session(
        &self,
        sport: String,
        listener: Option<Arc<dyn SessionListener>>,
    ) -> Result<Arc<SearchSession>, RosterError> {
        let sport = validate_sport(&sport)?;
        let session = self.session(&sport);
        if let Some(listener) = listener {
            session.forward_to(listener, &self.runtime_handle());
        }
        Ok(Arc::new(session))
    }

    pub fn sync_metadata(&self, sport: String) -> Result<Option<SyncMetadata>, RosterError> {
        Ok(self.db.get_sync_metadata(&sport)?)
    }

    pub fn get_player(&self, sport: String, player_id: String) -> Result<Option<PlayerRecord>, RosterError> {
        Ok(self.db.get_player(&sport, &player_id)?)
    }

    pub fn get_team(&self, sport: String, team_id: String) -> Result<Option<TeamRecord>, RosterError> {
        Ok(self.db.get_team(&sport, &team_id)?)
    }

    /// Delete a sport's rows and sync metadata. Returns the number of rows deleted.
    pub async fn clear_sport(&self, sport: String) -> Result<u64, RosterError> {
        let sport = validate_sport(&sport)?;
        let sync = Arc::clone(&self.sync);

        let handle = self
            .runtime_handle()
            .spawn(async move { sync.clear(&sport).await });

        match handle.await {
            Ok(result) => {
                let (players, teams) = result?;
                Ok((players + teams) as u64)
            }
            Err(_join_error) => Err(RosterError::Cancelled),
        }
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> i64 {
        self.db.database_size().unwrap_or(0)
    }
}
