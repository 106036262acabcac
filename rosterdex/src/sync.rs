//! Version-aware sync of per-sport catalogs from the backend-of-record
//!
//! Protocol per sport:
//! 1. Read the stored `SyncMetadata`. Not due and not forced → `Skipped`.
//! 2. Fetch `/{sport}/bootstrap` with the stored dataset version as validator.
//! 3. Not modified → only `lastSyncTimestamp` moves.
//! 4. Modified → the sport's rows and metadata are replaced in one transaction.
//!
//! A failed fetch or parse never touches stored rows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, IF_NONE_MATCH};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::database::{Database, DatabaseError};
use crate::interface::{SyncReport, SyncStatus};
use crate::models::{BootstrapPayload, SyncMetadata};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid backend URL: {0}")]
    Url(String),
    #[error("Backend returned status {0}")]
    Status(u16),
    #[error("Malformed bootstrap payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Bootstrap payload is for sport {actual}, expected {expected}")]
    SportMismatch { expected: String, actual: String },
    #[error("Backend reported not modified but nothing is stored for {0}")]
    UnexpectedNotModified(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ─────────────────────────────────────────────────────────────────────────────
// BOOTSTRAP SOURCE
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum FetchOutcome {
    /// The known version is still current
    NotModified,
    Modified(BootstrapPayload),
}

/// Where bootstrap snapshots come from.
#[async_trait::async_trait]
pub trait BootstrapSource: Send + Sync {
    /// Fetch the snapshot for `sport`. `known_version` is the dataset version
    /// held locally, if any.
    async fn fetch(&self, sport: &str, known_version: Option<&str>) -> Result<FetchOutcome, SyncError>;
}

/// `GET {base}/{sport}/bootstrap` over HTTP.
///
/// The known version is sent both as an `If-None-Match` entity tag and as the
/// `since` query parameter; a 304 answer means not modified.
pub struct HttpBootstrapSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBootstrapSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = Url::parse(base_url).map_err(|e| SyncError::Url(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Url(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rosterdex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn bootstrap_url(&self, sport: &str, known_version: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new(), so segments are always available
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(sport).push("bootstrap");
        }
        if let Some(version) = known_version {
            url.query_pairs_mut().append_pair("since", version);
        }
        url
    }
}

#[async_trait::async_trait]
impl BootstrapSource for HttpBootstrapSource {
    async fn fetch(&self, sport: &str, known_version: Option<&str>) -> Result<FetchOutcome, SyncError> {
        let url = self.bootstrap_url(sport, known_version);
        debug!(%url, "fetching bootstrap");

        let mut request = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(version) = known_version {
            request = request.header(IF_NONE_MATCH, format!("\"{}\"", version));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let payload: BootstrapPayload = serde_json::from_slice(&body)?;
        Ok(FetchOutcome::Modified(payload))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SYNC ENGINE
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Fetch only when never synced or older than the max age
    IfDue,
    Force,
}

/// True when a sport has never been synced or its last sync is older than `max_age`.
pub fn is_stale(metadata: Option<&SyncMetadata>, now: i64, max_age: Duration) -> bool {
    let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    match metadata {
        None => true,
        Some(m) => now.saturating_sub(m.last_sync_timestamp) > max_age,
    }
}

fn report(sport: &str, status: SyncStatus, metadata: Option<&SyncMetadata>) -> SyncReport {
    SyncReport {
        sport: sport.to_string(),
        status,
        from_cache: status == SyncStatus::NotModified,
        dataset_version: metadata.map(|m| m.dataset_version.clone()),
        player_count: metadata.map_or(0, |m| m.player_count),
        team_count: metadata.map_or(0, |m| m.team_count),
        last_sync_timestamp: metadata.map(|m| m.last_sync_timestamp),
    }
}

/// The only writer of player/team rows.
///
/// Syncs of the same sport are serialized by a per-sport async mutex; different
/// sports sync concurrently and rely on SQLite transactions for isolation.
pub struct SyncEngine {
    db: Arc<Database>,
    source: Arc<dyn BootstrapSource>,
    max_age: Duration,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(db: Arc<Database>, source: Arc<dyn BootstrapSource>, max_age: Duration) -> Self {
        Self {
            db,
            source,
            max_age,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn sport_guard(&self, sport: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock();
        in_flight.entry(sport.to_string()).or_default().clone()
    }

    async fn stored_metadata(&self, sport: &str) -> Result<Option<SyncMetadata>, SyncError> {
        let db = Arc::clone(&self.db);
        let sport = sport.to_string();
        Ok(tokio::task::spawn_blocking(move || db.get_sync_metadata(&sport)).await??)
    }

    /// Whether `sport` would be fetched by an `IfDue` sync right now.
    pub async fn is_due(&self, sport: &str) -> Result<bool, SyncError> {
        let stored = self.stored_metadata(sport).await?;
        Ok(is_stale(stored.as_ref(), Utc::now().timestamp(), self.max_age))
    }

    /// Drop a sport's rows and metadata. Waits for any sync of that sport to finish.
    #[instrument(skip(self))]
    pub async fn clear(&self, sport: &str) -> Result<(usize, usize), SyncError> {
        let guard = self.sport_guard(sport);
        let _held = guard.lock().await;

        let db = Arc::clone(&self.db);
        let sport_owned = sport.to_string();
        let (players, teams) = tokio::task::spawn_blocking(move || db.purge_sport(&sport_owned)).await??;
        info!(players, teams, "sport cleared");
        Ok((players, teams))
    }

    #[instrument(skip(self))]
    pub async fn sync(&self, sport: &str, mode: SyncMode) -> Result<SyncReport, SyncError> {
        let guard = self.sport_guard(sport);
        let _held = guard.lock().await;

        // Read after acquiring the guard: a sync that finished while we waited counts
        let stored = self.stored_metadata(sport).await?;
        let now = Utc::now().timestamp();
        if mode == SyncMode::IfDue && !is_stale(stored.as_ref(), now, self.max_age) {
            debug!("sync not due");
            return Ok(report(sport, SyncStatus::Skipped, stored.as_ref()));
        }

        let known_version = stored.as_ref().map(|m| m.dataset_version.as_str());
        let outcome = match self.source.fetch(sport, known_version).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "bootstrap fetch failed, keeping local data");
                return Err(e);
            }
        };

        match outcome {
            FetchOutcome::NotModified => self.apply_not_modified(sport, stored.is_some(), now).await,
            FetchOutcome::Modified(payload) => self.apply_snapshot(sport, payload, now).await,
        }
    }

    async fn apply_not_modified(&self, sport: &str, has_metadata: bool, now: i64) -> Result<SyncReport, SyncError> {
        if !has_metadata {
            warn!("not modified without a stored dataset");
            return Err(SyncError::UnexpectedNotModified(sport.to_string()));
        }

        let db = Arc::clone(&self.db);
        let sport_owned = sport.to_string();
        let touched = tokio::task::spawn_blocking(move || db.touch_sync_timestamp(&sport_owned, now)).await??;

        match touched {
            Some(metadata) => {
                debug!(version = %metadata.dataset_version, "dataset not modified");
                Ok(report(sport, SyncStatus::NotModified, Some(&metadata)))
            }
            // Metadata vanished between the read and the write (sport cleared)
            None => Err(SyncError::UnexpectedNotModified(sport.to_string())),
        }
    }

    async fn apply_snapshot(&self, sport: &str, payload: BootstrapPayload, now: i64) -> Result<SyncReport, SyncError> {
        if let Some(actual) = payload.sport.as_deref() {
            if !actual.eq_ignore_ascii_case(sport) {
                warn!(actual, "bootstrap payload for another sport");
                return Err(SyncError::SportMismatch {
                    expected: sport.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        let players = payload.player_records(sport);
        let teams = payload.team_records(sport);
        let version = payload.dataset_version;

        let db = Arc::clone(&self.db);
        let sport_owned = sport.to_string();
        let metadata = tokio::task::spawn_blocking(move || {
            db.replace_sport(&sport_owned, &players, &teams, &version, now)
        })
        .await??;

        info!(
            version = %metadata.dataset_version,
            players = metadata.player_count,
            teams = metadata.team_count,
            "sport catalog updated"
        );
        Ok(report(sport, SyncStatus::Updated, Some(&metadata)))
    }
}
