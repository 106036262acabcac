//! rosterdex FFI Interface Definition
//!
//! This file defines the public types exposed to the host app via UniFFI.
//! It acts as the source of truth for shared types.

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of entity a search result points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum EntityType {
    Player,
    Team,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Player => "player",
            EntityType::Team => "team",
        }
    }
}

/// Which catalogs a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum EntityFilter {
    Player,
    Team,
    Both,
}

impl Default for EntityFilter {
    fn default() -> Self {
        EntityFilter::Both
    }
}

/// Outcome of a sync call for one sport
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SyncStatus {
    /// Local data was fresh enough; no request was made
    Skipped,
    /// Backend confirmed the stored dataset version is current
    NotModified,
    /// A new snapshot replaced the local rows
    Updated,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// One query issued by a search session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Monotonic per session, starts at 1
    pub request_id: u64,
    pub sport: String,
    pub filter: EntityFilter,
    pub query_text: String,
    pub limit: u32,
}

/// A ranked search hit. The ranking score stays internal.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SearchResult {
    /// `{sport}-{entity id}`, e.g. `NBA-1`
    pub id: String,
    pub display_label: String,
    pub name: String,
    pub entity_type: EntityType,
    pub sport: String,
    pub team: Option<String>,
    pub league: Option<String>,
}

/// What a sync call did
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SyncReport {
    pub sport: String,
    pub status: SyncStatus,
    /// True when the backend answered "not modified"
    pub from_cache: bool,
    pub dataset_version: Option<String>,
    pub player_count: u64,
    pub team_count: u64,
    pub last_sync_timestamp: Option<i64>,
}

/// Error type for rosterdex operations
#[derive(Debug, Error, uniffi::Error)]
pub enum RosterError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Sync error: {0}")]
    Sync(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<crate::database::DatabaseError> for RosterError {
    fn from(e: crate::database::DatabaseError) -> Self {
        RosterError::Database(e.to_string())
    }
}

impl From<crate::sync::SyncError> for RosterError {
    fn from(e: crate::sync::SyncError) -> Self {
        RosterError::Sync(e.to_string())
    }
}
