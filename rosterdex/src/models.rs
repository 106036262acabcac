//! Core data models for rosterdex
//!
//! Persisted records (players, teams, per-sport sync metadata) and the wire
//! shape of the backend bootstrap payload. Types with uniffi derives are
//! exported to the host app as-is.

use serde::{Deserialize, Serialize};

use crate::interface::{EntityType, SearchResult};
use crate::normalize::normalize;

// ─────────────────────────────────────────────────────────────────────────────
// PERSISTED RECORDS
// ─────────────────────────────────────────────────────────────────────────────

/// A player row, keyed by `(sport, player_id)`.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PlayerRecord {
    pub player_id: String,
    pub sport: String,
    pub first_name: String,
    pub last_name: String,
    /// First and last name joined by a single space
    pub full_name: String,
    pub current_team: Option<String>,
    /// Always `normalize(full_name)`; recomputed by the store on every write
    pub normalized_name: String,
    /// Unix seconds of the last write
    pub updated_at: i64,
}

impl PlayerRecord {
    pub fn new(
        sport: &str,
        player_id: impl Into<String>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        current_team: Option<String>,
    ) -> Self {
        let first_name = first_name.map(str::trim).unwrap_or_default().to_string();
        let last_name = last_name.map(str::trim).unwrap_or_default().to_string();
        let full_name = join_full_name(&first_name, &last_name);
        let normalized_name = normalize(&full_name);
        Self {
            player_id: player_id.into(),
            sport: sport.to_string(),
            first_name,
            last_name,
            full_name,
            current_team: current_team.filter(|t| !t.trim().is_empty()),
            normalized_name,
            updated_at: 0,
        }
    }
}

/// A team row, keyed by `(sport, team_id)`.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct TeamRecord {
    pub team_id: String,
    pub sport: String,
    pub name: String,
    /// League for some sports, division for others
    pub league: Option<String>,
    pub normalized_name: String,
    pub updated_at: i64,
}

impl TeamRecord {
    pub fn new(sport: &str, team_id: impl Into<String>, name: &str, league: Option<String>) -> Self {
        let name = name.trim().to_string();
        let normalized_name = normalize(&name);
        Self {
            team_id: team_id.into(),
            sport: sport.to_string(),
            name,
            league: league.filter(|l| !l.trim().is_empty()),
            normalized_name,
            updated_at: 0,
        }
    }
}

/// Per-sport bookkeeping written by the sync engine.
///
/// Lives in the `meta` table as JSON under `sync:{sport}`. Always written
/// whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub sport: String,
    pub dataset_version: String,
    pub last_sync_timestamp: i64,
    pub player_count: u64,
    pub team_count: u64,
}

impl SyncMetadata {
    pub fn meta_key(sport: &str) -> String {
        format!("sync:{}", sport)
    }
}

fn join_full_name(first: &str, last: &str) -> String {
    [first, last]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// SEARCHABLE
// ─────────────────────────────────────────────────────────────────────────────

/// A stored entity the query engine can rank and turn into a result.
pub trait Searchable: Send {
    fn entity_id(&self) -> &str;
    fn normalized_name(&self) -> &str;
    fn into_search_result(self) -> SearchResult;
}

impl Searchable for PlayerRecord {
    fn entity_id(&self) -> &str {
        &self.player_id
    }

    fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    fn into_search_result(self) -> SearchResult {
        let display_label = match &self.current_team {
            Some(team) => format!("{} ({})", self.full_name, team),
            None => self.full_name.clone(),
        };
        SearchResult {
            id: format!("{}-{}", self.sport, self.player_id),
            display_label,
            name: self.full_name,
            entity_type: EntityType::Player,
            sport: self.sport,
            team: self.current_team,
            league: None,
        }
    }
}

impl Searchable for TeamRecord {
    fn entity_id(&self) -> &str {
        &self.team_id
    }

    fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    fn into_search_result(self) -> SearchResult {
        let display_label = match &self.league {
            Some(league) => format!("{} ({})", self.name, league),
            None => self.name.clone(),
        };
        SearchResult {
            id: format!("{}-{}", self.sport, self.team_id),
            display_label,
            name: self.name,
            entity_type: EntityType::Team,
            sport: self.sport,
            team: None,
            league: self.league,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BOOTSTRAP PAYLOAD (wire format of GET /{sport}/bootstrap)
// ─────────────────────────────────────────────────────────────────────────────

/// Backend ids arrive as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPlayer {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub current_team: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapTeam {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub league: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct EntityPage<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for EntityPage<T> {
    fn default() -> Self {
        Self { count: None, items: Vec::new() }
    }
}

/// Full per-sport snapshot returned by the backend-of-record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPayload {
    #[serde(default)]
    pub sport: Option<String>,
    pub dataset_version: String,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub players: EntityPage<BootstrapPlayer>,
    #[serde(default)]
    pub teams: EntityPage<BootstrapTeam>,
}

impl BootstrapPayload {
    pub fn player_records(&self, sport: &str) -> Vec<PlayerRecord> {
        self.players
            .items
            .iter()
            .map(|p| {
                PlayerRecord::new(
                    sport,
                    p.id.to_string(),
                    p.first_name.as_deref(),
                    p.last_name.as_deref(),
                    p.current_team.clone(),
                )
            })
            .collect()
    }

    pub fn team_records(&self, sport: &str) -> Vec<TeamRecord> {
        self.teams
            .items
            .iter()
            .map(|t| TeamRecord::new(sport, t.id.to_string(), &t.name, t.league.clone()))
            .collect()
    }
}
