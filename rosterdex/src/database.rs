//! SQLite database layer for the local entity mirror
//!
//! Schema: `players` and `teams` keyed by `(sport, id)` with a compound
//! `(sport, normalizedName)` index for prefix range scans and a `sport` index
//! for bulk clears, plus a `meta` key-value table for sync bookkeeping.
//! Uses r2d2 connection pooling to allow concurrent reads without mutex blocking.
//!
//! Schema versions are tracked with `PRAGMA user_version`:
//! - 1: players + teams
//! - 2: meta

use crate::models::{PlayerRecord, Searchable, SyncMetadata, TeamRecord};
use crate::normalize::{normalize, prefix_upper_bound};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub(crate) const SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS players (
        sport TEXT NOT NULL,
        playerId TEXT NOT NULL,
        firstName TEXT NOT NULL DEFAULT '',
        lastName TEXT NOT NULL DEFAULT '',
        fullName TEXT NOT NULL,
        currentTeam TEXT,
        normalizedName TEXT NOT NULL,
        updatedAt INTEGER NOT NULL,
        PRIMARY KEY (sport, playerId)
    );

    CREATE TABLE IF NOT EXISTS teams (
        sport TEXT NOT NULL,
        teamId TEXT NOT NULL,
        name TEXT NOT NULL,
        league TEXT,
        normalizedName TEXT NOT NULL,
        updatedAt INTEGER NOT NULL,
        PRIMARY KEY (sport, teamId)
    );

    CREATE INDEX IF NOT EXISTS idx_players_sport_name ON players(sport, normalizedName);
    CREATE INDEX IF NOT EXISTS idx_players_sport ON players(sport);
    CREATE INDEX IF NOT EXISTS idx_teams_sport_name ON teams(sport, normalizedName);
    CREATE INDEX IF NOT EXISTS idx_teams_sport ON teams(sport);
"#;

const SCHEMA_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updatedAt INTEGER NOT NULL
    );
"#;

/// "no such table" from SQLite. Hit by databases written before the `meta`
/// table existed, or whose `meta` table was dropped.
fn is_missing_table(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such table"))
}

// ─────────────────────────────────────────────────────────────────────────────
// ENTITY TABLES
// ─────────────────────────────────────────────────────────────────────────────

/// Row mapping for a per-sport entity table.
pub trait EntityTable: Searchable + Sized + 'static {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    const COLUMNS: &'static str;

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>;

    /// Insert or replace one row. `normalizedName` and `updatedAt` are
    /// computed here, never taken from the caller.
    fn write(conn: &Connection, sport: &str, record: &Self, now: i64) -> rusqlite::Result<()>;
}

impl EntityTable for PlayerRecord {
    const TABLE: &'static str = "players";
    const ID_COLUMN: &'static str = "playerId";
    const COLUMNS: &'static str =
        "sport, playerId, firstName, lastName, fullName, currentTeam, normalizedName, updatedAt";

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(PlayerRecord {
            sport: row.get(0)?,
            player_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            full_name: row.get(4)?,
            current_team: row.get(5)?,
            normalized_name: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn write(conn: &Connection, sport: &str, record: &Self, now: i64) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare_cached(
            r#"INSERT OR REPLACE INTO players (sport, playerId, firstName, lastName, fullName, currentTeam, normalizedName, updatedAt)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )?;
        stmt.execute(params![
            sport,
            record.player_id,
            record.first_name,
            record.last_name,
            record.full_name,
            record.current_team,
            normalize(&record.full_name),
            now,
        ])?;
        Ok(())
    }
}

impl EntityTable for TeamRecord {
    const TABLE: &'static str = "teams";
    const ID_COLUMN: &'static str = "teamId";
    const COLUMNS: &'static str = "sport, teamId, name, league, normalizedName, updatedAt";

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(TeamRecord {
            sport: row.get(0)?,
            team_id: row.get(1)?,
            name: row.get(2)?,
            league: row.get(3)?,
            normalized_name: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn write(conn: &Connection, sport: &str, record: &Self, now: i64) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare_cached(
            r#"INSERT OR REPLACE INTO teams (sport, teamId, name, league, normalizedName, updatedAt)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )?;
        stmt.execute(params![
            sport,
            record.team_id,
            record.name,
            record.league,
            normalize(&record.name),
            now,
        ])?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DATABASE
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe database wrapper using connection pooling
///
/// Uses r2d2 connection pool for concurrent read access.
/// WAL mode enables readers to proceed without blocking the single writer.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        Self::open_with_pool_size(path, 8)
    }

    pub fn open_with_pool_size<P: AsRef<Path>>(path: P, max_size: u32) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA busy_timeout=5000;
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA mmap_size=67108864;
                    PRAGMA cache_size=-16000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, and the fallback when the file cannot be opened)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
                Ok(())
            });

        // In-memory needs a single connection that is never recycled to keep its state
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Bring the schema up to `SCHEMA_VERSION`, applying only the missing steps.
    /// Existing player/team rows are never touched.
    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version >= SCHEMA_VERSION {
            if version > SCHEMA_VERSION {
                warn!(version, supported = SCHEMA_VERSION, "local store was written by a newer schema");
            }
            return Ok(());
        }

        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        if version < 1 {
            tx.execute_batch(SCHEMA_V1)?;
        }
        if version < 2 {
            tx.execute_batch(SCHEMA_V2)?;
        }
        tx.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        tx.commit()?;

        if version > 0 {
            info!(from = version, to = SCHEMA_VERSION, "migrated local store schema");
        } else {
            debug!(version = SCHEMA_VERSION, "created local store schema");
        }
        Ok(())
    }

    pub fn schema_version(&self) -> DatabaseResult<i32> {
        let conn = self.get_conn()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Write every record for `sport` in one transaction. Either all rows land
    /// or none do. Returns the number of records written.
    pub fn upsert<T: EntityTable>(&self, sport: &str, records: &[T]) -> DatabaseResult<usize> {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let now = chrono::Utc::now().timestamp();
        for record in records {
            T::write(&tx, sport, record, now)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn upsert_players(&self, sport: &str, players: &[PlayerRecord]) -> DatabaseResult<usize> {
        self.upsert(sport, players)
    }

    pub fn upsert_teams(&self, sport: &str, teams: &[TeamRecord]) -> DatabaseResult<usize> {
        self.upsert(sport, teams)
    }

    /// Delete all player and team rows of a sport. Returns (players, teams) deleted.
    pub fn clear_sport(&self, sport: &str) -> DatabaseResult<(usize, usize)> {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let deleted = Self::delete_sport_rows(&tx, sport)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Delete a sport's rows and its sync metadata in one transaction, so the
    /// next sync starts from scratch.
    pub fn purge_sport(&self, sport: &str) -> DatabaseResult<(usize, usize)> {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let deleted = Self::delete_sport_rows(&tx, sport)?;
        Self::remove_meta(&tx, &SyncMetadata::meta_key(sport))?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_sport_rows(conn: &Connection, sport: &str) -> DatabaseResult<(usize, usize)> {
        let players = conn.execute("DELETE FROM players WHERE sport = ?1", [sport])?;
        let teams = conn.execute("DELETE FROM teams WHERE sport = ?1", [sport])?;
        Ok((players, teams))
    }

    /// Swap a sport's whole catalog for a new snapshot and record its metadata,
    /// all in one transaction. A failure anywhere leaves the previous snapshot intact.
    pub fn replace_sport(
        &self,
        sport: &str,
        players: &[PlayerRecord],
        teams: &[TeamRecord],
        dataset_version: &str,
        now: i64,
    ) -> DatabaseResult<SyncMetadata> {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

        Self::delete_sport_rows(&tx, sport)?;
        for player in players {
            PlayerRecord::write(&tx, sport, player, now)?;
        }
        for team in teams {
            TeamRecord::write(&tx, sport, team, now)?;
        }

        // Duplicate ids in the payload collapse to one row, so count what landed
        let metadata = SyncMetadata {
            sport: sport.to_string(),
            dataset_version: dataset_version.to_string(),
            last_sync_timestamp: now,
            player_count: Self::count_in::<PlayerRecord>(&tx, sport)?,
            team_count: Self::count_in::<TeamRecord>(&tx, sport)?,
        };
        Self::write_sync_metadata(&tx, &metadata, now)?;

        tx.commit()?;
        Ok(metadata)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Point lookup by composite key; `None` when absent
    pub fn get_by_id<T: EntityTable>(&self, sport: &str, id: &str) -> DatabaseResult<Option<T>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE sport = ?1 AND {} = ?2",
            T::COLUMNS,
            T::TABLE,
            T::ID_COLUMN
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        match stmt.query_row(params![sport, id], T::from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_player(&self, sport: &str, player_id: &str) -> DatabaseResult<Option<PlayerRecord>> {
        self.get_by_id(sport, player_id)
    }

    pub fn get_team(&self, sport: &str, team_id: &str) -> DatabaseResult<Option<TeamRecord>> {
        self.get_by_id(sport, team_id)
    }

    /// Rows whose `(sport, normalizedName)` falls in
    /// `[(sport, prefix), (sport, prefix + MAX))`, served by the compound index.
    pub fn range_query_by_prefix<T: EntityTable>(
        &self,
        sport: &str,
        normalized_prefix: &str,
    ) -> DatabaseResult<Vec<T>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE sport = ?1 AND normalizedName >= ?2 AND normalizedName < ?3 ORDER BY normalizedName",
            T::COLUMNS,
            T::TABLE
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let upper = prefix_upper_bound(normalized_prefix);
        let rows = stmt
            .query_map(params![sport, normalized_prefix, upper], T::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every row of a sport (fallback scan for the query engine)
    pub fn scan_sport<T: EntityTable>(&self, sport: &str) -> DatabaseResult<Vec<T>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM {} WHERE sport = ?1", T::COLUMNS, T::TABLE);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([sport], T::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// (players, teams) currently stored for a sport
    pub fn count_rows(&self, sport: &str) -> DatabaseResult<(u64, u64)> {
        let conn = self.get_conn()?;
        Ok((
            Self::count_in::<PlayerRecord>(&conn, sport)?,
            Self::count_in::<TeamRecord>(&conn, sport)?,
        ))
    }

    fn count_in<T: EntityTable>(conn: &Connection, sport: &str) -> DatabaseResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE sport = ?1", T::TABLE);
        let count: i64 = conn.query_row(&sql, [sport], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Meta (key-value)
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a meta value. A missing `meta` table reads as "no value".
    pub fn get_meta(&self, key: &str) -> DatabaseResult<Option<String>> {
        let conn = self.get_conn()?;
        Self::read_meta(&conn, key)
    }

    /// Write a meta value. A missing `meta` table makes this a no-op.
    pub fn set_meta(&self, key: &str, value: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        Self::write_meta(&conn, key, value, chrono::Utc::now().timestamp())
    }

    pub fn delete_meta(&self, key: &str) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        Self::remove_meta(&conn, key)
    }

    fn remove_meta(conn: &Connection, key: &str) -> DatabaseResult<()> {
        match conn.execute("DELETE FROM meta WHERE key = ?1", [key]) {
            Ok(_) => Ok(()),
            Err(e) if is_missing_table(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_meta(conn: &Connection, key: &str) -> DatabaseResult<Option<String>> {
        match conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) if is_missing_table(&e) => {
                debug!(key, "meta table missing, treating as no value");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_meta(conn: &Connection, key: &str, value: &str, now: i64) -> DatabaseResult<()> {
        match conn.execute(
            "INSERT OR REPLACE INTO meta (key, value, updatedAt) VALUES (?1, ?2, ?3)",
            params![key, value, now],
        ) {
            Ok(_) => Ok(()),
            Err(e) if is_missing_table(&e) => {
                debug!(key, "meta table missing, dropping write");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync metadata (typed view over meta)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_sync_metadata(&self, sport: &str) -> DatabaseResult<Option<SyncMetadata>> {
        let conn = self.get_conn()?;
        Self::read_sync_metadata(&conn, sport)
    }

    pub fn set_sync_metadata(&self, metadata: &SyncMetadata) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        Self::write_sync_metadata(&conn, metadata, chrono::Utc::now().timestamp())
    }

    /// Rewrite a sport's metadata with a new `lastSyncTimestamp`, keeping the
    /// rest as stored. Returns `None` when the sport was never synced.
    pub fn touch_sync_timestamp(&self, sport: &str, now: i64) -> DatabaseResult<Option<SyncMetadata>> {
        let conn = self.get_conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let Some(mut metadata) = Self::read_sync_metadata(&tx, sport)? else {
            return Ok(None);
        };
        metadata.last_sync_timestamp = now;
        Self::write_sync_metadata(&tx, &metadata, now)?;
        tx.commit()?;
        Ok(Some(metadata))
    }

    fn read_sync_metadata(conn: &Connection, sport: &str) -> DatabaseResult<Option<SyncMetadata>> {
        let Some(raw) = Self::read_meta(conn, &SyncMetadata::meta_key(sport))? else {
            return Ok(None);
        };
        match serde_json::from_str::<SyncMetadata>(&raw) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                // Unreadable bookkeeping only costs one full re-download
                warn!(sport, error = %e, "discarding unreadable sync metadata");
                Ok(None)
            }
        }
    }

    fn write_sync_metadata(conn: &Connection, metadata: &SyncMetadata, now: i64) -> DatabaseResult<()> {
        let value = serde_json::to_string(metadata)?;
        Self::write_meta(conn, &SyncMetadata::meta_key(&metadata.sport), &value, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn player(sport: &str, id: &str, first: &str, last: &str) -> PlayerRecord {
        PlayerRecord::new(sport, id, Some(first), Some(last), None)
    }

    fn seed_nba(db: &Database) {
        db.upsert_players(
            "NBA",
            &[
                player("NBA", "23", "LeBron", "James"),
                player("NBA", "77", "Luka", "Dončić"),
                player("NBA", "30", "Stephen", "Curry"),
            ],
        )
        .unwrap();
        db.upsert_teams(
            "NBA",
            &[
                TeamRecord::new("NBA", "1", "Lakers", Some("West".into())),
                TeamRecord::new("NBA", "2", "Celtics", Some("East".into())),
            ],
        )
        .unwrap();
    }

    #[test]
    fn test_fresh_database_has_current_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(db.database_size().unwrap() > 0);
    }

    #[test]
    fn test_upsert_and_get_by_id() {
        let db = Database::open_in_memory().unwrap();
        let written = db
            .upsert_players("NBA", &[player("NBA", "77", "Luka", "Dončić")])
            .unwrap();
        assert_eq!(written, 1);

        let stored = db.get_player("NBA", "77").unwrap().unwrap();
        assert_eq!(stored.full_name, "Luka Dončić");
        assert_eq!(stored.normalized_name, normalize(&stored.full_name));
        assert_eq!(stored.normalized_name, "luka doncic");
        assert!(stored.updated_at > 0);
    }

    #[test]
    fn test_write_recomputes_normalized_name() {
        let db = Database::open_in_memory().unwrap();
        let mut drifted = player("NBA", "1", "Kevin", "Durant");
        drifted.normalized_name = "something else".into();
        db.upsert_players("NBA", &[drifted]).unwrap();

        let stored = db.get_player("NBA", "1").unwrap().unwrap();
        assert_eq!(stored.normalized_name, "kevin durant");
    }

    #[test]
    fn test_get_by_id_absent_is_none() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);
        assert!(db.get_player("NBA", "999").unwrap().is_none());
        assert!(db.get_player("NFL", "23").unwrap().is_none());
        assert!(db.get_team("NBA", "1").unwrap().is_some());
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_teams("NBA", &[TeamRecord::new("NBA", "1", "Lakers", None)]).unwrap();
        db.upsert_teams("NBA", &[TeamRecord::new("NBA", "1", "Los Angeles Lakers", None)]).unwrap();

        assert_eq!(db.count_rows("NBA").unwrap(), (0, 1));
        let team = db.get_team("NBA", "1").unwrap().unwrap();
        assert_eq!(team.name, "Los Angeles Lakers");
        assert_eq!(team.normalized_name, "los angeles lakers");
    }

    #[test]
    fn test_upsert_is_atomic() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);

        // Fail the second row of the batch
        {
            let conn = db.get_conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON players
                 WHEN NEW.playerId = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        }

        let result = db.upsert_players(
            "NBA",
            &[player("NBA", "new-1", "Anthony", "Davis"), player("NBA", "bad", "X", "Y")],
        );
        assert!(result.is_err());
        assert!(db.get_player("NBA", "new-1").unwrap().is_none());
        assert_eq!(db.count_rows("NBA").unwrap(), (3, 2));
    }

    #[test]
    fn test_range_query_by_prefix() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);
        db.upsert_players("NFL", &[player("NFL", "12", "Leonard", "Fournette")]).unwrap();

        let hits: Vec<PlayerRecord> = db.range_query_by_prefix("NBA", "l").unwrap();
        let names: Vec<&str> = hits.iter().map(|p| p.normalized_name.as_str()).collect();
        assert_eq!(names, vec!["lebron james", "luka doncic"]);

        let hits: Vec<PlayerRecord> = db.range_query_by_prefix("NBA", "le").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].player_id, "23");

        let hits: Vec<PlayerRecord> = db.range_query_by_prefix("NBA", "james").unwrap();
        assert!(hits.is_empty());

        let teams: Vec<TeamRecord> = db.range_query_by_prefix("NBA", "lak").unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "Lakers");
    }

    #[test]
    fn test_scan_sport_is_scoped() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);
        db.upsert_players("NFL", &[player("NFL", "15", "Patrick", "Mahomes")]).unwrap();

        let nba: Vec<PlayerRecord> = db.scan_sport("NBA").unwrap();
        assert_eq!(nba.len(), 3);
        assert!(nba.iter().all(|p| p.sport == "NBA"));
    }

    #[test]
    fn test_clear_sport() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);
        db.upsert_players("NFL", &[player("NFL", "15", "Patrick", "Mahomes")]).unwrap();

        assert_eq!(db.clear_sport("NBA").unwrap(), (3, 2));
        assert_eq!(db.count_rows("NBA").unwrap(), (0, 0));
        assert_eq!(db.count_rows("NFL").unwrap(), (1, 0));
    }

    #[test]
    fn test_purge_sport_drops_metadata() {
        let db = Database::open_in_memory().unwrap();
        db.replace_sport("NBA", &[player("NBA", "23", "LeBron", "James")], &[], "v1", 100)
            .unwrap();
        db.replace_sport("NFL", &[player("NFL", "15", "Patrick", "Mahomes")], &[], "v9", 100)
            .unwrap();

        assert_eq!(db.purge_sport("NBA").unwrap(), (1, 0));
        assert_eq!(db.get_sync_metadata("NBA").unwrap(), None);
        assert_eq!(db.count_rows("NBA").unwrap(), (0, 0));
        assert!(db.get_sync_metadata("NFL").unwrap().is_some());
    }

    #[test]
    fn test_meta_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_meta("missing").unwrap(), None);

        db.set_meta("lastSport", "NBA").unwrap();
        assert_eq!(db.get_meta("lastSport").unwrap().as_deref(), Some("NBA"));

        db.set_meta("lastSport", "NFL").unwrap();
        assert_eq!(db.get_meta("lastSport").unwrap().as_deref(), Some("NFL"));

        db.delete_meta("lastSport").unwrap();
        assert_eq!(db.get_meta("lastSport").unwrap(), None);
    }

    #[test]
    fn test_meta_tolerates_missing_table() {
        let db = Database::open_in_memory().unwrap();
        db.get_conn().unwrap().execute_batch("DROP TABLE meta").unwrap();

        assert_eq!(db.get_meta("anything").unwrap(), None);
        db.set_meta("anything", "value").unwrap();
        db.delete_meta("anything").unwrap();
        assert_eq!(db.get_sync_metadata("NBA").unwrap(), None);
        assert_eq!(db.touch_sync_timestamp("NBA", 10).unwrap(), None);
    }

    #[test]
    fn test_replace_sport_swaps_catalog_and_writes_metadata() {
        let db = Database::open_in_memory().unwrap();
        seed_nba(&db);

        let metadata = db
            .replace_sport(
                "NBA",
                &[player("NBA", "30", "Stephen", "Curry"), player("NBA", "30", "Steph", "Curry")],
                &[TeamRecord::new("NBA", "3", "Warriors", None)],
                "v2",
                1_700_000_000,
            )
            .unwrap();

        assert_eq!(metadata.dataset_version, "v2");
        assert_eq!(metadata.player_count, 1);
        assert_eq!(metadata.team_count, 1);
        assert_eq!(db.count_rows("NBA").unwrap(), (1, 1));
        assert!(db.get_player("NBA", "23").unwrap().is_none());
        assert_eq!(db.get_player("NBA", "30").unwrap().unwrap().first_name, "Steph");
        assert_eq!(db.get_sync_metadata("NBA").unwrap(), Some(metadata));
    }

    #[test]
    fn test_touch_sync_timestamp_keeps_everything_else() {
        let db = Database::open_in_memory().unwrap();
        let original = SyncMetadata {
            sport: "NBA".into(),
            dataset_version: "v3".into(),
            last_sync_timestamp: 100,
            player_count: 450,
            team_count: 30,
        };
        db.set_sync_metadata(&original).unwrap();

        let touched = db.touch_sync_timestamp("NBA", 200).unwrap().unwrap();
        assert_eq!(touched.last_sync_timestamp, 200);
        assert_eq!(touched.dataset_version, "v3");
        assert_eq!(touched.player_count, 450);
        assert_eq!(db.get_sync_metadata("NBA").unwrap(), Some(touched));
    }

    #[test]
    fn test_unreadable_sync_metadata_reads_as_absent() {
        let db = Database::open_in_memory().unwrap();
        db.set_meta(&SyncMetadata::meta_key("NBA"), "{not json").unwrap();
        assert_eq!(db.get_sync_metadata("NBA").unwrap(), None);
    }

    #[test]
    fn test_upgrade_from_v1_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA_V1).unwrap();
            conn.execute(
                r#"INSERT INTO players (sport, playerId, firstName, lastName, fullName, currentTeam, normalizedName, updatedAt)
                   VALUES ('NBA', '23', 'LeBron', 'James', 'LeBron James', 'Lakers', 'lebron james', 1)"#,
                [],
            )
            .unwrap();
            conn.execute_batch("PRAGMA user_version = 1").unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.count_rows("NBA").unwrap(), (1, 0));
        assert_eq!(db.get_player("NBA", "23").unwrap().unwrap().full_name, "LeBron James");

        db.set_meta("k", "v").unwrap();
        assert_eq!(db.get_meta("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_reopen_persists_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("roster.db");

        {
            let db = Database::open(&path).unwrap();
            seed_nba(&db);
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_rows("NBA").unwrap(), (3, 2));
    }
}
