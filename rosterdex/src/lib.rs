//! rosterdex Core - local sports entity search & sync engine
//!
//! Mirrors per-sport player and team catalogs from a backend-of-record into an
//! embedded SQLite store, keeps them fresh with a version-aware bootstrap sync,
//! and answers partial-name lookups locally (indexed prefix scan with a scored
//! fallback) through debounced search sessions.
//!
//! Types are exported via UniFFI proc-macros (#[derive(uniffi::Record/Enum/Object)]).

pub mod config;
pub mod database;
pub mod interface;
pub mod models;
pub mod normalize;
pub mod query;
pub mod session;
mod store;
pub mod sync;

pub use config::RosterConfig;
pub use interface::*;
pub use models::{PlayerRecord, SyncMetadata, TeamRecord};
pub use query::QueryEngine;
pub use session::{EntitySearcher, SearchSession, SessionListener, SessionOptions, SessionState};
pub use store::RosterStore;
pub use sync::{BootstrapSource, FetchOutcome, HttpBootstrapSource, SyncEngine, SyncError, SyncMode};

uniffi::setup_scaffolding!("rosterdex");
