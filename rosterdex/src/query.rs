//! Query engine: prefix range scan with a scored full-scan fallback
//!
//! 1. Normalize the query; under `MIN_QUERY_LEN` characters answers empty.
//! 2. Range-scan `(sport, normalizedName)` for the prefix.
//! 3. Nothing there → scan the whole sport and keep rows with any lexical match.
//! 4. Score, sort, truncate.

use std::sync::Arc;

use rayon::prelude::*;

use crate::database::{Database, DatabaseResult, EntityTable};
use crate::interface::{EntityFilter, RosterError, SearchRequest, SearchResult};
use crate::models::{PlayerRecord, TeamRecord};
use crate::normalize::{normalize, tokens};
use crate::session::EntitySearcher;

/// Shortest normalized query that reaches the store
pub const MIN_QUERY_LEN: usize = 2;

const PREFIX_MATCH_SCORE: f64 = 100.0;
const TOKEN_PREFIX_SCORE: f64 = 50.0;
const TOKEN_CONTAINS_SCORE: f64 = 25.0;
const LENGTH_PENALTY: f64 = 0.5;

/// Positive match signal between a normalized name and a normalized query,
/// before the length penalty. Zero means the name does not match at all.
pub fn lexical_score(normalized_name: &str, normalized_query: &str) -> f64 {
    let mut score = 0.0;
    if normalized_name.starts_with(normalized_query) {
        score += PREFIX_MATCH_SCORE;
    }
    for query_token in tokens(normalized_query) {
        if tokens(normalized_name).any(|name_token| name_token.starts_with(query_token)) {
            score += TOKEN_PREFIX_SCORE;
        } else if normalized_name.contains(query_token) {
            score += TOKEN_CONTAINS_SCORE;
        }
    }
    score
}

/// Full ranking score: lexical signal minus half a point per character
pub fn score_name(normalized_name: &str, normalized_query: &str) -> f64 {
    lexical_score(normalized_name, normalized_query) - LENGTH_PENALTY * normalized_name.len() as f64
}

struct Scored<T> {
    score: f64,
    record: T,
}

/// Score candidates in parallel, drop non-matches, order and truncate.
///
/// Order: score desc, shorter name, name asc, id asc.
pub(crate) fn rank<T: EntityTable>(candidates: Vec<T>, normalized_query: &str, limit: usize) -> Vec<SearchResult> {
    let mut scored: Vec<Scored<T>> = candidates
        .into_par_iter()
        .filter_map(|record| {
            let lexical = lexical_score(record.normalized_name(), normalized_query);
            if lexical <= 0.0 {
                return None;
            }
            let score = lexical - LENGTH_PENALTY * record.normalized_name().len() as f64;
            Some(Scored { score, record })
        })
        .collect();

    // par_iter doesn't preserve order, the comparator is total so unstable is fine
    scored.sort_unstable_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.normalized_name().len().cmp(&b.record.normalized_name().len()))
            .then_with(|| a.record.normalized_name().cmp(b.record.normalized_name()))
            .then_with(|| a.record.entity_id().cmp(b.record.entity_id()))
    });

    scored.truncate(limit);
    scored.into_iter().map(|s| s.record.into_search_result()).collect()
}

/// Read-only search over the local store. Cheap to clone.
#[derive(Clone)]
pub struct QueryEngine {
    db: Arc<Database>,
}

impl QueryEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Synchronous search. Runs SQLite reads on the calling thread.
    pub fn search_blocking(
        &self,
        sport: &str,
        filter: EntityFilter,
        query_text: &str,
        limit: usize,
    ) -> DatabaseResult<Vec<SearchResult>> {
        let normalized = normalize(query_text);
        if normalized.len() < MIN_QUERY_LEN || limit == 0 {
            return Ok(Vec::new());
        }

        match filter {
            EntityFilter::Player => self.search_table::<PlayerRecord>(sport, &normalized, limit),
            EntityFilter::Team => self.search_table::<TeamRecord>(sport, &normalized, limit),
            EntityFilter::Both => {
                // Players get the odd slot; unused share is not handed to the other side
                let player_share = limit.div_ceil(2);
                let team_share = limit - player_share;

                let mut results = self.search_table::<PlayerRecord>(sport, &normalized, player_share)?;
                if team_share > 0 {
                    results.extend(self.search_table::<TeamRecord>(sport, &normalized, team_share)?);
                }
                results.truncate(limit);
                Ok(results)
            }
        }
    }

    /// Async search; the scan runs on the blocking pool.
    pub async fn search(
        &self,
        sport: &str,
        filter: EntityFilter,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, RosterError> {
        let engine = self.clone();
        let sport = sport.to_string();
        let query_text = query_text.to_string();
        tokio::task::spawn_blocking(move || engine.search_blocking(&sport, filter, &query_text, limit))
            .await
            .map_err(|_| RosterError::Cancelled)?
            .map_err(RosterError::from)
    }

    fn search_table<T: EntityTable>(
        &self,
        sport: &str,
        normalized_query: &str,
        limit: usize,
    ) -> DatabaseResult<Vec<SearchResult>> {
        let mut candidates = self.db.range_query_by_prefix::<T>(sport, normalized_query)?;
        if candidates.is_empty() {
            candidates = self.db.scan_sport::<T>(sport)?;
        }
        Ok(rank(candidates, normalized_query, limit))
    }
}

#[async_trait::async_trait]
impl EntitySearcher for QueryEngine {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, RosterError> {
        QueryEngine::search(
            self,
            &request.sport,
            request.filter,
            &request.query_text,
            request.limit as usize,
        )
        .await
    }
}
