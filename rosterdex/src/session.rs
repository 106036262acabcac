//! Search session: debounced, request-id tagged searching for one text input
//!
//! Concurrency model:
//! - A driver task owns the query parameters and the latest issued request id
//! - Setters send inputs over an unbounded channel; each input restarts the debounce window
//! - When the window elapses the driver issues a `SearchRequest` on its own task
//! - Responses come back tagged with their request id; only the latest id is applied
//! - State is published through a `watch` channel
//!
//! In-flight searches are never cancelled. Their responses are dropped when stale.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::interface::{EntityFilter, RosterError, SearchRequest, SearchResult};

/// Executes one search request. Implemented by the query engine; tests plug in fakes.
#[async_trait::async_trait]
pub trait EntitySearcher: Send + Sync + 'static {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, RosterError>;
}

/// Snapshot published after every change the caller may want to render.
#[derive(Debug, Clone, Default, PartialEq, uniffi::Record)]
pub struct SessionState {
    /// Current input text, updated on every keystroke
    pub query: String,
    /// Id of the request whose outcome `results`/`error` hold; 0 before the first
    pub request_id: u64,
    pub results: Vec<SearchResult>,
    /// True from the moment a request is issued until the latest one is applied
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub sport: String,
    pub filter: EntityFilter,
    pub limit: u32,
    pub debounce: Duration,
}

impl SessionOptions {
    pub fn new(sport: impl Into<String>) -> Self {
        Self {
            sport: sport.into(),
            filter: EntityFilter::Both,
            limit: 10,
            debounce: Duration::from_millis(200),
        }
    }
}

/// Host-side observer of a session. Called from a runtime worker thread
/// with each published state, in order.
#[uniffi::export(with_foreign)]
pub trait SessionListener: Send + Sync {
    fn on_state_changed(&self, state: SessionState);
}

enum Input {
    Query(String),
    Sport(String),
    Filter(EntityFilter),
    Limit(u32),
}

/// RAII guard that cancels a token when dropped.
/// Dropping the session drops this guard, which stops the driver task.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Handle to a running search session. Dropping it stops the session.
#[derive(uniffi::Object)]
pub struct SearchSession {
    inputs: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<SessionState>,
    _guard: DropGuard,
}

impl SearchSession {
    /// Start a session whose driver runs on `runtime`.
    pub fn spawn(
        searcher: Arc<dyn EntitySearcher>,
        options: SessionOptions,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let token = CancellationToken::new();

        let driver = Driver {
            searcher,
            options,
            inputs: input_rx,
            state: state_tx,
            token: token.clone(),
        };
        runtime.spawn(driver.run());

        Self {
            inputs: input_tx,
            state: state_rx,
            _guard: DropGuard::new(token),
        }
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Push every state change to `listener` until the session is dropped.
    pub fn forward_to(&self, listener: Arc<dyn SessionListener>, runtime: &tokio::runtime::Handle) {
        let mut rx = self.subscribe();
        runtime.spawn(async move {
            // Errors once the driver has exited and dropped the sender
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                listener.on_state_changed(state);
            }
        });
    }

    fn send(&self, input: Input) {
        // Driver only exits once the session is dropped
        let _ = self.inputs.send(input);
    }
}

#[uniffi::export]
impl SearchSession {
    /// Replace the query text. Restarts the debounce window.
    pub fn set_query(&self, text: String) {
        self.send(Input::Query(text));
    }

    pub fn set_sport(&self, sport: String) {
        self.send(Input::Sport(sport));
    }

    pub fn set_filter(&self, filter: EntityFilter) {
        self.send(Input::Filter(filter));
    }

    pub fn set_limit(&self, limit: u32) {
        self.send(Input::Limit(limit));
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }
}

type Response = (u64, Result<Vec<SearchResult>, RosterError>);

struct Driver {
    searcher: Arc<dyn EntitySearcher>,
    options: SessionOptions,
    inputs: mpsc::UnboundedReceiver<Input>,
    state: watch::Sender<SessionState>,
    token: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let (response_tx, mut responses) = mpsc::unbounded_channel::<Response>();
        let mut query = String::new();
        let mut latest_id: u64 = 0;
        let mut deadline: Option<Instant> = None;

        loop {
            let debounce = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.token.cancelled() => break,

                input = self.inputs.recv() => {
                    let Some(input) = input else { break };
                    match input {
                        Input::Query(text) => {
                            query = text;
                            let text = query.clone();
                            self.state.send_modify(|s| s.query = text);
                        }
                        Input::Sport(sport) => self.options.sport = sport,
                        Input::Filter(filter) => self.options.filter = filter,
                        Input::Limit(limit) => self.options.limit = limit,
                    }
                    deadline = Some(Instant::now() + self.options.debounce);
                }

                _ = debounce => {
                    deadline = None;
                    latest_id += 1;
                    let request = SearchRequest {
                        request_id: latest_id,
                        sport: self.options.sport.clone(),
                        filter: self.options.filter,
                        query_text: query.clone(),
                        limit: self.options.limit,
                    };
                    self.state.send_modify(|s| s.loading = true);

                    let searcher = Arc::clone(&self.searcher);
                    let tx = response_tx.clone();
                    tokio::spawn(async move {
                        let result = searcher.search(&request).await;
                        let _ = tx.send((request.request_id, result));
                    });
                }

                Some((id, result)) = responses.recv() => {
                    if id != latest_id {
                        debug!(id, latest_id, "discarding stale search response");
                        continue;
                    }
                    self.state.send_modify(|s| {
                        s.request_id = id;
                        s.loading = false;
                        match result {
                            Ok(results) => {
                                s.results = results;
                                s.error = None;
                            }
                            Err(e) => {
                                s.results.clear();
                                s.error = Some(e.to_string());
                            }
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::EntityType;
    use parking_lot::Mutex;

    /// Echoes the query back as a single result after a per-query delay.
    struct EchoSearcher {
        calls: Mutex<Vec<SearchRequest>>,
        slow_query: &'static str,
    }

    impl EchoSearcher {
        fn new(slow_query: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                slow_query,
            })
        }
    }

    #[async_trait::async_trait]
    impl EntitySearcher for EchoSearcher {
        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, RosterError> {
            self.calls.lock().push(request.clone());
            let delay = if request.query_text == self.slow_query { 250 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if request.query_text == "boom" {
                return Err(RosterError::Database("disk I/O error".into()));
            }
            Ok(vec![SearchResult {
                id: format!("{}-{}", request.sport, request.request_id),
                display_label: request.query_text.clone(),
                name: request.query_text.clone(),
                entity_type: EntityType::Player,
                sport: request.sport.clone(),
                team: None,
                league: None,
            }])
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            debounce: Duration::from_millis(20),
            ..SessionOptions::new("NBA")
        }
    }

    async fn wait_until(
        rx: &mut watch::Receiver<SessionState>,
        f: impl FnMut(&SessionState) -> bool,
    ) -> SessionState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
            .await
            .expect("timed out waiting for session state")
            .expect("session driver stopped")
            .clone()
    }

    #[tokio::test]
    async fn test_debounce_coalesces_keystrokes() {
        let searcher = EchoSearcher::new("");
        let session = SearchSession::spawn(searcher.clone(), options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();

        session.set_query("l".into());
        session.set_query("le".into());
        session.set_query("leb".into());

        let state = wait_until(&mut rx, |s| s.request_id == 1 && !s.loading).await;
        assert_eq!(state.query, "leb");
        assert_eq!(state.results[0].name, "leb");

        let calls = searcher.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query_text, "leb");
        assert_eq!(calls[0].request_id, 1);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let searcher = EchoSearcher::new("a");
        let session = SearchSession::spawn(searcher.clone(), options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();

        session.set_query("a".into());
        // Let the debounce fire so "a" is in flight
        wait_until(&mut rx, |s| s.loading).await;
        session.set_query("ab".into());

        let state = wait_until(&mut rx, |s| s.request_id == 2 && !s.loading).await;
        assert_eq!(state.results[0].name, "ab");

        // "a" resolves afterwards and must not overwrite
        tokio::time::sleep(Duration::from_millis(350)).await;
        let state = session.state();
        assert_eq!(state.request_id, 2);
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.results[0].name, "ab");
        assert_eq!(searcher.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_loading_spans_request() {
        let searcher = EchoSearcher::new("slow");
        let session = SearchSession::spawn(searcher, options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();

        session.set_query("slow".into());
        assert!(!session.state().loading);

        let state = wait_until(&mut rx, |s| s.loading).await;
        assert_eq!(state.request_id, 0);

        let state = wait_until(&mut rx, |s| !s.loading).await;
        assert_eq!(state.request_id, 1);
        assert_eq!(state.results.len(), 1);
    }

    #[tokio::test]
    async fn test_error_clears_results() {
        let searcher = EchoSearcher::new("");
        let session = SearchSession::spawn(searcher, options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();

        session.set_query("fine".into());
        let state = wait_until(&mut rx, |s| s.request_id == 1 && !s.loading).await;
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.error, None);

        session.set_query("boom".into());
        let state = wait_until(&mut rx, |s| s.request_id == 2 && !s.loading).await;
        assert!(state.results.is_empty());
        assert!(state.error.unwrap().contains("disk I/O error"));

        session.set_query("fine again".into());
        let state = wait_until(&mut rx, |s| s.request_id == 3 && !s.loading).await;
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_parameter_changes_reissue_query() {
        let searcher = EchoSearcher::new("");
        let session = SearchSession::spawn(searcher.clone(), options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();

        session.set_query("lakers".into());
        wait_until(&mut rx, |s| s.request_id == 1 && !s.loading).await;

        session.set_sport("NFL".into());
        session.set_filter(EntityFilter::Team);
        session.set_limit(3);
        let state = wait_until(&mut rx, |s| s.request_id == 2 && !s.loading).await;
        assert_eq!(state.results[0].sport, "NFL");

        let calls = searcher.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].sport, "NFL");
        assert_eq!(calls[1].filter, EntityFilter::Team);
        assert_eq!(calls[1].limit, 3);
        assert_eq!(calls[1].query_text, "lakers");
    }

    #[tokio::test]
    async fn test_drop_stops_driver() {
        let searcher = EchoSearcher::new("");
        let session = SearchSession::spawn(searcher, options(), &tokio::runtime::Handle::current());
        let mut rx = session.subscribe();
        drop(session);

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
