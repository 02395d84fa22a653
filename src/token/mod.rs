//! Session tokens: one cached credential value plus the refresh protocol.
//!
//! [`SessionToken`] is the shared engine. It owns the cached value and
//! guarantees at most one refresh in flight per token: the first caller to
//! find the cache empty drives the refresh, every caller arriving while it
//! runs waits on the same result. What a refresh actually does is supplied
//! by a [`TokenSource`]:
//!
//! - [`LoginToken`]: durable storage, no network.
//! - [`PreviewToken`]: POSTs to the preview session-creation endpoint.
//! - [`IncognitoToken`]: same protocol, in memory, discarded with its profile.

mod create_session;
mod login;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Error;

pub use create_session::{
    CreateSessionPayload, CreateSessionSource, EndpointResponse, IncognitoToken, PreviewToken,
    SessionEndpoint, SessionKind, SessionResponse, interpret_response,
};
pub use login::{LoginSource, LoginToken};

/// Result of one [`TokenSource::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A value was obtained; it becomes the cached value.
    Acquired(String),
    /// The request succeeded but produced no new value; keep the cache as is.
    Unchanged,
    /// The attempt failed. Resolves to `""` and leaves nothing cached.
    Failed,
}

/// Whether a refresh is currently running for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Strategy behind a [`SessionToken`]: where values come from and where
/// explicitly set values go.
///
/// Implementations must not fail past their own boundary; log and return
/// [`RefreshOutcome::Failed`] instead.
pub trait TokenSource: Send + Sync + 'static {
    /// Acquire a value. `current` is the cached value when the refresh began.
    fn fetch(&self, current: &str) -> impl Future<Output = RefreshOutcome> + Send;

    /// Read the value held by the backing store at startup, if any.
    fn load(&self) -> impl Future<Output = Option<String>> + Send;

    /// Persist an explicitly set value (`""` clears it).
    fn persist(&self, _value: &str) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for TokenSource (needed for Box<dyn>).
trait TokenSourceDyn: Send + Sync {
    fn fetch_dyn<'a>(&'a self, current: &'a str) -> BoxFuture<'a, RefreshOutcome>;

    fn load_dyn(&self) -> BoxFuture<'_, Option<String>>;

    fn persist_dyn<'a>(&'a self, value: &'a str) -> BoxFuture<'a, Result<(), Error>>;
}

impl<T: TokenSource> TokenSourceDyn for T {
    fn fetch_dyn<'a>(&'a self, current: &'a str) -> BoxFuture<'a, RefreshOutcome> {
        Box::pin(self.fetch(current))
    }

    fn load_dyn(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(self.load())
    }

    fn persist_dyn<'a>(&'a self, value: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(self.persist(value))
    }
}

/// A named session credential with a cached value and single-flight refresh.
///
/// Cheap to clone; clones share the same cache. An empty value means the
/// credential is absent.
#[derive(Clone)]
pub struct SessionToken {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    source: Box<dyn TokenSourceDyn>,
    refresh_timeout: Duration,
    state: Mutex<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cached: String,
    flight: Option<Flight>,
    next_flight: u64,
    invalidate_after_flight: bool,
}

/// The refresh currently in progress. Waiters subscribe to `tx`; `None`
/// means unresolved.
struct Flight {
    id: u64,
    tx: watch::Sender<Option<String>>,
}

enum Entry {
    Cached(String),
    Join(watch::Receiver<Option<String>>),
    Lead {
        id: u64,
        current: String,
        rx: watch::Receiver<Option<String>>,
    },
}

impl SessionToken {
    /// Create a token named after the cookie it mirrors.
    #[must_use]
    pub fn new<S: TokenSource>(
        name: impl Into<String>,
        source: S,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                source: Box::new(source),
                refresh_timeout,
                state: Mutex::new(TokenState::default()),
            }),
        }
    }

    /// Cookie / credential name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Cached value, without I/O. `""` when absent.
    #[must_use]
    pub fn current_value(&self) -> String {
        self.inner.state.lock().cached.clone()
    }

    #[must_use]
    pub fn refresh_state(&self) -> RefreshState {
        if self.inner.state.lock().flight.is_some() {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Return the cached value, fetching one first if the cache is empty.
    ///
    /// Concurrent callers share a single fetch and all observe its result.
    /// Never fails: a failed or timed-out fetch resolves to `""` and caches
    /// nothing, so the next call retries.
    pub async fn refresh(&self) -> String {
        let (id, current, rx) = match self.enter() {
            Entry::Cached(value) => return value,
            Entry::Join(rx) => return self.wait(rx).await,
            Entry::Lead { id, current, rx } => (id, current, rx),
        };

        let guard = FlightGuard {
            token: self,
            id,
            rx,
            completed: false,
        };

        let fetch = self.inner.source.fetch_dyn(&current);
        let outcome = match tokio::time::timeout(self.inner.refresh_timeout, fetch).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    token = %self.inner.name,
                    timeout_ms = self.inner.refresh_timeout.as_millis() as u64,
                    "Session token refresh timed out"
                );
                RefreshOutcome::Failed
            }
        };

        guard.complete(outcome)
    }

    /// Drop the cached value so the next [`refresh`](Self::refresh) fetches
    /// again. During a refresh, takes effect once it resolves.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock();
        if state.flight.is_some() {
            state.invalidate_after_flight = true;
        } else {
            state.cached.clear();
        }
        tracing::debug!(token = %self.inner.name, "Session token invalidated");
    }

    /// Seed the cache from the source's backing store. Returns the loaded value.
    pub async fn load(&self) -> String {
        match self.inner.source.load_dyn().await {
            Some(value) => {
                self.replace(value.clone());
                value
            }
            None => self.current_value(),
        }
    }

    /// Adopt a value observed in the browser cookie jar.
    pub fn on_cookie_changed(&self, value: &str) {
        if self.current_value() != value {
            tracing::debug!(token = %self.inner.name, "Cookie changed in browser");
            self.replace(value.to_string());
        }
    }

    /// Persist `value` through the source, then cache it.
    ///
    /// A storage failure leaves the cache untouched, except when clearing:
    /// a cleared credential is dropped from memory regardless.
    pub(crate) async fn set(&self, value: String) -> Result<(), Error> {
        let result = self.inner.source.persist_dyn(&value).await;
        if result.is_ok() || value.is_empty() {
            self.replace(value);
        }
        result
    }

    /// Overwrite the cache, resolving and detaching any in-flight refresh.
    pub(crate) fn replace(&self, value: String) {
        let mut state = self.inner.state.lock();
        state.cached = value.clone();
        state.invalidate_after_flight = false;
        if let Some(flight) = state.flight.take() {
            flight.tx.send_replace(Some(value));
        }
    }

    fn enter(&self) -> Entry {
        let mut state = self.inner.state.lock();
        if let Some(flight) = &state.flight {
            return Entry::Join(flight.tx.subscribe());
        }
        if !state.cached.is_empty() {
            return Entry::Cached(state.cached.clone());
        }

        let id = state.next_flight;
        state.next_flight += 1;
        let (tx, rx) = watch::channel(None);
        state.flight = Some(Flight { id, tx });
        Entry::Lead {
            id,
            current: state.cached.clone(),
            rx,
        }
    }

    async fn wait(&self, mut rx: watch::Receiver<Option<String>>) -> String {
        match rx.wait_for(Option::is_some).await {
            Ok(resolved) => (*resolved).clone().unwrap_or_default(),
            Err(_) => self.current_value(),
        }
    }

    /// Resolve flight `id`. `None` means the driving task went away before
    /// the fetch finished.
    fn finish(&self, id: u64, outcome: Option<RefreshOutcome>) -> Option<String> {
        let mut state = self.inner.state.lock();
        let flight = state.flight.take_if(|flight| flight.id == id)?;

        let resolved = match outcome {
            Some(RefreshOutcome::Acquired(value)) => {
                state.cached = value.clone();
                value
            }
            Some(RefreshOutcome::Unchanged) => state.cached.clone(),
            Some(RefreshOutcome::Failed) => String::new(),
            None => {
                tracing::debug!(token = %self.inner.name, "Refresh abandoned before completion");
                state.cached.clone()
            }
        };
        if std::mem::take(&mut state.invalidate_after_flight) {
            state.cached.clear();
        }

        flight.tx.send_replace(Some(resolved.clone()));
        Some(resolved)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The value is a credential; never print it.
        f.debug_struct("SessionToken")
            .field("name", &self.inner.name)
            .field("state", &self.refresh_state())
            .finish_non_exhaustive()
    }
}

/// Resolves the flight even if the driving future is dropped mid-fetch.
struct FlightGuard<'a> {
    token: &'a SessionToken,
    id: u64,
    rx: watch::Receiver<Option<String>>,
    completed: bool,
}

impl FlightGuard<'_> {
    fn complete(mut self, outcome: RefreshOutcome) -> String {
        self.completed = true;
        match self.token.finish(self.id, Some(outcome)) {
            Some(resolved) => resolved,
            // Superseded (cleared or set explicitly); report what the waiters got.
            None => self.rx.borrow().clone().unwrap_or_default(),
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.token.finish(self.id, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::JoinSet;

    use super::*;
    use crate::test_support::FakeSource;

    fn token_with(source: FakeSource) -> SessionToken {
        SessionToken::new("httpd~preview", source, Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let source = FakeSource::new([RefreshOutcome::Acquired("abc".into())])
            .with_delay(Duration::from_millis(50));
        let calls = source.calls();
        let token = token_with(source);

        let mut set = JoinSet::new();
        for _ in 0..8 {
            let token = token.clone();
            set.spawn(async move { token.refresh().await });
        }

        while let Some(result) = set.join_next().await {
            assert_eq!(result.unwrap(), "abc");
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(token.refresh_state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_cached_value_skips_fetch() {
        let source = FakeSource::new([RefreshOutcome::Acquired("abc".into())]);
        let calls = source.calls();
        let token = token_with(source);

        assert_eq!(token.refresh().await, "abc");
        assert_eq!(token.refresh().await, "abc");
        assert_eq!(token.current_value(), "abc");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_fetch() {
        let source = FakeSource::new([
            RefreshOutcome::Acquired("first".into()),
            RefreshOutcome::Acquired("second".into()),
        ]);
        let calls = source.calls();
        let token = token_with(source);

        assert_eq!(token.refresh().await, "first");
        token.invalidate();
        assert_eq!(token.current_value(), "");
        assert_eq!(token.refresh().await, "second");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_caches_nothing() {
        let source = FakeSource::new([
            RefreshOutcome::Failed,
            RefreshOutcome::Acquired("abc".into()),
        ]);
        let calls = source.calls();
        let token = token_with(source);

        assert_eq!(token.refresh().await, "");
        assert_eq!(token.current_value(), "");
        assert_eq!(token.refresh().await, "abc");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_keeps_cache() {
        let token = token_with(FakeSource::new([RefreshOutcome::Unchanged]));

        assert_eq!(token.refresh().await, "");
        assert_eq!(token.refresh_state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_empty_and_allows_retry() {
        let source = FakeSource::new([
            RefreshOutcome::Acquired("late".into()),
            RefreshOutcome::Acquired("abc".into()),
        ])
        .with_delay(Duration::from_secs(60));
        let calls = source.calls();
        let token = SessionToken::new("httpd~preview", source, Duration::from_secs(1));

        assert_eq!(token.refresh().await, "");
        assert_eq!(token.current_value(), "");
        assert_eq!(token.refresh_state(), RefreshState::Idle);

        token.refresh().await;
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_refresh_applies_after_resolution() {
        let source = FakeSource::new([RefreshOutcome::Acquired("abc".into())])
            .with_delay(Duration::from_millis(50));
        let token = token_with(source);

        let leader = {
            let token = token.clone();
            tokio::spawn(async move { token.refresh().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(token.refresh_state(), RefreshState::Refreshing);

        token.invalidate();
        assert_eq!(leader.await.unwrap(), "abc");
        assert_eq!(token.current_value(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_refresh_resolves_waiters() {
        let source = FakeSource::new([RefreshOutcome::Acquired("abc".into())])
            .with_delay(Duration::from_secs(5));
        let token = token_with(source);

        let leader = {
            let token = token.clone();
            tokio::spawn(async move { token.refresh().await })
        };
        tokio::task::yield_now().await;
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.refresh().await })
        };
        tokio::task::yield_now().await;

        leader.abort();
        assert_eq!(waiter.await.unwrap(), "");
        assert_eq!(token.refresh_state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_resolves_waiters_with_new_value() {
        let source = FakeSource::new([RefreshOutcome::Acquired("fetched".into())])
            .with_delay(Duration::from_millis(50));
        let token = token_with(source);

        let leader = {
            let token = token.clone();
            tokio::spawn(async move { token.refresh().await })
        };
        tokio::task::yield_now().await;

        token.on_cookie_changed("from-browser");
        assert_eq!(leader.await.unwrap(), "from-browser");
        assert_eq!(token.current_value(), "from-browser");
    }

    #[tokio::test]
    async fn test_load_seeds_cache() {
        let source = FakeSource::new([]).with_stored("stored");
        let calls = source.calls();
        let token = token_with(source);

        assert_eq!(token.load().await, "stored");
        assert_eq!(token.refresh().await, "stored");
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_set_with_default_persist_caches_value() {
        let token = token_with(FakeSource::new([]));

        token.set("abc".into()).await.unwrap();

        assert_eq!(token.current_value(), "abc");
        assert_eq!(token.refresh().await, "abc");
    }

    #[test]
    fn test_debug_hides_value() {
        let token = token_with(FakeSource::new([]));
        token.on_cookie_changed("secret");

        assert!(!format!("{token:?}").contains("secret"));
    }
}
