//! In-memory fakes for the crate's collaborator traits.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cookie::Cookie;
use parking_lot::Mutex;
use time::OffsetDateTime;
use url::Url;

use crate::config::GateConfig;
use crate::cookies::{CookieJar, CookieSync, SessionCookie};
use crate::dispatch::{ApiResponse, ApiTransport, OperationRequest};
use crate::error::{BoxError, Error};
use crate::store::KeyValueStore;
use crate::token::{EndpointResponse, RefreshOutcome, SessionEndpoint, SessionKind, TokenSource};

pub(crate) fn test_config() -> GateConfig {
    GateConfig::new("https://example.com/".parse().unwrap())
}

#[derive(Clone, Default)]
pub(crate) struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scripted [`TokenSource`]. Runs out of script into `Failed`.
pub(crate) struct FakeSource {
    outcomes: Mutex<VecDeque<RefreshOutcome>>,
    calls: CallCounter,
    delay: Option<Duration>,
    stored: Option<String>,
}

impl FakeSource {
    pub(crate) fn new(outcomes: impl IntoIterator<Item = RefreshOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: CallCounter::default(),
            delay: None,
            stored: None,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn with_stored(mut self, value: &str) -> Self {
        self.stored = Some(value.to_string());
        self
    }

    pub(crate) fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl TokenSource for FakeSource {
    async fn fetch(&self, _current: &str) -> RefreshOutcome {
        self.calls.bump();
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(RefreshOutcome::Failed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn load(&self) -> Option<String> {
        self.stored.clone()
    }
}

/// [`CookieSync`] over a map, recording every write.
#[derive(Clone, Default)]
pub(crate) struct FakeCookies {
    values: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<Vec<SessionCookie>>>,
    fail_writes: Arc<AtomicBool>,
}

impl FakeCookies {
    pub(crate) fn insert(&self, name: &str, value: &str) {
        self.values.lock().insert(name.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, name: &str) -> Option<String> {
        self.values.lock().get(name).cloned()
    }

    pub(crate) fn writes(&self) -> Vec<SessionCookie> {
        self.writes.lock().clone()
    }

    pub(crate) fn last_write(&self) -> Option<SessionCookie> {
        self.writes.lock().last().cloned()
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

impl CookieSync for FakeCookies {
    async fn read_cookie(&self, name: &str) -> Option<String> {
        self.value(name).filter(|v| !v.is_empty())
    }

    async fn write_cookie(&self, cookie: SessionCookie) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Cookie("browser unavailable".into()));
        }
        if cookie.is_removal() {
            self.values.lock().remove(cookie.name());
        } else {
            self.insert(cookie.name(), cookie.value());
        }
        self.writes.lock().push(cookie);
        Ok(())
    }
}

/// Browser-style jar speaking `Set-Cookie` strings.
#[derive(Clone, Default)]
pub(crate) struct MemoryCookieJar {
    cookies: Arc<Mutex<HashMap<String, String>>>,
    refuse: Arc<AtomicBool>,
}

impl MemoryCookieJar {
    pub(crate) fn refuse_writes(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl CookieJar for MemoryCookieJar {
    async fn get_cookies(&self, _url: &Url) -> Result<String, BoxError> {
        let cookies = self.cookies.lock();
        Ok(cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "))
    }

    async fn set_cookie(&self, _url: &Url, set_cookie: &str) -> Result<bool, BoxError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let parsed = Cookie::parse(set_cookie.to_string())?;
        let expired = parsed
            .expires_datetime()
            .is_some_and(|at| at <= OffsetDateTime::now_utc());
        let mut cookies = self.cookies.lock();
        if expired || parsed.value().is_empty() {
            cookies.remove(parsed.name());
        } else {
            cookies.insert(parsed.name().to_string(), parsed.value().to_string());
        }
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), BoxError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("disk full".into());
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BoxError> {
        self.check_writable()?;
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BoxError> {
        self.check_writable()?;
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Scripted HTTP-ish responder shared by the endpoint and transport fakes.
struct Script<R> {
    responses: Mutex<VecDeque<Result<(u16, String), String>>>,
    requests: Mutex<Vec<R>>,
    calls: CallCounter,
}

impl<R> Default for Script<R> {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: CallCounter::default(),
        }
    }
}

impl<R: Clone> Script<R> {
    fn push(&self, response: Result<(u16, String), String>) {
        self.responses.lock().push_back(response);
    }

    fn next(&self, request: R) -> Result<(u16, String), BoxError> {
        self.calls.bump();
        self.requests.lock().push(request);
        match self.responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(e.into()),
            None => Err("no scripted response".into()),
        }
    }

    fn last(&self) -> Option<R> {
        self.requests.lock().last().cloned()
    }
}

type SessionRequest = (SessionKind, Vec<(String, String)>);

#[derive(Clone, Default)]
pub(crate) struct FakeEndpoint {
    script: Arc<Script<SessionRequest>>,
    delay: Option<Duration>,
}

impl FakeEndpoint {
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.script.push(Ok((status, body.to_string())));
    }

    pub(crate) fn fail(&self, error: &str) {
        self.script.push(Err(error.to_string()));
    }

    pub(crate) fn calls(&self) -> usize {
        self.script.calls.get()
    }

    pub(crate) fn last_request(&self) -> Option<SessionRequest> {
        self.script.last()
    }
}

impl SessionEndpoint for FakeEndpoint {
    async fn create_session(
        &self,
        kind: SessionKind,
        cookies: Vec<(String, String)>,
    ) -> Result<EndpointResponse, BoxError> {
        let result = self.script.next((kind, cookies));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (status, body) = result?;
        Ok(EndpointResponse { status, body })
    }
}

type TransportRequest = (OperationRequest, Vec<(String, String)>);

#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    script: Arc<Script<TransportRequest>>,
}

impl FakeTransport {
    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.script.push(Ok((status, body.to_string())));
    }

    pub(crate) fn fail(&self, error: &str) {
        self.script.push(Err(error.to_string()));
    }

    pub(crate) fn calls(&self) -> usize {
        self.script.calls.get()
    }

    pub(crate) fn last_request(&self) -> Option<TransportRequest> {
        self.script.last()
    }
}

impl ApiTransport for FakeTransport {
    async fn send(
        &self,
        request: &OperationRequest,
        cookies: Vec<(String, String)>,
    ) -> Result<ApiResponse, BoxError> {
        let (status, body) = self.script.next((request.clone(), cookies))?;
        Ok(ApiResponse { status, body })
    }
}
