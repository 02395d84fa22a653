use std::future::Future;

use derive_more::Display;
use serde::Deserialize;
use time::Duration;

use super::{RefreshOutcome, SessionToken, TokenSource};
use crate::config::GateConfig;
use crate::cookies::{CookieSync, SessionCookie};
use crate::error::BoxError;

/// Payload returned by the session-creation endpoints.
///
/// Result codes:
/// - `0`: unknown issue encountered
/// - `1`: new session created
/// - `2`: no session created; already authenticated with a preview session
/// - `3`: no session created; already authenticated with an incognito session
/// - `4`: no session created; already authenticated with a login session
/// - `5`: no session created; something went wrong (see `error`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateSessionPayload {
    #[serde(default)]
    pub result_code: Option<i64>,
    #[serde(default)]
    pub session_duration: Option<i64>,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which session-creation endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionKind {
    #[display("preview")]
    Preview,
    #[display("incognito")]
    Incognito,
}

/// Raw HTTP result of a session-creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: String,
}

/// Transport for session-creation requests.
///
/// `cookies` are the `(name, value)` pairs to send; they never include the
/// cookie of the token being refreshed.
pub trait SessionEndpoint: Send + Sync + 'static {
    fn create_session(
        &self,
        kind: SessionKind,
        cookies: Vec<(String, String)>,
    ) -> impl Future<Output = Result<EndpointResponse, BoxError>> + Send;
}

/// Interpretation of a session-creation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResponse {
    /// A new session was created.
    Created {
        session_key: String,
        duration_secs: Option<i64>,
    },
    /// The request was processed but no session was created, usually because
    /// another credential already authenticated it.
    NotCreated { result_code: Option<i64> },
    /// HTTP 500.
    ServerError { error: Option<String> },
    /// The body was not a [`CreateSessionPayload`].
    Malformed { detail: String },
    /// Result code 5.
    Rejected { error: Option<String> },
    /// Anything else.
    Unhandled {
        status: u16,
        result_code: Option<i64>,
    },
}

/// Classify a session-creation response.
///
/// Checked in order: HTTP 500, unparseable body, result code 5, result codes
/// 2-4, HTTP 200, then result code 1 with a session key on HTTP 201.
#[must_use]
pub fn interpret_response(status: u16, body: &str) -> SessionResponse {
    if status == 500 {
        let error = serde_json::from_str::<CreateSessionPayload>(body)
            .ok()
            .and_then(|payload| payload.error);
        return SessionResponse::ServerError { error };
    }

    let payload: CreateSessionPayload = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => {
            return SessionResponse::Malformed {
                detail: e.to_string(),
            };
        }
    };

    match payload.result_code {
        Some(5) => SessionResponse::Rejected {
            error: payload.error,
        },
        Some(2..=4) => SessionResponse::NotCreated {
            result_code: payload.result_code,
        },
        _ if status == 200 => SessionResponse::NotCreated {
            result_code: payload.result_code,
        },
        Some(1) if status == 201 => match payload.session_key {
            Some(session_key) if !session_key.is_empty() => SessionResponse::Created {
                session_key,
                duration_secs: payload.session_duration,
            },
            _ => SessionResponse::Unhandled {
                status,
                result_code: payload.result_code,
            },
        },
        result_code => SessionResponse::Unhandled {
            status,
            result_code,
        },
    }
}

/// Network-backed refresh: asks the backend to create a session.
pub struct CreateSessionSource<E, C> {
    endpoint: E,
    cookies: C,
    kind: SessionKind,
    cookie_name: String,
    client_cookies: Vec<(String, String)>,
    siblings: Vec<SessionToken>,
}

impl<E: SessionEndpoint, C: CookieSync> CreateSessionSource<E, C> {
    #[must_use]
    pub fn new(config: &GateConfig, kind: SessionKind, endpoint: E, cookies: C) -> Self {
        let cookie_name = match kind {
            SessionKind::Preview => config.preview_cookie.clone(),
            SessionKind::Incognito => config.incognito_cookie.clone(),
        };
        Self {
            endpoint,
            cookies,
            kind,
            cookie_name,
            client_cookies: config.client_cookies(),
            siblings: Vec::new(),
        }
    }

    /// Send `token`'s cookie along with every session-creation request, so
    /// the backend can tell the caller is already authenticated.
    #[must_use]
    pub fn with_sibling(mut self, token: SessionToken) -> Self {
        if token.name() != self.cookie_name {
            self.siblings.push(token);
        }
        self
    }

    fn request_cookies(&self) -> Vec<(String, String)> {
        let mut cookies = self.client_cookies.clone();
        for sibling in &self.siblings {
            let value = sibling.current_value();
            if !value.is_empty() {
                cookies.push((sibling.name().to_string(), value));
            }
        }
        cookies
    }
}

impl<E: SessionEndpoint, C: CookieSync> TokenSource for CreateSessionSource<E, C> {
    async fn fetch(&self, _current: &str) -> RefreshOutcome {
        let token = self.cookie_name.as_str();
        let response = match self
            .endpoint
            .create_session(self.kind, self.request_cookies())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(token, error = %e, "Failed to request session token");
                return RefreshOutcome::Failed;
            }
        };

        match interpret_response(response.status, &response.body) {
            SessionResponse::Created {
                session_key,
                duration_secs,
            } => {
                tracing::debug!(token, status = response.status, "New session started");
                let mut cookie = SessionCookie::new(token, &session_key);
                match duration_secs {
                    Some(secs) if secs > 0 => cookie = cookie.expires_in(Duration::seconds(secs)),
                    Some(secs) => {
                        tracing::warn!(token, session_duration = secs, "Ignoring non-positive session duration");
                    }
                    None => {}
                }
                if let Err(e) = self.cookies.write_cookie(cookie).await {
                    tracing::warn!(token, error = %e, "Failed to set session cookie in browser");
                }
                RefreshOutcome::Acquired(session_key)
            }
            SessionResponse::NotCreated { result_code } => {
                tracing::debug!(token, status = response.status, ?result_code, "No session was created");
                RefreshOutcome::Unchanged
            }
            SessionResponse::ServerError { error } => {
                tracing::error!(token, status = response.status, ?error, "Backend error");
                RefreshOutcome::Failed
            }
            SessionResponse::Malformed { detail } => {
                tracing::error!(token, status = response.status, %detail, "Could not parse session payload");
                RefreshOutcome::Failed
            }
            SessionResponse::Rejected { error } => {
                tracing::error!(token, status = response.status, result_code = 5, ?error, "Backend refused to create session");
                RefreshOutcome::Failed
            }
            SessionResponse::Unhandled {
                status,
                result_code,
            } => {
                tracing::error!(token, status, ?result_code, "Unhandled session response");
                RefreshOutcome::Failed
            }
        }
    }

    async fn load(&self) -> Option<String> {
        self.cookies.read_cookie(&self.cookie_name).await
    }
}

/// Ephemeral credential granted to anonymous users.
///
/// Not persisted by this crate; empty at process start until loaded from the
/// browser jar or fetched from the backend.
#[derive(Clone, Debug)]
pub struct PreviewToken {
    token: SessionToken,
}

impl PreviewToken {
    /// Create a preview token. `siblings` (typically the login token) are sent
    /// with each session-creation request.
    #[must_use]
    pub fn new<E: SessionEndpoint, C: CookieSync>(
        config: &GateConfig,
        endpoint: E,
        cookies: C,
        siblings: impl IntoIterator<Item = SessionToken>,
    ) -> Self {
        let source = siblings.into_iter().fold(
            CreateSessionSource::new(config, SessionKind::Preview, endpoint, cookies),
            CreateSessionSource::with_sibling,
        );
        Self {
            token: SessionToken::new(config.preview_cookie.clone(), source, config.refresh_timeout),
        }
    }

    /// The underlying token engine.
    #[must_use]
    pub fn as_token(&self) -> &SessionToken {
        &self.token
    }

    /// Cached session key without I/O, `""` when absent.
    #[must_use]
    pub fn current_value(&self) -> String {
        self.token.current_value()
    }

    /// Cached session key, creating a session on the backend if there is none.
    pub async fn refresh(&self) -> String {
        self.token.refresh().await
    }

    /// Drop the cached session key so the next refresh creates a new session.
    pub fn invalidate(&self) {
        self.token.invalidate();
    }

    /// Pull the current cookie out of the browser jar into the cache.
    pub async fn sync_from_jar(&self) -> String {
        self.token.load().await
    }

    /// Adopt a value the browser reported for this session's cookie.
    pub fn on_cookie_changed(&self, value: &str) {
        self.token.on_cookie_changed(value);
    }
}

/// In-memory credential scoped to one incognito profile.
///
/// Same refresh protocol as [`PreviewToken`]; the value is dropped by
/// [`clear`](Self::clear) when the profile closes.
#[derive(Clone, Debug)]
pub struct IncognitoToken {
    token: SessionToken,
}

impl IncognitoToken {
    /// Create an incognito token for one profile. `siblings` are sent with
    /// each session-creation request.
    #[must_use]
    pub fn new<E: SessionEndpoint, C: CookieSync>(
        config: &GateConfig,
        endpoint: E,
        cookies: C,
        siblings: impl IntoIterator<Item = SessionToken>,
    ) -> Self {
        let source = siblings.into_iter().fold(
            CreateSessionSource::new(config, SessionKind::Incognito, endpoint, cookies),
            CreateSessionSource::with_sibling,
        );
        Self {
            token: SessionToken::new(
                config.incognito_cookie.clone(),
                source,
                config.refresh_timeout,
            ),
        }
    }

    /// The underlying token engine.
    #[must_use]
    pub fn as_token(&self) -> &SessionToken {
        &self.token
    }

    /// Cached session key without I/O, `""` when absent.
    #[must_use]
    pub fn current_value(&self) -> String {
        self.token.current_value()
    }

    /// Cached session key, creating a session on the backend if there is none.
    pub async fn refresh(&self) -> String {
        self.token.refresh().await
    }

    /// Drop the cached session key so the next refresh creates a new session.
    pub fn invalidate(&self) {
        self.token.invalidate();
    }

    /// Pull the current cookie out of the browser jar into the cache.
    pub async fn sync_from_jar(&self) -> String {
        self.token.load().await
    }

    /// Adopt a value the browser reported for this session's cookie.
    pub fn on_cookie_changed(&self, value: &str) {
        self.token.on_cookie_changed(value);
    }

    /// Discard the session because its profile was closed.
    ///
    /// Any in-flight refresh is detached: its waiters resolve with `""` and
    /// its result is thrown away.
    pub fn clear(&self) {
        self.token.replace(String::new());
        tracing::info!(token = %self.token.name(), "Incognito session cleared");
    }
}
