use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Endpoint, cookie and client-identity settings shared by every token and
/// by the dispatcher.
///
/// Required field (`app_url`) is a constructor parameter. Everything else has
/// a default that can be overridden with the `with_*` methods:
///
/// ```rust,ignore
/// use tokengate::GateConfig;
///
/// let config = GateConfig::new("https://example.com/".parse()?)
///     .with_refresh_timeout(std::time::Duration::from_secs(5))
///     .with_client_version("1.4.0");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GateConfig {
    pub(crate) app_url: Url,
    pub(crate) login_cookie: String,
    pub(crate) preview_cookie: String,
    pub(crate) incognito_cookie: String,
    pub(crate) preview_path: String,
    pub(crate) incognito_path: String,
    pub(crate) graphql_path: String,
    pub(crate) refresh_timeout: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) user_agent: String,
    pub(crate) client_id: String,
    pub(crate) client_version: String,
    pub(crate) login_storage_key: String,
    pub(crate) callback_scheme: String,
    pub(crate) callback_host: String,
}

impl GateConfig {
    /// Create a configuration rooted at the backend's app URL.
    #[must_use]
    pub fn new(app_url: Url) -> Self {
        Self {
            app_url,
            login_cookie: "httpd~login".into(),
            preview_cookie: "httpd~preview".into(),
            incognito_cookie: "httpd~incognito".into(),
            preview_path: "preview/create-session".into(),
            incognito_path: "incognito/create-session".into(),
            graphql_path: "graphql".into(),
            refresh_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("tokengate/", env!("CARGO_PKG_VERSION")).into(),
            client_id: "tokengate".into(),
            client_version: env!("CARGO_PKG_VERSION").into(),
            login_storage_key: "login_token".into(),
            callback_scheme: "app".into(),
            callback_host: "login".into(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Required env vars
    /// - `TOKENGATE_APP_URL`: backend root URL (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `TOKENGATE_REFRESH_TIMEOUT_SECS`: bound on a session-creation round trip
    /// - `TOKENGATE_CLIENT_ID`: value of the `X-Client-ID` header
    /// - `TOKENGATE_CLIENT_VERSION`: value of the `X-Client-Version` header
    /// - `TOKENGATE_CALLBACK_SCHEME`: URI scheme of the sign-in callback
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the app URL is missing or any value fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        let app_url_str = std::env::var("TOKENGATE_APP_URL")
            .map_err(|_| Error::Config("TOKENGATE_APP_URL is required".into()))?;
        let app_url: Url = app_url_str
            .parse()
            .map_err(|e| Error::Config(format!("TOKENGATE_APP_URL: {e}")))?;

        let mut config = Self::new(app_url);

        if let Ok(secs) = std::env::var("TOKENGATE_REFRESH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("TOKENGATE_REFRESH_TIMEOUT_SECS: {e}")))?;
            config = config.with_refresh_timeout(Duration::from_secs(secs));
        }
        if let Ok(id) = std::env::var("TOKENGATE_CLIENT_ID") {
            config = config.with_client_id(id);
        }
        if let Ok(version) = std::env::var("TOKENGATE_CLIENT_VERSION") {
            config = config.with_client_version(version);
        }
        if let Ok(scheme) = std::env::var("TOKENGATE_CALLBACK_SCHEME") {
            config = config.with_callback_scheme(scheme);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_login_cookie(mut self, name: impl Into<String>) -> Self {
        self.login_cookie = name.into();
        self
    }

    #[must_use]
    pub fn with_preview_cookie(mut self, name: impl Into<String>) -> Self {
        self.preview_cookie = name.into();
        self
    }

    #[must_use]
    pub fn with_incognito_cookie(mut self, name: impl Into<String>) -> Self {
        self.incognito_cookie = name.into();
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    #[must_use]
    pub fn with_login_storage_key(mut self, key: impl Into<String>) -> Self {
        self.login_storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_callback_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.callback_scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_callback_host(mut self, host: impl Into<String>) -> Self {
        self.callback_host = host.into();
        self
    }

    /// Backend root URL. Session cookies are scoped to its host.
    #[must_use]
    pub fn app_url(&self) -> &Url {
        &self.app_url
    }

    #[must_use]
    pub fn login_cookie(&self) -> &str {
        &self.login_cookie
    }

    #[must_use]
    pub fn preview_cookie(&self) -> &str {
        &self.preview_cookie
    }

    #[must_use]
    pub fn incognito_cookie(&self) -> &str {
        &self.incognito_cookie
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    #[must_use]
    pub fn login_storage_key(&self) -> &str {
        &self.login_storage_key
    }

    #[must_use]
    pub fn callback_scheme(&self) -> &str {
        &self.callback_scheme
    }

    #[must_use]
    pub fn callback_host(&self) -> &str {
        &self.callback_host
    }

    /// Session-creation endpoint for preview sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path cannot be joined onto the app URL.
    pub fn preview_url(&self) -> Result<Url, Error> {
        self.join(&self.preview_path)
    }

    /// Session-creation endpoint for incognito sessions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path cannot be joined onto the app URL.
    pub fn incognito_url(&self) -> Result<Url, Error> {
        self.join(&self.incognito_path)
    }

    /// GraphQL endpoint used by the dispatcher's HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path cannot be joined onto the app URL.
    pub fn graphql_url(&self) -> Result<Url, Error> {
        self.join(&self.graphql_path)
    }

    /// Cookies that identify the client on every backend request.
    #[must_use]
    pub fn client_cookies(&self) -> Vec<(String, String)> {
        vec![
            ("BrowserType".to_string(), self.client_id.clone()),
            ("BrowserVersion".to_string(), self.client_version.clone()),
        ]
    }

    fn join(&self, path: &str) -> Result<Url, Error> {
        self.app_url
            .join(path)
            .map_err(|e| Error::Config(format!("{path}: {e}")))
    }
}
