//! Mirroring session values into the embedded browser's cookie jar.
//!
//! The browser engine owns the jar; this module only defines the narrow
//! interface the tokens need ([`CookieSync`]) and an adapter
//! ([`BrowserCookieSync`]) that speaks the engine's string-based jar API.

use std::future::Future;
use std::sync::Arc;

use cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::error::{BoxError, Error};

/// Expiry used for cookies that should outlive the browsing session.
const PERSISTENT_TTL: Duration = Duration::days(3650);

/// One named session cookie, as written to the browser jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    value: String,
    expires: Option<OffsetDateTime>,
}

impl SessionCookie {
    /// Cookie with no explicit expiry.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires: None,
        }
    }

    /// Cookie kept by the jar for the long term (login credential).
    #[must_use]
    pub fn persistent(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value).expires_in(PERSISTENT_TTL)
    }

    /// Removal cookie: empty value, expiry in the past.
    #[must_use]
    pub fn removal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            expires: Some(OffsetDateTime::UNIX_EPOCH),
        }
    }

    /// Expire the cookie `ttl` from now. Lifetimes longer than a persistent
    /// cookie's are capped to it.
    #[must_use]
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires = OffsetDateTime::now_utc().checked_add(ttl.min(PERSISTENT_TTL));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn expires(&self) -> Option<OffsetDateTime> {
        self.expires
    }

    /// Whether writing this cookie deletes the jar entry.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }

    /// Render as a `Set-Cookie` string scoped to the host of `url`.
    #[must_use]
    pub fn to_set_cookie(&self, url: &Url) -> String {
        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .path("/")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax);
        if let Some(host) = url.host_str() {
            builder = builder.domain(host.to_string());
        }
        if let Some(expires) = self.expires {
            builder = builder.expires(expires);
        }
        builder.build().to_string()
    }
}

/// The embedded browser engine's cookie jar.
///
/// Implemented by the consumer on top of whatever engine hosts the pages.
/// Calls may hop onto a UI-affine thread internally; they must not block the
/// calling task.
pub trait CookieJar: Send + Sync + 'static {
    /// All cookies visible to `url`, joined by `;` (`"a=1; b=2"`).
    fn get_cookies(&self, url: &Url) -> impl Future<Output = Result<String, BoxError>> + Send;

    /// Store a cookie given in `Set-Cookie` form. Returns `false` if the
    /// engine refused it.
    fn set_cookie(
        &self,
        url: &Url,
        set_cookie: &str,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;
}

/// Narrow read/write access to a single named cookie.
///
/// Tokens use this to keep the browser jar carrying the same credential the
/// API layer sends. Writes are best-effort: callers log failures and move on.
pub trait CookieSync: Send + Sync + 'static {
    /// Current value of `name`, or `None` if absent, empty or unreadable.
    fn read_cookie(&self, name: &str) -> impl Future<Output = Option<String>> + Send;

    /// Write (or delete, for a [`SessionCookie::removal`]) one cookie.
    fn write_cookie(&self, cookie: SessionCookie) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<T: CookieSync> CookieSync for Arc<T> {
    fn read_cookie(&self, name: &str) -> impl Future<Output = Option<String>> + Send {
        (**self).read_cookie(name)
    }

    fn write_cookie(&self, cookie: SessionCookie) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).write_cookie(cookie)
    }
}

/// [`CookieSync`] over a browser [`CookieJar`], scoped to the app URL.
pub struct BrowserCookieSync<J> {
    jar: J,
    url: Url,
}

impl<J: CookieJar> BrowserCookieSync<J> {
    #[must_use]
    pub fn new(jar: J, url: Url) -> Self {
        Self { jar, url }
    }

    /// The wrapped jar.
    #[must_use]
    pub fn jar(&self) -> &J {
        &self.jar
    }
}

impl<J: CookieJar> CookieSync for BrowserCookieSync<J> {
    async fn read_cookie(&self, name: &str) -> Option<String> {
        let joined = match self.jar.get_cookies(&self.url).await {
            Ok(joined) => joined,
            Err(e) => {
                tracing::warn!(token = name, error = %e, "Failed to read browser cookies");
                return None;
            }
        };
        find_cookie(&joined, name)
    }

    async fn write_cookie(&self, cookie: SessionCookie) -> Result<(), Error> {
        let set_cookie = cookie.to_set_cookie(&self.url);
        match self.jar.set_cookie(&self.url, &set_cookie).await {
            Ok(true) => {
                tracing::debug!(token = cookie.name(), removal = cookie.is_removal(), "Set cookie in browser");
                Ok(())
            }
            Ok(false) => Err(Error::Cookie(format!("browser refused {}", cookie.name()))),
            Err(e) => Err(Error::Cookie(e.to_string())),
        }
    }
}

/// Pick `name` out of a `;`-joined cookie string. Empty values count as absent.
pub(crate) fn find_cookie(joined: &str, name: &str) -> Option<String> {
    Cookie::split_parse(joined)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Render `(name, value)` pairs as a `Cookie` request header value.
pub(crate) fn cookie_header(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| Cookie::new(name.as_str(), value.as_str()).to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
