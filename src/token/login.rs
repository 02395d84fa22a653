use url::Url;

use super::{RefreshOutcome, SessionToken, TokenSource};
use crate::callback;
use crate::config::GateConfig;
use crate::cookies::{CookieSync, SessionCookie};
use crate::error::Error;
use crate::store::KeyValueStore;

/// Login credential backed by durable storage.
///
/// Storage is the system of record; the browser jar is a mirror. Refreshing
/// never touches the network: it re-reads storage and repairs the jar if the
/// two have drifted apart.
pub struct LoginSource<K, C> {
    store: K,
    cookies: C,
    storage_key: String,
    cookie_name: String,
}

impl<K: KeyValueStore, C: CookieSync> LoginSource<K, C> {
    #[must_use]
    pub fn new(config: &GateConfig, store: K, cookies: C) -> Self {
        Self {
            store,
            cookies,
            storage_key: config.login_storage_key.clone(),
            cookie_name: config.login_cookie.clone(),
        }
    }

    async fn mirror(&self, cookie: SessionCookie) {
        if let Err(e) = self.cookies.write_cookie(cookie).await {
            tracing::warn!(token = %self.cookie_name, error = %e, "Failed to mirror login cookie");
        }
    }
}

impl<K: KeyValueStore, C: CookieSync> TokenSource for LoginSource<K, C> {
    async fn fetch(&self, _current: &str) -> RefreshOutcome {
        let stored = self.load().await.unwrap_or_default();
        let in_jar = self.cookies.read_cookie(&self.cookie_name).await;

        match in_jar {
            Some(jar_value) if jar_value != stored => {
                if stored.is_empty() {
                    tracing::warn!(
                        token = %self.cookie_name,
                        "Browser holds a login cookie that storage does not; keeping storage"
                    );
                } else {
                    tracing::warn!(
                        token = %self.cookie_name,
                        "Login cookie drifted from storage; restoring stored value"
                    );
                    self.mirror(SessionCookie::persistent(&self.cookie_name, &stored))
                        .await;
                }
            }
            None if !stored.is_empty() => {
                self.mirror(SessionCookie::persistent(&self.cookie_name, &stored))
                    .await;
            }
            _ => {}
        }

        if stored.is_empty() {
            RefreshOutcome::Unchanged
        } else {
            RefreshOutcome::Acquired(stored)
        }
    }

    async fn load(&self) -> Option<String> {
        match self.store.get(&self.storage_key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::error!(token = %self.cookie_name, error = %e, "Failed to read login token");
                None
            }
        }
    }

    async fn persist(&self, value: &str) -> Result<(), Error> {
        let stored = if value.is_empty() {
            self.store.remove(&self.storage_key).await
        } else {
            self.store.set(&self.storage_key, value).await
        };
        stored.map_err(|e| Error::Storage(e.to_string()))?;

        let cookie = if value.is_empty() {
            SessionCookie::removal(&self.cookie_name)
        } else {
            SessionCookie::persistent(&self.cookie_name, value)
        };
        self.mirror(cookie).await;
        Ok(())
    }
}

/// The signed-in user's credential.
///
/// One per process. Changes only through [`set_token`](Self::set_token)
/// (after an external sign-in handshake), [`sign_out`](Self::sign_out), or
/// a cookie change reported by the browser.
#[derive(Clone, Debug)]
pub struct LoginToken {
    token: SessionToken,
}

impl LoginToken {
    #[must_use]
    pub fn new<K: KeyValueStore, C: CookieSync>(config: &GateConfig, store: K, cookies: C) -> Self {
        Self {
            token: SessionToken::new(
                config.login_cookie.clone(),
                LoginSource::new(config, store, cookies),
                config.refresh_timeout,
            ),
        }
    }

    /// The underlying token engine.
    #[must_use]
    pub fn as_token(&self) -> &SessionToken {
        &self.token
    }

    /// Cached credential without I/O, `""` when signed out.
    #[must_use]
    pub fn current_value(&self) -> String {
        self.token.current_value()
    }

    /// Cached credential, re-reading storage if the cache is empty.
    pub async fn refresh(&self) -> String {
        self.token.refresh().await
    }

    /// Drop the cached credential without touching storage or the jar.
    ///
    /// Until the next [`refresh`](Self::refresh) or [`load`](Self::load) the
    /// user counts as signed out in memory. Use [`sign_out`](Self::sign_out)
    /// to remove the stored credential as well.
    pub fn invalidate(&self) {
        self.token.invalidate();
    }

    /// Seed the cache from storage at startup, restoring the browser cookie
    /// if it is missing or has drifted.
    pub async fn load(&self) -> String {
        self.token.refresh().await
    }

    /// Whether a login credential is cached.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        !self.token.current_value().is_empty()
    }

    /// Store a credential obtained from a completed sign-in.
    ///
    /// Writes storage, then the browser jar (best-effort), then the cache,
    /// and resolves anyone waiting on a refresh. An empty value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if durable storage rejects the write; the
    /// cached value is left unchanged.
    pub async fn set_token(&self, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            tracing::debug!("Ignoring empty login token");
            return Ok(());
        }
        self.token.set(value.to_string()).await?;
        tracing::info!(token = %self.token.name(), "Signed in");
        Ok(())
    }

    /// Clear the credential from storage, the browser jar and memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if storage could not be cleared. The
    /// in-memory value is cleared regardless.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let result = self.token.set(String::new()).await;
        tracing::info!(token = %self.token.name(), "Signed out");
        result
    }

    /// Apply a sign-in callback URI (`app://login?sessionKey=...`).
    ///
    /// Returns `true` if the URI carried a session key and it was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the key could not be persisted.
    pub async fn complete_sign_in(&self, uri: &Url, config: &GateConfig) -> Result<bool, Error> {
        match callback::extract_session_key(uri, config.callback_scheme(), config.callback_host()) {
            Some(key) => {
                self.set_token(&key).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// React to the browser reporting a change of the login cookie.
    ///
    /// A new non-empty value means the user signed in through a page and is
    /// persisted; an emptied cookie means they signed out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if storage could not be updated.
    pub async fn on_cookie_changed(&self, value: &str) -> Result<(), Error> {
        if value == self.token.current_value() {
            return Ok(());
        }
        if value.is_empty() {
            self.sign_out().await
        } else {
            self.set_token(value).await
        }
    }
}
