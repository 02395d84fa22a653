//! Deciding whether an operation may be sent, and with which credential.

use crate::token::{IncognitoToken, LoginToken, PreviewToken, SessionToken};

/// Per-call requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationPolicy {
    pub requires_login: bool,
}

impl OperationPolicy {
    /// Operation that anonymous users may perform.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            requires_login: false,
        }
    }

    /// Operation that needs a login or preview credential.
    #[must_use]
    pub fn login_required() -> Self {
        Self {
            requires_login: true,
        }
    }
}

/// Permission to dispatch, carrying the credential that authenticates the call.
#[derive(Debug, Clone)]
pub struct Clearance {
    token: Option<SessionToken>,
    value: String,
}

impl Clearance {
    fn anonymous() -> Self {
        Self {
            token: None,
            value: String::new(),
        }
    }

    fn with(token: &SessionToken, value: String) -> Self {
        Self {
            token: Some(token.clone()),
            value,
        }
    }

    /// Name of the credential used, `None` for an anonymous call.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.token.as_ref().map(SessionToken::name)
    }

    /// Session cookie to send with the call.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => vec![(token.name().to_string(), self.value.clone())],
            None => Vec::new(),
        }
    }

    /// The backend rejected the credential: drop it so the next call refetches.
    ///
    /// For the login credential only the cached value is dropped. Durable
    /// storage keeps it, and the gate treats the user as signed out until
    /// [`LoginToken::load`] or [`LoginToken::refresh`] re-reads storage, or a
    /// new sign-in replaces it.
    pub fn invalidate(&self) {
        if let Some(token) = &self.token {
            tracing::warn!(token = %token.name(), "Credential rejected by backend");
            token.invalidate();
        }
    }
}

enum Mode {
    Authenticated {
        login: LoginToken,
        preview: PreviewToken,
    },
    Incognito {
        incognito: IncognitoToken,
    },
}

/// Gatekeeper consulted before every API operation.
pub struct RequestGate {
    mode: Mode,
}

impl RequestGate {
    /// Gate for the regular profile: login credential first, preview session
    /// as a fallback.
    #[must_use]
    pub fn authenticated(login: LoginToken, preview: PreviewToken) -> Self {
        Self {
            mode: Mode::Authenticated { login, preview },
        }
    }

    /// Gate for an incognito profile. Login-required operations wait for an
    /// incognito session; the login and preview tokens are never consulted.
    #[must_use]
    pub fn incognito(incognito: IncognitoToken) -> Self {
        Self {
            mode: Mode::Incognito { incognito },
        }
    }

    /// Whether an operation with `policy` may proceed now.
    pub async fn prepare(&self, policy: OperationPolicy) -> bool {
        self.clearance(policy).await.is_some()
    }

    /// Like [`prepare`](Self::prepare), also returning the credential to use.
    ///
    /// Anonymous operations are never blocked and never trigger a refresh.
    /// For login-required operations the login token is checked before the
    /// preview token, so a signed-in user never costs a preview round trip.
    pub async fn clearance(&self, policy: OperationPolicy) -> Option<Clearance> {
        match &self.mode {
            Mode::Authenticated { login, preview } => {
                let login_value = login.current_value();
                if !login_value.is_empty() {
                    return Some(Clearance::with(login.as_token(), login_value));
                }

                if !policy.requires_login {
                    let preview_value = preview.current_value();
                    return Some(if preview_value.is_empty() {
                        Clearance::anonymous()
                    } else {
                        Clearance::with(preview.as_token(), preview_value)
                    });
                }

                let preview_value = preview.refresh().await;
                if preview_value.is_empty() {
                    tracing::info!("No credential available for login-required operation");
                    None
                } else {
                    Some(Clearance::with(preview.as_token(), preview_value))
                }
            }
            Mode::Incognito { incognito } => {
                if !policy.requires_login {
                    let value = incognito.current_value();
                    return Some(if value.is_empty() {
                        Clearance::anonymous()
                    } else {
                        Clearance::with(incognito.as_token(), value)
                    });
                }

                let value = incognito.refresh().await;
                if value.is_empty() {
                    tracing::info!("No incognito session available for login-required operation");
                    None
                } else {
                    Some(Clearance::with(incognito.as_token(), value))
                }
            }
        }
    }
}
