//! Credential-gated dispatch of backend operations.
//!
//! [`OperationDispatcher::execute`] asks the [`RequestGate`] for clearance,
//! sends the operation with the cleared credential, and folds every outcome
//! into a typed [`OperationError`]. Nothing raw escapes to the caller.

mod operation;

use std::sync::Arc;

pub use operation::{ApiResponse, ApiTransport, Operation, OperationKind, OperationRequest};

use operation::GraphqlEnvelope;

use crate::gate::{OperationPolicy, RequestGate};

/// Why an operation produced no data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum OperationError {
    /// No usable credential for a login-required operation; nothing was sent.
    #[error("Not authorized: sign-in required")]
    NotAuthorized,

    /// The request could not be completed. Safe to retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend refused the credential. The credential has been dropped;
    /// the user should be sent through sign-in rather than retried blindly.
    #[error("Credential rejected by server (HTTP {status})")]
    ServerRejected { status: u16 },

    /// The response body could not be understood.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The backend answered with GraphQL errors.
    #[error("GraphQL errors: {}", .0.join("; "))]
    Graphql(Vec<String>),
}

impl OperationError {
    /// Transient failure: a later attempt may succeed as is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedResponse(_))
    }

    /// The user has to (re-)authenticate before this can succeed.
    #[must_use]
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::NotAuthorized | Self::ServerRejected { .. })
    }
}

/// Successful operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Response<D> {
    pub data: D,
    /// Name of the credential the call was made with, `None` if anonymous.
    pub credential: Option<String>,
}

/// Runs operations through a [`RequestGate`] and an [`ApiTransport`].
pub struct OperationDispatcher<T> {
    gate: RequestGate,
    transport: T,
    client_cookies: Vec<(String, String)>,
}

impl<T: ApiTransport> OperationDispatcher<T> {
    #[must_use]
    pub fn new(gate: RequestGate, transport: T) -> Self {
        Self {
            gate,
            transport,
            client_cookies: Vec::new(),
        }
    }

    /// Cookies sent with every operation in addition to the session cookie.
    #[must_use]
    pub fn with_client_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.client_cookies = cookies;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Execute `operation` if `policy` allows it.
    ///
    /// # Errors
    ///
    /// - [`OperationError::NotAuthorized`] if the gate refused; nothing is sent.
    /// - [`OperationError::ServerRejected`] on HTTP 401/403, after invalidating
    ///   the credential used.
    /// - [`OperationError::Transport`] if no response was obtained or the
    ///   status was otherwise unsuccessful.
    /// - [`OperationError::MalformedResponse`] if the body was not a GraphQL
    ///   response carrying `data`.
    /// - [`OperationError::Graphql`] if the response carried `errors`.
    pub async fn execute<O: Operation>(
        &self,
        operation: &O,
        policy: OperationPolicy,
    ) -> Result<Response<O::Data>, OperationError> {
        let name = operation.name();
        let kind = O::KIND;

        let Some(clearance) = self.gate.clearance(policy).await else {
            tracing::info!(operation = name, %kind, "Could not perform operation: user is not authorized");
            return Err(OperationError::NotAuthorized);
        };

        let request = OperationRequest::from_operation(operation);
        let mut cookies = self.client_cookies.clone();
        cookies.extend(clearance.cookies());

        let response = self.transport.send(&request, cookies).await.map_err(|e| {
            tracing::error!(operation = name, %kind, error = %e, "Could not perform network request");
            OperationError::Transport(e.to_string())
        })?;

        if matches!(response.status, 401 | 403) {
            tracing::warn!(
                operation = name,
                %kind,
                status = response.status,
                credential = ?clearance.credential(),
                "Credential rejected"
            );
            clearance.invalidate();
            return Err(OperationError::ServerRejected {
                status: response.status,
            });
        }
        if !(200..300).contains(&response.status) {
            tracing::error!(operation = name, %kind, status = response.status, "Unsuccessful response");
            return Err(OperationError::Transport(format!("HTTP {}", response.status)));
        }

        let envelope: GraphqlEnvelope<O::Data> =
            serde_json::from_str(&response.body).map_err(|e| {
                tracing::error!(operation = name, %kind, error = %e, "Could not parse response");
                OperationError::MalformedResponse(e.to_string())
            })?;

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            tracing::error!(operation = name, %kind, "Response had errors");
            for error in &errors {
                tracing::error!(operation = name, message = %error.message, "\tError");
            }
            return Err(OperationError::Graphql(
                errors.into_iter().map(|error| error.message).collect(),
            ));
        }

        let data = envelope.data.ok_or_else(|| {
            tracing::error!(operation = name, %kind, "Response carried no data");
            OperationError::MalformedResponse("missing data".into())
        })?;

        Ok(Response {
            data,
            credential: clearance.credential().map(str::to_string),
        })
    }

    /// Run a mutation in the background and hand its result to `callback`.
    pub fn spawn_mutation<O, F>(
        self: &Arc<Self>,
        mutation: O,
        policy: OperationPolicy,
        callback: F,
    ) -> tokio::task::JoinHandle<()>
    where
        O: Operation + 'static,
        F: FnOnce(Result<Response<O::Data>, OperationError>) + Send + 'static,
    {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let result = dispatcher.execute(&mutation, policy).await;
            callback(result);
        })
    }
}
