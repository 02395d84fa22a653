use std::future::Future;

use derive_more::Display;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OperationKind {
    #[display("query")]
    Query,
    #[display("mutation")]
    Mutation,
}

/// A GraphQL query or mutation against the backend.
///
/// # Example
///
/// ```rust,ignore
/// struct SearchQuery { query: String }
///
/// impl Operation for SearchQuery {
///     type Data = SearchData;
///     const KIND: OperationKind = OperationKind::Query;
///
///     fn name(&self) -> &str { "Search" }
///     fn document(&self) -> &str { "query Search($q: String!) { search(q: $q) { title } }" }
///     fn variables(&self) -> serde_json::Value { serde_json::json!({ "q": self.query }) }
/// }
/// ```
pub trait Operation: Send + Sync {
    /// Shape of the response's `data` field.
    type Data: DeserializeOwned + Send;

    const KIND: OperationKind;

    /// Operation name, used for logging and as `operationName`.
    fn name(&self) -> &str;

    /// GraphQL document text.
    fn document(&self) -> &str;

    fn variables(&self) -> JsonValue {
        JsonValue::Object(serde_json::Map::new())
    }
}

/// Transport-level view of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub name: String,
    pub document: String,
    pub variables: JsonValue,
}

impl OperationRequest {
    #[must_use]
    pub fn from_operation<O: Operation>(operation: &O) -> Self {
        Self {
            kind: O::KIND,
            name: operation.name().to_string(),
            document: operation.document().to_string(),
            variables: operation.variables(),
        }
    }
}

/// Raw HTTP result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Sends operations to the backend. Implemented over HTTP by
/// [`GraphqlTransport`](crate::http::GraphqlTransport); tests substitute fakes.
pub trait ApiTransport: Send + Sync + 'static {
    /// Send `request` with `cookies` attached. `Err` means no HTTP response
    /// was obtained at all.
    fn send(
        &self,
        request: &OperationRequest,
        cookies: Vec<(String, String)>,
    ) -> impl Future<Output = Result<ApiResponse, BoxError>> + Send;
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
#[serde(bound = "D: DeserializeOwned")]
pub(crate) struct GraphqlEnvelope<D> {
    #[serde(default)]
    pub(crate) data: Option<D>,
    #[serde(default)]
    pub(crate) errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphqlError {
    pub(crate) message: String,
}
