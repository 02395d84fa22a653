//! reqwest-backed implementations of [`SessionEndpoint`] and [`ApiTransport`].

use reqwest::RequestBuilder;
use reqwest::header::{COOKIE, USER_AGENT};
use url::Url;

use crate::config::GateConfig;
use crate::cookies::cookie_header;
use crate::dispatch::{ApiResponse, ApiTransport, OperationRequest};
use crate::error::{BoxError, Error};
use crate::token::{EndpointResponse, SessionEndpoint, SessionKind};

/// Headers identifying this client on every backend request.
#[derive(Debug, Clone)]
struct ClientIdentity {
    user_agent: String,
    client_id: String,
    client_version: String,
}

impl ClientIdentity {
    fn from_config(config: &GateConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            client_id: config.client_id.clone(),
            client_version: config.client_version.clone(),
        }
    }

    fn apply(&self, request: RequestBuilder, cookies: &[(String, String)]) -> RequestBuilder {
        let request = request
            .header(USER_AGENT, &self.user_agent)
            .header("X-Client-ID", &self.client_id)
            .header("X-Client-Version", &self.client_version);
        if cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, cookie_header(cookies))
        }
    }
}

fn build_client(config: &GateConfig) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(Into::into)
}

/// POSTs to the preview / incognito session-creation endpoints.
pub struct HttpSessionEndpoint {
    http: reqwest::Client,
    preview_url: Url,
    incognito_url: Url,
    identity: ClientIdentity,
}

impl HttpSessionEndpoint {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint URLs cannot be built, or
    /// [`Error::Http`] if the HTTP client cannot be initialised.
    pub fn new(config: &GateConfig) -> Result<Self, Error> {
        Ok(Self {
            http: build_client(config)?,
            preview_url: config.preview_url()?,
            incognito_url: config.incognito_url()?,
            identity: ClientIdentity::from_config(config),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl SessionEndpoint for HttpSessionEndpoint {
    async fn create_session(
        &self,
        kind: SessionKind,
        cookies: Vec<(String, String)>,
    ) -> Result<EndpointResponse, BoxError> {
        let url = match kind {
            SessionKind::Preview => &self.preview_url,
            SessionKind::Incognito => &self.incognito_url,
        };

        let request = self.identity.apply(self.http.post(url.clone()), &cookies);
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(EndpointResponse { status, body })
    }
}

/// POSTs GraphQL operations as JSON.
pub struct GraphqlTransport {
    http: reqwest::Client,
    url: Url,
    identity: ClientIdentity,
}

impl GraphqlTransport {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the GraphQL URL cannot be built, or
    /// [`Error::Http`] if the HTTP client cannot be initialised.
    pub fn new(config: &GateConfig) -> Result<Self, Error> {
        Ok(Self {
            http: build_client(config)?,
            url: config.graphql_url()?,
            identity: ClientIdentity::from_config(config),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl ApiTransport for GraphqlTransport {
    async fn send(
        &self,
        request: &OperationRequest,
        cookies: Vec<(String, String)>,
    ) -> Result<ApiResponse, BoxError> {
        let body = serde_json::json!({
            "query": request.document,
            "variables": request.variables,
            "operationName": request.name,
        });

        let builder = self
            .identity
            .apply(self.http.post(self.url.clone()), &cookies)
            .json(&body);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}
