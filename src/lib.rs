#![doc = include_str!("../README.md")]

pub mod callback;
pub mod config;
pub mod cookies;
pub mod dispatch;
pub mod error;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod store;
pub mod token;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use callback::extract_session_key;
pub use config::GateConfig;
pub use cookies::{BrowserCookieSync, CookieJar, CookieSync, SessionCookie};
pub use dispatch::{
    ApiResponse, ApiTransport, Operation, OperationDispatcher, OperationError, OperationKind,
    OperationRequest, Response,
};
pub use error::{BoxError, Error};
pub use gate::{Clearance, OperationPolicy, RequestGate};
#[cfg(feature = "http")]
pub use http::{GraphqlTransport, HttpSessionEndpoint};
pub use store::KeyValueStore;
pub use token::{
    IncognitoToken, LoginToken, PreviewToken, RefreshOutcome, RefreshState, SessionEndpoint,
    SessionKind, SessionToken, TokenSource,
};
