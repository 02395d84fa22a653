use url::Url;

const SESSION_KEY_PARAM: &str = "sessionKey";

/// Extract the session key from a sign-in callback URI.
///
/// The sign-in flow ends with a redirect to a custom-scheme URI such as
/// `app://login?sessionKey=...`. Returns the key only if the scheme and host
/// match; a missing or empty key yields `None`, which callers treat as a no-op.
#[must_use]
pub fn extract_session_key(uri: &Url, scheme: &str, host: &str) -> Option<String> {
    if uri.scheme() != scheme || uri.host_str() != Some(host) {
        return None;
    }
    uri.query_pairs()
        .find(|(name, _)| name == SESSION_KEY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
