use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;

/// Consumer-provided durable key-value storage.
///
/// Only the login token uses it; the value stored under the configured key is
/// the system of record for the login credential.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStore for SharedPrefs {
///     async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
///         Ok(self.db.read(key)?)
///     }
///
///     async fn set(&self, key: &str, value: &str) -> Result<(), BoxError> {
///         self.db.write(key, value)?;
///         Ok(())
///     }
///
///     async fn remove(&self, key: &str) -> Result<(), BoxError> {
///         self.db.delete(key)?;
///         Ok(())
///     }
/// }
/// ```
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value. `None` if the key was never set or was removed.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Remove a value. Must succeed if the key is already absent.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, BoxError>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).remove(key)
    }
}
