//! Connection and factory traits consumed by the pool

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A live handle to a backend resource
///
/// The pool never looks inside a connection. It only asks whether it is still
/// usable and tells it to go away.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Cheap liveness probe
    ///
    /// Called on every candidate popped during acquisition and on idle
    /// connections during keep-alive sweeps. Returning `false` gets the
    /// connection disconnected and dropped from the pool.
    async fn validate(&mut self) -> bool;

    /// Tear the connection down
    async fn disconnect(&mut self) -> Result<()>;
}

/// Opens new connections for a pool
///
/// A factory owns whatever it needs to dial its backend (address,
/// credentials, options), typically a [`ConnectParams`].
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type this factory produces
    type Connection: Connection;

    /// Open a new connection
    async fn open(&self) -> Result<Self::Connection>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    type Connection = T::Connection;

    async fn open(&self) -> Result<Self::Connection> {
        (**self).open().await
    }
}

/// Address, credentials and driver options for dialing a backend
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectParams {
    /// Host and port, URL or socket path, depending on the backend
    pub address: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Additional backend-specific options
    pub options: HashMap<String, String>,
}

impl ConnectParams {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Set username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set a backend-specific option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Get an option value
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_builder() {
        let params = ConnectParams::new("127.0.0.1:5672")
            .with_credentials("guest", "secret")
            .with_option("vhost", "/");

        assert_eq!(params.address, "127.0.0.1:5672");
        assert_eq!(params.username.as_deref(), Some("guest"));
        assert_eq!(params.option("vhost"), Some("/"));
        assert_eq!(params.option("missing"), None);
    }

    #[test]
    fn test_connect_params_debug_hides_password() {
        let params = ConnectParams::new("db:3306").with_credentials("root", "hunter2");
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_connect_params_deserialize_defaults() {
        let params: ConnectParams =
            serde_json::from_str(r#"{"address":"localhost:9000"}"#).expect("deserialize");
        assert_eq!(params.address, "localhost:9000");
        assert!(params.username.is_none());
        assert!(params.options.is_empty());
    }
}
