use crate::util::DirectConnector;
use crate::{Authenticator, ConnectionFilter, ConnectionInfo, Connector};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Hooks and limits shared by every session of a server.
#[derive(Clone, Default)]
pub struct Socks5Config {
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub filter: Option<Arc<dyn ConnectionFilter>>,
    pub connector: Option<Arc<dyn Connector>>,
    pub connection_limit: Option<usize>,
}

impl Socks5Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires username/password authentication from every client.
    pub fn with_authenticator<A: Authenticator + 'static>(
        mut self,
        authenticator: A,
    ) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    pub fn with_filter<F: ConnectionFilter + 'static>(
        mut self,
        filter: F,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_connector<C: Connector + 'static>(
        mut self,
        connector: C,
    ) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Concurrent connections limit, `0` means unlimited.
    pub fn with_connection_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.connection_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    /// The configured connector, or a direct TCP connection.
    pub fn connector(&self) -> Arc<dyn Connector> {
        match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => Arc::new(DirectConnector),
        }
    }
}

impl fmt::Debug for Socks5Config {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Socks5Config")
            .field("authenticator", &self.authenticator.is_some())
            .field("filter", &self.filter.is_some())
            .field("connector", &self.connector.is_some())
            .field("connection_limit", &self.connection_limit)
            .finish()
    }
}

/// Denies a fixed set of destination ports.
#[derive(Clone, Debug, Default)]
pub struct PortFilter {
    denied: HashSet<u16>,
}

impl PortFilter {
    pub fn new<I: IntoIterator<Item = u16>>(denied: I) -> Self {
        PortFilter {
            denied: denied.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ConnectionFilter for PortFilter {
    async fn filter(
        &self,
        port: u16,
        host: String,
        _: ConnectionInfo,
    ) -> Result<bool> {
        if self.denied.contains(&port) {
            info!("Denied connection to {}:{}.", host, port);
            return Ok(false);
        }

        Ok(true)
    }
}
