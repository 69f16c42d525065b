use crate::registry::SessionId;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use tokio::net::TcpStream;

/// What a hook gets to know about the client connection it is deciding on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionInfo {
    pub id: SessionId,
    pub peer_addr: Option<SocketAddr>,
}

/// Decides on RFC 1929 username/password credentials.
///
/// When an authenticator is configured, username/password is the only method
/// the server will select. Returning `Err` (or panicking) counts as a denial.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        username: String,
        password: String,
        connection: ConnectionInfo,
    ) -> Result<bool>;
}

/// Admission check on the requested destination, before any connection is
/// attempted. Fails closed.
#[async_trait]
pub trait ConnectionFilter: Send + Sync {
    async fn filter(
        &self,
        port: u16,
        host: String,
        connection: ConnectionInfo,
    ) -> Result<bool>;
}

/// Opens the stream to the destination. The error kind decides the reply
/// code sent to the client.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        port: u16,
        host: String,
        connection: ConnectionInfo,
    ) -> io::Result<TcpStream>;
}

#[async_trait]
impl<F, Fut> Authenticator for F
where
    F: Fn(String, String, ConnectionInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send,
{
    async fn authenticate(
        &self,
        username: String,
        password: String,
        connection: ConnectionInfo,
    ) -> Result<bool> {
        (self)(username, password, connection).await
    }
}

#[async_trait]
impl<F, Fut> ConnectionFilter for F
where
    F: Fn(u16, String, ConnectionInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send,
{
    async fn filter(
        &self,
        port: u16,
        host: String,
        connection: ConnectionInfo,
    ) -> Result<bool> {
        (self)(port, host, connection).await
    }
}

#[async_trait]
impl<F, Fut> Connector for F
where
    F: Fn(u16, String, ConnectionInfo) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<TcpStream>> + Send,
{
    async fn connect(
        &self,
        port: u16,
        host: String,
        connection: ConnectionInfo,
    ) -> io::Result<TcpStream> {
        (self)(port, host, connection).await
    }
}

/// Outcome of an admission hook, whichever way it was expressed.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Allowed,
    Denied(String),
}

impl Verdict {
    /// Awaits a boolean hook to completion. `false`, an error and a panic are
    /// all denials.
    pub async fn of<F>(hook: F) -> Self
    where
        F: Future<Output = Result<bool>>,
    {
        match AssertUnwindSafe(hook).catch_unwind().await {
            Ok(Ok(true)) => Verdict::Allowed,
            Ok(Ok(false)) => Verdict::Denied(String::from("hook returned false")),
            Ok(Err(error)) => Verdict::Denied(error.to_string()),
            Err(_) => Verdict::Denied(String::from("hook panicked")),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verdict_normalizes_every_convention() {
        assert_eq!(Verdict::of(async { Ok::<_, anyhow::Error>(true) }).await, Verdict::Allowed);
        assert!(!Verdict::of(async { Ok::<_, anyhow::Error>(false) }).await.is_allowed());
        assert_eq!(
            Verdict::of(async { Err::<bool, _>(anyhow!("backend down")) }).await,
            Verdict::Denied(String::from("backend down"))
        );
    }

    #[tokio::test]
    async fn panicking_hook_is_a_denial() {
        let hook = async {
            if true {
                panic!("boom");
            }
            Ok::<_, anyhow::Error>(true)
        };

        assert!(!Verdict::of(hook).await.is_allowed());
    }

    #[tokio::test]
    async fn closures_are_hooks() {
        let filter = |port: u16, _: String, _: ConnectionInfo| async move { Ok::<_, anyhow::Error>(port != 25) };

        assert!(filter.filter(80, "example.com".into(), ConnectionInfo::default()).await.unwrap());
        assert!(!filter.filter(25, "example.com".into(), ConnectionInfo::default()).await.unwrap());
    }
}
