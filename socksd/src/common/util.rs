use crate::{ConnectionInfo, Connector};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::{self, TcpSocket, TcpStream};

///
///
///
pub async fn resolve_addr(
    host: &str,
    port: u16,
) -> io::Result<SocketAddr> {
    // First, try to parse host as an IP address.
    if let Ok(ip) = host.parse() {
        return Ok(SocketAddr::new(ip, port));
    }

    // Otherwise, host is probably a domain name.
    let addresses: Vec<SocketAddr> = net::lookup_host((host, port)).await?.collect();
    match addresses[..] {
        [first, ..] => Ok(first),
        [] => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Domain name '{}' didn't resolve to an IP address.", host),
        )),
    }
}

/// Connects a fresh, unconnected socket to `host:port`, resolving the host
/// first. Completes once the connection is established and carries the
/// connection error otherwise, which is what a `Connector` must return.
pub async fn connect_socket(
    socket: TcpSocket,
    host: &str,
    port: u16,
) -> io::Result<TcpStream> {
    let addr = resolve_addr(host, port).await?;
    socket.connect(addr).await
}

/// Connects straight to the requested destination.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectConnector;

#[async_trait]
impl Connector for DirectConnector {
    async fn connect(
        &self,
        port: u16,
        host: String,
        _: ConnectionInfo,
    ) -> io::Result<TcpStream> {
        let addr = resolve_addr(&host, port).await?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        connect_socket(socket, &addr.ip().to_string(), port).await
    }
}
