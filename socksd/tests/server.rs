use socksd::constants::*;
use socksd::{Credentials, Destination, PortFilter, Socks5Config, Socks5Server};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// TCP echo server on a random port. Returns the port.
async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    port
}

async fn proxy(config: Socks5Config) -> (SocketAddr, Socks5Server) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Socks5Server::new(config);
    tokio::spawn(server.clone().serve(listener));

    (addr, server)
}

fn connect_request(destination: &Destination) -> Vec<u8> {
    let mut bytes = vec![SOCKS_VER_5, SOCKS_CMD_CONNECT, SOCKS_RSV];
    bytes.extend(destination.as_socks_bytes().unwrap());
    bytes
}

async fn select_method(
    stream: &mut TcpStream,
    methods: &[u8],
) -> [u8; 2] {
    let mut request = vec![SOCKS_VER_5, methods.len() as u8];
    request.extend(methods);
    stream.write_all(&request).await.unwrap();

    let mut reply = [0; 2];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

#[tokio::test]
async fn authenticated_connect_relays_both_ways() {
    let echo_port = echo_server().await;
    let config = Socks5Config::new().with_authenticator(Credentials::new("alice", "secret"));
    let (proxy_addr, server) = proxy(config).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    let reply = select_method(&mut stream, &[SOCKS_AUTH_NOT_REQUIRED, SOCKS_AUTH_USERNAME_PASSWORD]).await;
    assert_eq!(reply, [SOCKS_VER_5, SOCKS_AUTH_USERNAME_PASSWORD]);

    let mut auth = vec![SOCKS_AUTH_VER];
    auth.extend(Credentials::new("alice", "secret").as_socks_bytes().unwrap());
    stream.write_all(&auth).await.unwrap();
    let mut reply = [0; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [SOCKS_AUTH_VER, SOCKS_AUTH_SUCCESS]);

    let request = connect_request(&Destination::new("127.0.0.1", echo_port));
    stream.write_all(&request).await.unwrap();
    let mut reply = vec![0; request.len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, request);

    assert_eq!(server.registry().len(), 1);

    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let (mut reader, mut writer) = stream.split();
    let send = async {
        writer.write_all(&payload).await.unwrap();
        writer.shutdown().await.unwrap();
    };
    let receive = async {
        let mut echoed = vec![];
        reader.read_to_end(&mut echoed).await.unwrap();
        echoed
    };

    let (_, echoed) = tokio::join!(send, receive);
    assert_eq!(echoed, payload);

    // The registry entry goes away once the session task has finished.
    for _ in 0..50 {
        if server.registry().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn refused_destination_is_reported() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let (proxy_addr, _server) = proxy(Socks5Config::new()).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    let reply = select_method(&mut stream, &[SOCKS_AUTH_NOT_REQUIRED]).await;
    assert_eq!(reply, [SOCKS_VER_5, SOCKS_AUTH_NOT_REQUIRED]);

    let request = connect_request(&Destination::new("127.0.0.1", closed_port));
    stream.write_all(&request).await.unwrap();

    let mut reply = vec![];
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply.len(), request.len());
    assert_eq!(reply[1], 0x05);
}

#[tokio::test]
async fn denied_port_is_not_allowed() {
    let (proxy_addr, _server) = proxy(Socks5Config::new().with_filter(PortFilter::new(vec![25]))).await;

    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    select_method(&mut stream, &[SOCKS_AUTH_NOT_REQUIRED]).await;

    let request = connect_request(&Destination::new("mail.example.com", 25));
    stream.write_all(&request).await.unwrap();

    let mut reply = vec![];
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply.len(), request.len());
    assert_eq!(reply[1], 0x02);
}

#[tokio::test]
async fn connections_over_the_limit_are_dropped() {
    let (proxy_addr, _server) = proxy(Socks5Config::new().with_connection_limit(1)).await;

    // Holds the only permit while it waits in the handshake.
    let mut first = TcpStream::connect(proxy_addr).await.unwrap();
    first.write_all(&[SOCKS_VER_5]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = TcpStream::connect(proxy_addr).await.unwrap();
    let mut buf = vec![];
    second.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());

    first.write_all(&[1, SOCKS_AUTH_NOT_REQUIRED]).await.unwrap();
    let mut reply = [0; 2];
    first.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [SOCKS_VER_5, SOCKS_AUTH_NOT_REQUIRED]);
}
