use crate::addresses::{self, AddressType, Destination};
use crate::constants::*;
use crate::cursor::{ByteCursor, CursorError, Endian};
use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use num_traits::FromPrimitive;
use std::cmp;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

mod reply;
mod s5_session;

pub use reply::recognize_connect_error;
pub use s5_session::{Outcome, SessionState, Socks5Session};

/// VER, CMD, RSV, ATYP, the longest domain with its length byte, PORT.
const MAX_REQUEST_FRAME: usize = 4 + 1 + 255 + 2;

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum AuthMethod {
    NoAuthentication = 0x00,
    Gssapi = 0x01,
    UsernamePassword = 0x02,
    NoAcceptableMethods = 0xFF,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum Socks5Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TTLExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Unsupported address type: {0}.")]
    UnsupportedAddressType(u8),
    #[error(transparent)]
    Truncated(#[from] CursorError),
}

/// VER, NMETHODS, METHODS.
#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeRequest {
    pub version: u8,
    pub methods: Vec<u8>,
}

impl HandshakeRequest {
    pub fn parse(frame: Bytes) -> Result<Self, CursorError> {
        let mut cursor = ByteCursor::new(frame);

        let version = cursor.read_u8()?;
        cursor.read_u8()?;
        let methods = cursor.read_prefixed()?.to_vec();

        Ok(HandshakeRequest { version, methods })
    }

    pub fn offers(
        &self,
        method: AuthMethod,
    ) -> bool {
        self.methods.contains(&(method as u8))
    }
}

/// VER, ULEN, UNAME, PLEN, PASSWD.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthRequest {
    pub version: u8,
    pub username: String,
    pub password: String,
}

impl AuthRequest {
    pub fn parse(frame: Bytes) -> Result<Self, CursorError> {
        let mut cursor = ByteCursor::new(frame);

        let version = cursor.read_u8()?;
        cursor.read_u8()?;
        let username = cursor.read_prefixed()?;
        cursor.read_u8()?;
        let password = cursor.read_prefixed()?;

        Ok(AuthRequest {
            version,
            username: String::from_utf8_lossy(&username[..]).to_string(),
            password: String::from_utf8_lossy(&password[..]).to_string(),
        })
    }
}

/// VER, CMD, RSV, ATYP, DST.ADDR, DST.PORT.
///
/// The verbatim frame is kept in `raw`: replies to this request are the same
/// bytes with only the status byte changed.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectRequest {
    pub version: u8,
    pub command: u8,
    pub address_type: AddressType,
    pub destination: Destination,
    pub raw: Bytes,
}

impl ConnectRequest {
    pub fn parse(raw: Bytes) -> Result<Self, RequestError> {
        let mut cursor = ByteCursor::new(raw.clone());

        let version = cursor.read_u8()?;
        let command = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;

        let address_type = cursor.read_u8()?;
        let address_type = match AddressType::from_u8(address_type) {
            Some(address_type) => address_type,
            None => return Err(RequestError::UnsupportedAddressType(address_type)),
        };

        let address = addresses::decode_address(address_type, &mut cursor)?;
        let port = cursor.read_u16(Endian::Big)?;

        Ok(ConnectRequest {
            version,
            command,
            address_type,
            destination: Destination::new(address, port),
            raw,
        })
    }

    pub fn is_connect(&self) -> bool {
        self.command == SOCKS_CMD_CONNECT
    }
}

///
///
///
async fn read_into<S>(
    stream: &mut S,
    frame: &mut BytesMut,
    length: usize,
) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    let start = frame.len();
    frame.resize(start + length, 0);
    stream.read_exact(&mut frame[start..]).await?;

    Ok(())
}

/// Reads one method selection message. Stops after VER when the version is
/// not SOCKS5, so nothing beyond it is consumed.
pub async fn read_handshake_frame<S>(stream: &mut S) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut frame = BytesMut::with_capacity(257);
    read_into(stream, &mut frame, 1).await?;

    if frame[0] == SOCKS_VER_5 {
        read_into(stream, &mut frame, 1).await?;

        let nmethods = frame[1] as usize;
        read_into(stream, &mut frame, nmethods).await?;
    }

    Ok(frame.freeze())
}

/// Reads one username/password request. Stops after VER when the
/// sub-negotiation version is wrong.
pub async fn read_auth_frame<S>(stream: &mut S) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut frame = BytesMut::with_capacity(513);
    read_into(stream, &mut frame, 1).await?;

    if frame[0] == SOCKS_AUTH_VER {
        read_into(stream, &mut frame, 1).await?;

        let ulen = frame[1] as usize;
        read_into(stream, &mut frame, ulen + 1).await?;

        let plen = frame[frame.len() - 1] as usize;
        read_into(stream, &mut frame, plen).await?;
    }

    Ok(frame.freeze())
}

/// Appends what the client has already sent, up to `limit` bytes in total,
/// without waiting for more.
fn read_available<S>(
    stream: &mut S,
    frame: &mut BytesMut,
    limit: usize,
) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; MAX_REQUEST_FRAME];
    while frame.len() < limit {
        let wanted = cmp::min(chunk.len(), limit - frame.len());

        match stream.read(&mut chunk[..wanted]).now_or_never() {
            Some(Ok(0)) | None => break,
            Some(Ok(read)) => frame.extend_from_slice(&chunk[..read]),
            Some(Err(e)) => return Err(e),
        }
    }

    Ok(())
}

/// Reads one request. The address and port are read for known address
/// types; for an unknown one the frame also takes whatever else the client
/// already sent, so the reply can echo it.
pub async fn read_request_frame<S>(stream: &mut S) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut frame = BytesMut::with_capacity(MAX_REQUEST_FRAME);
    read_into(stream, &mut frame, 4).await?;

    match AddressType::from_u8(frame[3]) {
        Some(AddressType::Ipv4) => read_into(stream, &mut frame, 4 + 2).await?,
        Some(AddressType::Ipv6) => read_into(stream, &mut frame, 16 + 2).await?,
        Some(AddressType::Domainname) => {
            read_into(stream, &mut frame, 1).await?;

            let length = frame[frame.len() - 1] as usize;
            read_into(stream, &mut frame, length + 2).await?;
        }
        None => read_available(stream, &mut frame, MAX_REQUEST_FRAME)?,
    }

    Ok(frame.freeze())
}

/// Copy of `frame` with the status byte set to `status`.
pub fn reply_frame(
    frame: &[u8],
    status: u8,
) -> BytesMut {
    let mut reply = BytesMut::from(frame);
    if reply.len() > SOCKS_STATUS_OFFSET {
        reply[SOCKS_STATUS_OFFSET] = status;
    }

    reply
}

/// Sends a final reply and ends the stream gracefully. A failure is only
/// logged; the stream is dropped by the caller either way.
pub async fn terminate<S>(
    stream: &mut S,
    frame: &[u8],
    status: u8,
) where
    S: AsyncWrite + Unpin,
{
    let reply = reply_frame(frame, status);

    let result = async {
        stream.write_all(&reply).await?;
        stream.shutdown().await
    };

    if let Err(e) = result.await {
        debug!("Unable to deliver final reply ({:#04x}): {}.", status, e);
    }
}
