use crate::addresses::Destination;
use crate::registry::{ActiveSession, SessionId, SessionRegistry};
use crate::socks5::{self, AuthMethod, AuthRequest, ConnectRequest, HandshakeRequest, RequestError};
use crate::socks5::{Socks5Command, Socks5Reply};
use crate::{constants::*, ConnectionInfo, SessionError, Socks5Config, Verdict};
use futures::FutureExt;
use num_traits::FromPrimitive;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Stages of a session, in the only order they can be visited.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum SessionState {
    AwaitingHandshake,
    AwaitingAuth,
    AwaitingRequest,
    Relaying,
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// CONNECT succeeded and the relay ran until both sides were done.
    Relayed,
    /// BIND or UDP ASSOCIATE: answered with SUCCEEDED, then closed.
    Acknowledged(u8),
    /// Closed after a final reply with this status.
    Rejected(u8),
    /// The client left before negotiation was complete.
    Closed,
}

/// One client connection, from method selection up to the end of the relay.
pub struct Socks5Session<S> {
    stream: S,
    connection: ConnectionInfo,
    config: Arc<Socks5Config>,
    registry: SessionRegistry,
    state: SessionState,
    method: Option<AuthMethod>,
}

impl<S> Socks5Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    ///
    ///
    ///
    pub fn new(
        stream: S,
        peer_addr: Option<SocketAddr>,
        config: Arc<Socks5Config>,
        registry: SessionRegistry,
    ) -> Self {
        let connection = ConnectionInfo {
            id: registry.next_id(),
            peer_addr,
        };

        Socks5Session {
            stream,
            connection,
            config,
            registry,
            state: SessionState::AwaitingHandshake,
            method: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.connection.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion. Every stage waits for the previous
    /// one, hooks included, before the next frame is read.
    ///
    /// Rejections are not errors: the client got a reply and the outcome says
    /// which. `Err` means the transport broke, or a connect failed in a way
    /// that has no dedicated reply code.
    pub async fn run(mut self) -> Result<Outcome, SessionError> {
        let result = self.negotiate().await;
        self.transition(SessionState::Closed);

        match result {
            Err(SessionError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(Outcome::Closed),
            result => result,
        }
    }

    async fn negotiate(&mut self) -> Result<Outcome, SessionError> {
        if let Some(outcome) = self.handshake().await? {
            return Ok(outcome);
        }

        if self.method == Some(AuthMethod::UsernamePassword) {
            if let Some(outcome) = self.sub_negotiate().await? {
                return Ok(outcome);
            }
        }

        self.request().await
    }

    /// Method selection, RFC 1928 section 3. `Some` ends the session.
    async fn handshake(&mut self) -> Result<Option<Outcome>, SessionError> {
        let frame = socks5::read_handshake_frame(&mut self.stream).await?;

        let socks_version = frame[0];
        if socks_version != SOCKS_VER_5 {
            debug!("{} Client uses a different SOCKS version: {}.", self.id(), socks_version);
            let outcome = self.reject(&[SOCKS_VER_5, 0], SOCKS_REP_GENERAL_FAILURE).await;

            return Ok(Some(outcome));
        }

        let request = HandshakeRequest::parse(frame)?;

        // An authenticator overrides whatever the client prefers.
        let method = if self.config.authenticator.is_some() {
            AuthMethod::UsernamePassword
        } else if request.offers(AuthMethod::NoAuthentication) {
            AuthMethod::NoAuthentication
        } else {
            debug!("{} No acceptable method in {:?}.", self.id(), request.methods);
            let outcome = self.reject(&[SOCKS_VER_5, 0], SOCKS_AUTH_NO_ACCEPTABLE_METHODS).await;

            return Ok(Some(outcome));
        };

        debug!("{} Use authentication method: {:?}", self.id(), method);
        self.stream.write_all(&[SOCKS_VER_5, method as u8]).await?;
        self.method = Some(method);

        if method == AuthMethod::UsernamePassword {
            self.transition(SessionState::AwaitingAuth);
        } else {
            self.transition(SessionState::AwaitingRequest);
        }

        Ok(None)
    }

    /// Username/password sub-negotiation, RFC 1929. `Some` ends the session.
    async fn sub_negotiate(&mut self) -> Result<Option<Outcome>, SessionError> {
        let frame = socks5::read_auth_frame(&mut self.stream).await?;

        let auth_version = frame[0];
        if auth_version != SOCKS_AUTH_VER {
            debug!(
                "{} Client uses a different authentication method version: {}.",
                self.id(),
                auth_version
            );
            let outcome = self.reject(&[SOCKS_AUTH_VER, 0], SOCKS_AUTH_FAILED).await;

            return Ok(Some(outcome));
        }

        let request = AuthRequest::parse(frame)?;
        let verdict = match self.config.authenticator.clone() {
            Some(authenticator) => {
                let connection = self.connection.clone();
                Verdict::of(authenticator.authenticate(request.username.clone(), request.password, connection)).await
            }
            None => Verdict::Denied(String::from("no authenticator configured")),
        };

        match verdict {
            Verdict::Allowed => {
                self.stream.write_all(&[SOCKS_AUTH_VER, SOCKS_AUTH_SUCCESS]).await?;
                self.transition(SessionState::AwaitingRequest);

                Ok(None)
            }
            Verdict::Denied(reason) => {
                info!("{} Authentication of '{}' failed: {}.", self.id(), request.username, reason);
                let outcome = self.reject(&[SOCKS_AUTH_VER, 0], SOCKS_AUTH_FAILED).await;

                Ok(Some(outcome))
            }
        }
    }

    async fn request(&mut self) -> Result<Outcome, SessionError> {
        let raw = socks5::read_request_frame(&mut self.stream).await?;

        if raw[0] != SOCKS_VER_5 {
            debug!("{} Request uses a different SOCKS version: {}.", self.id(), raw[0]);
            return Ok(self.reject(&raw, Socks5Reply::GeneralFailure as u8).await);
        }

        let request = match ConnectRequest::parse(raw.clone()) {
            Ok(request) => request,
            Err(RequestError::UnsupportedAddressType(address_type)) => {
                debug!("{} Unsupported address type: {}.", self.id(), address_type);
                return Ok(self.reject(&raw, Socks5Reply::AddressTypeNotSupported as u8).await);
            }
            Err(RequestError::Truncated(e)) => return Err(e.into()),
        };

        if !request.is_connect() {
            // BIND and UDP ASSOCIATE get a SUCCEEDED reply, and nothing else.
            info!(
                "{} {:?} to {} acknowledged, but not carried out.",
                self.id(),
                Socks5Command::from_u8(request.command),
                request.destination
            );
            socks5::terminate(&mut self.stream, &request.raw, SOCKS_REP_SUCCEEDED).await;

            return Ok(Outcome::Acknowledged(request.command));
        }

        self.connect(request).await
    }

    async fn connect(
        &mut self,
        request: ConnectRequest,
    ) -> Result<Outcome, SessionError> {
        let _registration = self.registry.register(ActiveSession {
            id: self.id(),
            peer_addr: self.connection.peer_addr,
            destination: request.destination.clone(),
        });

        let Destination { address, port } = request.destination.clone();

        if let Some(filter) = self.config.filter.clone() {
            let verdict = Verdict::of(filter.filter(port, address.clone(), self.connection.clone())).await;

            if let Verdict::Denied(reason) = verdict {
                info!("{} Connection to {} not allowed: {}.", self.id(), request.destination, reason);
                return Ok(self.reject(&request.raw, Socks5Reply::ConnectionNotAllowed as u8).await);
            }
        }

        let connector = self.config.connector();
        let connected = AssertUnwindSafe(connector.connect(port, address.clone(), self.connection.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "connector panicked")));

        let mut destination = match connected {
            Ok(destination) => destination,
            Err(error) => {
                let recognized = socks5::recognize_connect_error(&error);
                let reply = recognized.unwrap_or(Socks5Reply::NetworkUnreachable);
                let outcome = self.reject(&request.raw, reply as u8).await;

                if recognized.is_none() {
                    return Err(SessionError::Upstream {
                        host: address,
                        port,
                        source: error,
                    });
                }

                debug!("{} Unable to connect to {}: {}.", self.id(), request.destination, error);
                return Ok(outcome);
            }
        };

        // Notify source that the connection has been set up.
        let reply = socks5::reply_frame(&request.raw, SOCKS_REP_SUCCEEDED);
        self.stream.write_all(&reply).await?;
        self.stream.flush().await?;

        self.transition(SessionState::Relaying);

        // Start bidirectional copy, after this the connection closes.
        let (sent, received) = tokio::io::copy_bidirectional(&mut self.stream, &mut destination).await?;
        debug!(
            "{} Relayed {} byte(s) to and {} byte(s) from {}.",
            self.id(),
            sent,
            received,
            request.destination
        );

        Ok(Outcome::Relayed)
    }

    async fn reject(
        &mut self,
        frame: &[u8],
        status: u8,
    ) -> Outcome {
        // When the reply can't be delivered, the stream is dropped on return.
        socks5::terminate(&mut self.stream, frame, status).await;

        Outcome::Rejected(status)
    }

    fn transition(
        &mut self,
        next: SessionState,
    ) {
        debug_assert!(next >= self.state, "{:?} can't follow {:?}", next, self.state);

        trace!("{} {:?} -> {:?}", self.id(), self.state, next);
        self.state = next;
    }
}
