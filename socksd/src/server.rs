use crate::registry::SessionRegistry;
use crate::socks5::Socks5Session;
use crate::Socks5Config;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Accepts connections and runs a SOCKS5 session for each of them.
#[derive(Clone, Debug)]
pub struct Socks5Server {
    config: Arc<Socks5Config>,
    registry: SessionRegistry,
    semaphore: Option<Arc<Semaphore>>,
}

impl Socks5Server {
    ///
    ///
    ///
    pub fn new(config: Socks5Config) -> Self {
        let semaphore = config.connection_limit.map(|limit| Arc::new(Semaphore::new(limit)));

        Socks5Server {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            semaphore,
        }
    }

    /// Sessions currently past their request stage.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Binds to `addr` and serves until accepting fails.
    pub async fn listen<A: ToSocketAddrs>(
        self,
        addr: A,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}.", listener.local_addr()?);

        self.serve(listener).await
    }

    /// Serves an already bound listener until accepting fails.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<()> {
        loop {
            let (incoming, peer_addr) = listener.accept().await?;

            let config = Arc::clone(&self.config);
            let registry = self.registry.clone();
            let semaphore = self.semaphore.clone();

            tokio::spawn(process(incoming, peer_addr, config, registry, semaphore));
        }
    }
}

///
///
///
async fn process(
    incoming: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<Socks5Config>,
    registry: SessionRegistry,
    semaphore: Option<Arc<Semaphore>>,
) {
    let _permit = match semaphore {
        Some(semaphore) => match semaphore.try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Connections limit reached, dropping connection from {}.", peer_addr);
                return;
            }
        },
        None => None,
    };

    let start_time = Instant::now();
    let session = Socks5Session::new(incoming, Some(peer_addr), config, registry);
    let id = session.id();

    debug!("{} Accepted connection from {}.", id, peer_addr);
    let result = session.run().await;
    let elapsed = Instant::now().saturating_duration_since(start_time).as_millis();

    match result {
        Ok(outcome) => debug!("{} {:?} after {}ms.", id, outcome, elapsed),
        Err(e) if e.is_operational() => error!("{} {}", id, e),
        Err(e) => debug!("{} {} after {}ms.", id, e, elapsed),
    }
}
