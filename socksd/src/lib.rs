#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;
#[macro_use]
extern crate num_derive;

mod common {
    pub mod addresses;
    pub mod constants;
    pub mod cursor;
    pub mod interface;
    pub mod util;
}

mod config;
mod credentials;
mod error;
pub mod registry;
pub mod server;
pub mod socks5;

pub use common::addresses::{self, AddressType, Destination, ListenAddress};
pub use common::constants;
pub use common::cursor::{self, ByteCursor, CursorError, Endian};
pub use common::interface::{Authenticator, ConnectionFilter, ConnectionInfo, Connector, Verdict};
pub use common::util::{self, connect_socket, resolve_addr, DirectConnector};
pub use config::{PortFilter, Socks5Config};
pub use credentials::Credentials;
pub use error::SessionError;
pub use registry::{SessionId, SessionRegistry};
pub use server::Socks5Server;
pub use socks5::{Outcome, Socks5Reply, Socks5Session};
