#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate human_panic;
#[macro_use]
extern crate log;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use log::LevelFilter;
use socksd::{Credentials, ListenAddress, PortFilter, Socks5Config, Socks5Server};
use std::convert::TryFrom;

#[derive(Parser)]
#[clap(name = "socksd", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Prints debug information verbosely
    #[clap(short, long)]
    debug: bool,

    /// Host (IP) for the SOCKS server
    #[clap(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for the SOCKS server
    #[clap(short, long, env = "PORT", default_value = "1080")]
    port: u16,

    /// Listen address as socks5://[user:pass@]host:port, overrides host and port
    #[clap(short, long, env = "LISTEN")]
    listen: Option<String>,

    /// Require username/password authentication, given as user:pass
    #[clap(short, long, env = "CREDENTIALS")]
    credentials: Option<String>,

    /// Destination port clients may not connect to (repeatable)
    #[clap(long = "deny-port", multiple_occurrences = true)]
    deny_ports: Vec<u16>,

    /// Concurrent connections limit (0=unlimited)
    #[clap(long = "connections-limit", env = "CONN_LIMIT", default_value = "0")]
    connections_limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut logger = env_logger::builder();
    logger.format_module_path(false);

    if args.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();
        setup_panic!();
    }

    let listen = match &args.listen {
        Some(listen) => ListenAddress::try_from(listen.clone())?,
        None => ListenAddress::new(args.host.clone(), args.port, None),
    };

    let credentials = match &args.credentials {
        Some(credentials) => match credentials.split_once(':') {
            Some((username, password)) => Some(Credentials::new(username, password)),
            None => bail!("Credentials don't separate username and password by ':'."),
        },
        None => listen.credentials.clone(),
    };

    let mut config = Socks5Config::new().with_connection_limit(args.connections_limit);
    if let Some(credentials) = credentials {
        config = config.with_authenticator(credentials);
    }
    if !args.deny_ports.is_empty() {
        config = config.with_filter(PortFilter::new(args.deny_ports.clone()));
    }

    info!("Starting {} ({:?}).", listen, config);
    Socks5Server::new(config).listen((listen.host.as_str(), listen.port)).await
}
