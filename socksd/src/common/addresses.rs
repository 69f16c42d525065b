use crate::common::cursor::{ByteCursor, CursorError, Endian};
use crate::{constants::*, Credentials};
use anyhow::Result;
use itertools::Itertools;
use std::convert::TryFrom;
use std::fmt;
use std::net::IpAddr;
use url::Url;

#[repr(u8)]
#[derive(Clone, Copy, Debug, FromPrimitive, PartialEq)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domainname = 0x03,
    Ipv6 = 0x04,
}

/// Destination as requested by a client, in the textual form handed to the
/// filter and connect hooks.
#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub address: String,
    pub port: u16,
}

impl Destination {
    pub fn new<S: Into<String>>(
        address: S,
        port: u16,
    ) -> Self {
        Destination {
            address: address.into(),
            port,
        }
    }

    /// ATYP, DST.ADDR, DST.PORT as a client would send them. Fails for a
    /// domain name that doesn't fit its one-byte length prefix.
    pub fn as_socks_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![];

        match self.address.parse::<IpAddr>() {
            Ok(IpAddr::V4(host)) => {
                bytes.push(SOCKS_ATYP_IPV4);
                bytes.extend(host.octets().iter());
            }
            Ok(IpAddr::V6(host)) => {
                bytes.push(SOCKS_ATYP_IPV6);
                bytes.extend(host.octets().iter());
            }
            Err(_) => {
                let host = self.address.as_bytes();
                ensure!(host.len() <= 255, "Domain name MUST NOT be larger than 255 bytes.");

                bytes.push(SOCKS_ATYP_DOMAINNAME);
                bytes.push(host.len() as u8);
                bytes.extend(host);
            }
        }

        bytes.extend(self.port.to_be_bytes().iter());
        Ok(bytes)
    }
}

impl fmt::Display for Destination {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Decodes DST.ADDR for the given address type.
///
/// IPv6 addresses are rendered as eight unpadded hex groups without `::`
/// compression, e.g. `2001:db8:0:0:0:0:0:1`. Filters may match on this exact
/// form, so it must not be normalized.
pub fn decode_address(
    address_type: AddressType,
    cursor: &mut ByteCursor,
) -> Result<String, CursorError> {
    let address = match address_type {
        AddressType::Ipv4 => cursor.read_bytes(4)?.iter().join("."),
        AddressType::Domainname => {
            cursor.read_u8()?;
            let host = cursor.read_prefixed()?;

            String::from_utf8_lossy(&host[..]).to_string()
        }
        AddressType::Ipv6 => {
            let mut groups = Vec::with_capacity(8);
            for _ in 0..4 {
                let word = cursor.read_u32(Endian::Big)?;
                groups.push(format!("{:x}", word >> 16));
                groups.push(format!("{:x}", word & 0xFFFF));
            }

            groups.join(":")
        }
    };

    Ok(address)
}

/// Where the server listens, given as `socks5://[user:pass@]host:port`.
#[derive(Clone, Debug)]
pub struct ListenAddress {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

impl ListenAddress {
    pub fn new(
        host: String,
        port: u16,
        credentials: Option<Credentials>,
    ) -> Self {
        Self { host, port, credentials }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "socks5://{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = anyhow::Error;

    fn try_from(listen_addr: String) -> Result<Self> {
        let listen_addr = Url::parse(&listen_addr)?;

        ensure!(
            listen_addr.scheme() == "socks5",
            "Unrecognized scheme: {}",
            listen_addr.scheme()
        );

        let host = match listen_addr.host_str() {
            Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
            None => bail!("Missing explicit IP/host in listen address."),
        };
        let port = match listen_addr.port() {
            Some(port) => port,
            None => bail!("Missing explicit port in listen address."),
        };

        let username = listen_addr.username();
        let credentials = if username.is_empty() {
            None
        } else {
            let password = listen_addr.password().unwrap_or_default();
            Some(Credentials::new(username, password))
        };

        Ok(Self::new(host, port, credentials))
    }
}
