use crate::error::{Error, Result};
use crate::protocol::AddressType;
use std::fmt;
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Address represents a network address or domain to be used as the
/// SOCKS5 target address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4([u8; 4]),
    /// Raw domain bytes as sent by the client, 0 to 255 of them
    DomainName(Vec<u8>),
}

/// TargetAddress represents a forward proxy address and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    pub address: Address,
    pub port: u16,
}

/// TargetAddress implementation block
impl TargetAddress {
    /// dial_target renders the address as a "host:port" string for the
    /// system dialer. Domain names are not resolved here
    pub fn dial_target(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Address::IPv4(octets) => write!(f, "{}:{}", Ipv4Addr::from(*octets), self.port),
            Address::DomainName(domain) => {
                write!(f, "{}:{}", String::from_utf8_lossy(domain), self.port)
            }
        }
    }
}

/// read_address reads DST.ADDR and DST.PORT for an already validated
/// address type
pub async fn read_address<R>(source: &mut R, addr_type: AddressType) -> Result<TargetAddress>
where
    R: AsyncRead + Unpin,
{
    let address = match addr_type {
        AddressType::IPv4 => {
            let mut addr = [0u8; 4];
            source
                .read_exact(&mut addr)
                .await
                .map_err(Error::truncated("IPv4 address"))?;
            Address::IPv4(addr)
        }
        AddressType::DomainName => {
            // First octet in DomainName contains the number of
            // octets to follow
            let len = source
                .read_u8()
                .await
                .map_err(Error::truncated("domain length"))?;

            let mut domain = vec![0u8; len as usize];
            source
                .read_exact(&mut domain)
                .await
                .map_err(Error::truncated("domain name"))?;
            Address::DomainName(domain)
        }
    };

    // Port -> BigEndian (network order)
    let port = source
        .read_u16()
        .await
        .map_err(Error::truncated("port"))?;

    Ok(TargetAddress { address, port })
}
