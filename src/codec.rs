//! Byte-level framing for SOCKS5 handshake and request/reply frames.
//!
//! Readers work on any [`AsyncRead`] source; encoders return owned frames
//! and never touch a socket.

use crate::error::{Error, Field, Result, Violation};
use crate::protocol::{AddressType, RSV, ReplyCode, Version};
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length of an encoded request reply with an IPv4 bound address
pub const REPLY_LEN: usize = 10;

/// read_byte_expecting reads a single byte and checks that it is one of
/// `allowed`
pub async fn read_byte_expecting<R>(source: &mut R, field: Field, allowed: &[u8]) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let value = source
        .read_u8()
        .await
        .map_err(Error::truncated(field.as_str()))?;

    if !allowed.contains(&value) {
        return Err(Violation::UnexpectedByte { field, value }.into());
    }

    Ok(value)
}

/// read_auth_methods reads the NMETHODS count followed by exactly that many
/// method bytes
pub async fn read_auth_methods<R>(source: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    // ClientHello format (after VER)
    // +----------+----------+
    // | NMETHODS | METHODS  |
    // +----------+----------+
    // |    1     | 1 to 255 |
    // +----------+----------+
    let n_methods = source
        .read_u8()
        .await
        .map_err(Error::truncated("auth method count"))?;

    let mut methods = vec![0u8; n_methods as usize];
    source
        .read_exact(&mut methods)
        .await
        .map_err(Error::truncated("auth methods"))?;

    Ok(methods)
}

/// encode_handshake_reply builds the ServerChoice method selection reply
pub fn encode_handshake_reply(method: u8) -> [u8; 2] {
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    [Version::SOCKS5 as u8, method]
}

/// encode_reply builds a request reply carrying an IPv4 bound address
pub fn encode_reply(reply_code: ReplyCode, bound: SocketAddrV4) -> [u8; REPLY_LEN] {
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   |    4     |    2     |
    // +----+-----+-------+------+----------+----------+
    let octets = bound.ip().octets();
    let port = bound.port().to_be_bytes();

    [
        Version::SOCKS5 as u8,
        reply_code as u8,
        RSV,
        AddressType::IPv4 as u8,
        octets[0],
        octets[1],
        octets[2],
        octets[3],
        port[0],
        port[1],
    ]
}

/// encode_failure_reply builds a reply with an all-zero bound address
pub fn encode_failure_reply(reply_code: ReplyCode) -> [u8; REPLY_LEN] {
    encode_reply(reply_code, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
}
