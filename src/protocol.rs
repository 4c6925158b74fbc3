// RSV: Fields marked RESERVED (RSV) must be set to X'00'.
pub const RSV: u8 = 0x00;

/// Version represents available SOCKS proxy versions.
/// Only SOCKS5 is spoken here
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    SOCKS5 = 0x05,
}

/// AuthMethod represents the SOCKS5 authentication methods the
/// server can select
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth = 0x00,
    // 0x01 GSSAPI and 0x02 username/password are never selected
    // 0x03 - 0x7f: IANA reserved
    // 0x80 - 0xFE: private methods
    NoAcceptable = 0xFF,
}

/// Command represents SOCKS5 protocol commands.
/// CONNECT is the only one served
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
}

/// Command implementation block
impl Command {
    /// from_byte converts a byte to its related SOCKS5 protocol command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            _ => None,
        }
    }
}

/// AddressType represents the SOCKS5 address types accepted in a
/// request: IPv4 and Domain Name
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
}

/// AddressType implementation block
impl AddressType {
    /// from_byte converts a byte to its related network address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::DomainName),
            _ => None,
        }
    }
}

/// ReplyCode is the REP field of a request reply
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    NetworkUnreachable = 0x03,
    ConnectionRefused = 0x05,
    CommandNotSupported = 0x07,
    AddrTypeUnsupported = 0x08,
    // 0x01, 0x02, 0x04, 0x06: defined by RFC 1928, never sent
    // 0x09 - 0xFF: unassigned
}
