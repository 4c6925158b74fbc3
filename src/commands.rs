use crate::address::{TargetAddress, read_address};
use crate::codec::{encode_failure_reply, encode_reply, read_byte_expecting};
use crate::dial::Dialer;
use crate::error::{Error, Field, Result, Violation};
use crate::protocol::{AddressType, Command, ReplyCode, Version};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// handle_socks_request parses the client's request, dials the target and
/// writes the request reply. On success the dialed destination stream is
/// returned, ready for relaying
pub async fn handle_socks_request<S, D>(stream: &mut S, dialer: &D) -> Result<D::Stream>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Dialer,
{
    let target = parse_request(stream).await?;
    debug!("request target {}", target);

    handle_connect_cmd(stream, dialer, &target).await
}

/// parse_request reads the request header and target address. Header
/// violations are answered with a failure reply before returning
async fn parse_request<S>(stream: &mut S) -> Result<TargetAddress>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+

    // Ensure version is 0x05 -> SOCKS5
    let version = read_byte_expecting(stream, Field::Version, &[Version::SOCKS5 as u8]).await;
    reply_on_violation(stream, version, ReplyCode::ConnectionRefused).await?;

    // Ensure we are getting a CONNECT request
    let command = read_byte_expecting(stream, Field::Command, &[Command::Connect as u8]).await;
    reply_on_violation(stream, command, ReplyCode::CommandNotSupported).await?;

    // Not validating RSV (RESERVED) -> 0x00
    stream
        .read_u8()
        .await
        .map_err(Error::truncated("reserved"))?;

    let atyp = read_byte_expecting(
        stream,
        Field::AddressType,
        &[AddressType::IPv4 as u8, AddressType::DomainName as u8],
    )
    .await;
    let atyp = reply_on_violation(stream, atyp, ReplyCode::AddrTypeUnsupported).await?;

    let addr_type = AddressType::from_byte(atyp).ok_or(Violation::UnexpectedByte {
        field: Field::AddressType,
        value: atyp,
    })?;

    read_address(stream, addr_type).await
}

/// handle_connect_cmd dials the target and reports the outcome to the client
async fn handle_connect_cmd<S, D>(
    stream: &mut S,
    dialer: &D,
    target: &TargetAddress,
) -> Result<D::Stream>
where
    S: AsyncWrite + Unpin,
    D: Dialer,
{
    let dial_target = target.dial_target();

    // Connect to target
    let outbound = match dialer.dial(&dial_target).await {
        Ok(outbound) => outbound,
        Err(e) => {
            debug!("dial {} failed: {}", dial_target, e);
            let cause = Error::Dial {
                target: dial_target,
                source: e,
            };
            return Err(send_failure(stream, ReplyCode::NetworkUnreachable, cause).await);
        }
    };

    // Only IPv4 bound addresses fit the reply; `outbound` is dropped on error
    let bound = match dialer.local_addr(&outbound)? {
        SocketAddr::V4(addr) => addr,
        other => return Err(Error::UnsupportedBoundAddress(other)),
    };

    // Send OK reply
    stream
        .write_all(&encode_reply(ReplyCode::Succeeded, bound))
        .await?;
    debug!("connected to {} via {}", dial_target, bound);

    Ok(outbound)
}

/// reply_on_violation passes successful reads through. Protocol violations
/// get a failure reply with `reply_code`; other read errors get none
async fn reply_on_violation<S>(stream: &mut S, read: Result<u8>, reply_code: ReplyCode) -> Result<u8>
where
    S: AsyncWrite + Unpin,
{
    match read {
        Ok(byte) => Ok(byte),
        Err(e @ Error::ProtocolViolation(_)) => Err(send_failure(stream, reply_code, e).await),
        Err(e) => Err(e),
    }
}

/// send_failure writes a zero-address failure reply and returns `cause`,
/// joined with the write error when the reply could not be sent
async fn send_failure<S>(stream: &mut S, reply_code: ReplyCode, cause: Error) -> Error
where
    S: AsyncWrite + Unpin,
{
    match stream.write_all(&encode_failure_reply(reply_code)).await {
        Ok(()) => cause,
        Err(e) => cause.with_reply_failure(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dial::testing::{PipeDialer, RefusingDialer};
    use tokio::io::duplex;

    async fn run_request<D: Dialer>(request: &[u8], dialer: &D) -> (Result<D::Stream>, Vec<u8>) {
        let (mut client, mut server) = duplex(256);
        client.write_all(request).await.unwrap();

        let result = handle_socks_request(&mut server, dialer).await;
        drop(server);

        let mut written = Vec::new();
        client.read_to_end(&mut written).await.unwrap();
        (result, written)
    }

    fn bound() -> SocketAddr {
        "10.0.0.7:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn connect_ipv4_replies_with_bound_address() {
        let (dialer, mut dialed) = PipeDialer::new(bound());
        let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

        let (result, written) = run_request(&request, &dialer).await;
        assert!(result.is_ok());
        assert_eq!(written, [0x05, 0x00, 0x00, 0x01, 10, 0, 0, 7, 0x9C, 0x40]);

        let (target, _) = dialed.recv().await.unwrap();
        assert_eq!(target, "127.0.0.1:80");
    }

    #[tokio::test]
    async fn connect_domain_dials_host_and_port() {
        let (dialer, mut dialed) = PipeDialer::new(bound());
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 11];
        request.extend_from_slice(b"example.com");
        request.extend_from_slice(&443u16.to_be_bytes());

        let (result, written) = run_request(&request, &dialer).await;
        assert!(result.is_ok());
        assert_eq!(written[1], ReplyCode::Succeeded as u8);

        let (target, _) = dialed.recv().await.unwrap();
        assert_eq!(target, "example.com:443");
    }

    #[tokio::test]
    async fn bad_version_is_refused() {
        let dialer = RefusingDialer::default();
        let request = [0x04, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

        let (result, written) = run_request(&request, &dialer).await;
        assert!(matches!(
            result,
            Err(Error::ProtocolViolation(Violation::UnexpectedByte {
                field: Field::Version,
                value: 0x04
            }))
        ));
        assert_eq!(written, encode_failure_reply(ReplyCode::ConnectionRefused));
        assert!(dialer.targets.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_connect_commands_are_unsupported() {
        for command in [0x00, 0x02, 0x03, 0xFF] {
            let dialer = RefusingDialer::default();
            let request = [0x05, command, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

            let (result, written) = run_request(&request, &dialer).await;
            assert!(matches!(
                result,
                Err(Error::ProtocolViolation(Violation::UnexpectedByte {
                    field: Field::Command,
                    ..
                }))
            ));
            assert_eq!(written, encode_failure_reply(ReplyCode::CommandNotSupported));
        }
    }

    #[tokio::test]
    async fn unknown_address_types_are_unsupported() {
        for atyp in [0x00, 0x02, 0x04, 0x05] {
            let dialer = RefusingDialer::default();
            let request = [0x05, 0x01, 0x00, atyp, 127, 0, 0, 1, 0x00, 0x50];

            let (result, written) = run_request(&request, &dialer).await;
            assert!(matches!(
                result,
                Err(Error::ProtocolViolation(Violation::UnexpectedByte {
                    field: Field::AddressType,
                    ..
                }))
            ));
            assert_eq!(written, encode_failure_reply(ReplyCode::AddrTypeUnsupported));
        }
    }

    #[tokio::test]
    async fn dial_failure_is_network_unreachable() {
        let dialer = RefusingDialer::default();
        let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

        let (result, written) = run_request(&request, &dialer).await;
        match result {
            Err(Error::Dial { target, .. }) => assert_eq!(target, "127.0.0.1:80"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("dial should fail"),
        }
        assert_eq!(written, encode_failure_reply(ReplyCode::NetworkUnreachable));
    }

    /// run_request_to_departed_client sends `request` and drops the client
    /// before the server gets to reply
    async fn run_request_to_departed_client<D: Dialer>(request: &[u8], dialer: &D) -> Error {
        let (mut client, mut server) = duplex(256);
        client.write_all(request).await.unwrap();
        drop(client);

        match handle_socks_request(&mut server, dialer).await {
            Err(e) => e,
            Ok(_) => panic!("request should fail"),
        }
    }

    #[tokio::test]
    async fn failure_reply_write_error_is_joined_with_violation() {
        let dialer = RefusingDialer::default();
        let err = run_request_to_departed_client(&[0x05, 0x02], &dialer).await;

        match err {
            Error::ReplyWrite { cause, source } => {
                assert!(matches!(
                    *cause,
                    Error::ProtocolViolation(Violation::UnexpectedByte {
                        field: Field::Command,
                        value: 0x02
                    })
                ));
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failure_reply_write_error_is_joined_with_dial_error() {
        let dialer = RefusingDialer::default();
        let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
        let err = run_request_to_departed_client(&request, &dialer).await;

        match err {
            Error::ReplyWrite { cause, .. } => match *cause {
                Error::Dial { target, .. } => assert_eq!(target, "127.0.0.1:80"),
                other => panic!("unexpected cause: {other}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn truncated_address_gets_no_reply() {
        let dialer = RefusingDialer::default();
        let request = [0x05, 0x01, 0x00, 0x03, 20, b'a', b'b'];

        let (result, written) = run_request(&request, &dialer).await;
        assert!(matches!(
            result,
            Err(Error::TruncatedInput {
                what: "domain name",
                ..
            })
        ));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn ipv6_bound_address_is_fatal_without_reply() {
        let (dialer, _dialed) = PipeDialer::new("[::1]:9000".parse().unwrap());
        let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];

        let (result, written) = run_request(&request, &dialer).await;
        assert!(matches!(result, Err(Error::UnsupportedBoundAddress(_))));
        assert!(written.is_empty());
    }
}
