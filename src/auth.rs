use crate::codec::{encode_handshake_reply, read_auth_methods, read_byte_expecting};
use crate::error::{Error, Field, Result, Violation};
use crate::protocol::{AuthMethod, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// negotiate_auth handles authentication negotiation between the SOCKS server and client.
///
/// A bad version ends the connection without any reply. A method set lacking
/// NO AUTH gets `[0x05, 0xFF]` before failing.
pub async fn negotiate_auth<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    read_byte_expecting(stream, Field::Version, &[Version::SOCKS5 as u8]).await?;

    let methods = read_auth_methods(stream).await?;
    debug!("client offered {} auth methods", methods.len());

    // Retrieve desired method
    let method = select_auth_method(&methods);

    // Write response to client with selected method
    let write = stream.write_all(&encode_handshake_reply(method as u8)).await;

    match (method, write) {
        (AuthMethod::NoAuth, Ok(())) => Ok(()),
        (AuthMethod::NoAuth, Err(e)) => Err(e.into()),
        (AuthMethod::NoAcceptable, Ok(())) => Err(Violation::NoAcceptableAuthMethod.into()),
        (AuthMethod::NoAcceptable, Err(e)) => {
            Err(Error::from(Violation::NoAcceptableAuthMethod).with_reply_failure(e))
        }
    }
}

/// select_auth_method takes the auth methods offered by the socks client
/// and returns the method the server will use
fn select_auth_method(client_methods: &[u8]) -> AuthMethod {
    // Preferred auth method order
    const PREFERRED_METHODS: &[AuthMethod] = &[AuthMethod::NoAuth];

    // Iterate through preferences in order. If there's a match
    // return it
    for &preferred in PREFERRED_METHODS {
        if client_methods.contains(&(preferred as u8)) {
            return preferred;
        }
    }

    AuthMethod::NoAcceptable
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[test]
    fn selects_no_auth_anywhere_in_set() {
        assert_eq!(select_auth_method(&[0x00]), AuthMethod::NoAuth);
        assert_eq!(select_auth_method(&[0x02, 0x01, 0x00]), AuthMethod::NoAuth);
        assert_eq!(select_auth_method(&[0x01, 0x02]), AuthMethod::NoAcceptable);
        assert_eq!(select_auth_method(&[]), AuthMethod::NoAcceptable);
    }

    #[tokio::test]
    async fn accepts_no_auth() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x02, 0x02, 0x00]).await.unwrap();

        negotiate_auth(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn rejects_without_no_auth() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x01, 0x01]).await.unwrap();

        let err = negotiate_auth(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation(Violation::NoAcceptableAuthMethod)
        ));

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);
    }

    #[tokio::test]
    async fn bad_version_gets_no_reply() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let err = negotiate_auth(&mut server).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolViolation(Violation::UnexpectedByte {
                field: Field::Version,
                value: 0x04
            })
        ));

        drop(server);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn reply_write_failure_is_joined() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
        // Peer gone before the rejection is written
        drop(client);

        let err = negotiate_auth(&mut server).await.unwrap_err();
        match err {
            Error::ReplyWrite { cause, .. } => assert!(matches!(
                *cause,
                Error::ProtocolViolation(Violation::NoAcceptableAuthMethod)
            )),
            other => panic!("unexpected error: {other}"),
        }
    }
}
