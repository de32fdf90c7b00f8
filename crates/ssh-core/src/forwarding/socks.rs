use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{copy::copy_bidirectional_joined, traits::ForwardSession};

type Result<T> = crate::SshResult<T>;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_HOST_UNREACHABLE: u8 = 0x04;
const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Outcome of the SOCKS5 handshake up to (not including) the CONNECT reply.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Negotiation {
    Connect { host: String, port: u16 },
    /// The client was refused; any required reply has already been written.
    Rejected,
}

/// Serve one SOCKS5 client on a dynamic forward.
///
/// Protocol failures and unreachable targets only end this connection.
pub(super) async fn handle_socks_client<T, S>(mut stream: T, origin: SocketAddr, session: S)
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    S: ForwardSession,
{
    if let Err(err) = serve_socks_client(&mut stream, origin, session).await {
        warn!(?err, origin = %origin, "socks client failed");
    }
    let _ = stream.shutdown().await;
}

async fn serve_socks_client<T, S>(stream: &mut T, origin: SocketAddr, session: S) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    S: ForwardSession,
{
    let (target_host, target_port) = match negotiate(stream).await? {
        Negotiation::Connect { host, port } => (host, port),
        Negotiation::Rejected => return Ok(()),
    };
    let remote = match session
        .open_direct_tcpip(target_host.clone(), target_port, origin.ip().to_string(), origin.port())
        .await
    {
        Ok(remote) => remote,
        Err(err) => {
            warn!(?err, target = %format!("{target_host}:{target_port}"), "failed to open socks target");
            send_socks_reply(stream, REPLY_HOST_UNREACHABLE).await?;
            return Ok(());
        }
    };
    send_socks_reply(stream, REPLY_SUCCEEDED).await?;
    let totals = copy_bidirectional_joined(stream, remote).await;
    debug!(
        origin = %origin,
        target = %format!("{target_host}:{target_port}"),
        sent = totals.a_to_b,
        received = totals.b_to_a,
        "socks connection finished"
    );
    Ok(())
}

/// Run greeting, method selection, and request parsing.
///
/// Only "no authentication" is ever selected; the offered methods are read
/// and ignored. Domain names are returned verbatim for the SSH server to resolve.
pub(super) async fn negotiate<T>(stream: &mut T) -> Result<Negotiation>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        debug!(version = header[0], "rejecting non-SOCKS5 client");
        return Ok(Negotiation::Rejected);
    }
    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;
    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[1] != CMD_CONNECT {
        debug!(command = request[1], "unsupported socks command");
        send_socks_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Ok(Negotiation::Rejected);
    }
    let host = match request[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).to_string()
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ipv6Addr::from(addr).to_string()
        }
        other => {
            debug!(address_type = other, "unsupported socks address type");
            send_socks_reply(stream, REPLY_ADDRESS_TYPE_NOT_SUPPORTED).await?;
            return Ok(Negotiation::Rejected);
        }
    };
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(Negotiation::Connect {
        host,
        port: u16::from_be_bytes(port_buf),
    })
}

/// Write a 10-byte reply; the bound address is always reported as `0.0.0.0:0`.
async fn send_socks_reply<W>(stream: &mut W, status: u8) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut response = [0u8; 10];
    response[0] = SOCKS_VERSION;
    response[1] = status;
    response[2] = 0x00;
    response[3] = ATYP_IPV4;
    stream.write_all(&response).await?;
    Ok(())
}

#[cfg(test)]
#[path = "socks_tests.rs"]
mod tests;
