use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Bytes moved in each direction by [`copy_bidirectional_joined`].
///
/// A direction that ended in an error reports the bytes it had moved before
/// the failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyTotals {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// Relay bytes between `a` and `b` until both directions have finished.
///
/// Each direction runs until its reader reaches end-of-stream or fails, then
/// shuts down the opposite writer so the peer sees the half-close. The call
/// joins both directions: one side finishing early does not cut the other
/// short. Errors are logged and never change that join.
pub async fn copy_bidirectional_joined<A, B>(a: A, b: B) -> CopyTotals
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    let (a_to_b, b_to_a) = tokio::join!(
        relay(&mut a_read, &mut b_write, "a->b"),
        relay(&mut b_read, &mut a_write, "b->a"),
    );
    CopyTotals { a_to_b, b_to_a }
}

async fn relay<R, W>(reader: &mut R, writer: &mut W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 16 * 1024];
    let mut total = 0u64;
    loop {
        let read = match tokio::io::AsyncReadExt::read(reader, &mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                log_relay_error(&err, direction);
                break;
            }
        };
        if let Err(err) = writer.write_all(&buf[..read]).await {
            log_relay_error(&err, direction);
            break;
        }
        total += read as u64;
    }
    if let Err(err) = writer.shutdown().await {
        debug!(?err, direction, "shutdown after relay failed");
    }
    total
}

fn log_relay_error(err: &io::Error, direction: &'static str) {
    match err.kind() {
        // Common half-close races; the peer is simply gone.
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            debug!(?err, direction, "relay peer disconnected")
        }
        _ => warn!(?err, direction, "relay direction failed"),
    }
}
