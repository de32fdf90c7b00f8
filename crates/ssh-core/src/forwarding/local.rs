use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{copy::copy_bidirectional_joined, traits::ForwardSession};

/// Serve one connection accepted by a local forward.
///
/// A failed channel open only drops this connection; the tunnel keeps running.
pub(super) async fn handle_local_tcp_connection<T, S>(mut stream: T, origin: SocketAddr, target_host: &str, target_port: u16, session: S)
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    S: ForwardSession,
{
    let remote = match session
        .open_direct_tcpip(target_host.to_string(), target_port, origin.ip().to_string(), origin.port())
        .await
    {
        Ok(remote) => remote,
        Err(err) => {
            warn!(?err, origin = %origin, target = %format!("{target_host}:{target_port}"), "failed to open forward channel");
            let _ = stream.shutdown().await;
            return;
        }
    };
    let totals = copy_bidirectional_joined(stream, remote).await;
    debug!(
        origin = %origin,
        target = %format!("{target_host}:{target_port}"),
        sent = totals.a_to_b,
        received = totals.b_to_a,
        "local TCP forward connection finished"
    );
}
