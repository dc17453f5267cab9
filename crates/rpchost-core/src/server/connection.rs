//! Serving a single connection.
//!
//! One connection carries one request. The handler performs a single read,
//! dispatches whatever arrived, writes the reply if there is one and shuts
//! the connection down. Requests that fail before their method runs get no
//! reply and no close: the connection stays open until the peer hangs up or
//! the idle timeout expires.

use crate::dispatch::{DispatchFailure, Dispatcher};
use crate::{Result, RpcError};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// Per-connection tuning shared by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub read_buffer_size: usize,
    pub idle_timeout: Duration,
}

/// How a connection ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The result was written and the connection closed.
    Responded { bytes: usize },
    /// The method ran but produced nothing to send; closed with no payload.
    ClosedWithoutReply(RpcError),
    /// The request failed before invocation; nothing was written.
    Dropped(DispatchFailure),
    /// The peer closed before sending anything.
    PeerClosed,
}

impl ConnectionOutcome {
    /// Number of payload bytes written to the peer.
    pub fn bytes_written(&self) -> usize {
        match self {
            ConnectionOutcome::Responded { bytes } => *bytes,
            _ => 0,
        }
    }
}

/// Serve one request on `stream`.
///
/// Errors are transport failures (read, write or shutdown); request-level
/// failures are reported through the outcome.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    dispatcher: &Dispatcher,
    settings: &ConnectionSettings,
) -> Result<ConnectionOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(settings.read_buffer_size);
    let n = stream.read_buf(&mut buf).await?;
    if n == 0 {
        return Ok(ConnectionOutcome::PeerClosed);
    }

    let call = match dispatcher.prepare(peer, &buf) {
        Ok(call) => call,
        Err(failure) => {
            linger(&mut stream, peer, settings.idle_timeout).await;
            return Ok(ConnectionOutcome::Dropped(failure));
        }
    };

    let outcome = match call.invoke().wait().await {
        Ok(bytes) => {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
            ConnectionOutcome::Responded { bytes: bytes.len() }
        }
        Err(e) => {
            // Serialization failures were already logged by the completion.
            if let RpcError::CompletionDropped { .. } = e {
                error!("closing {} without a reply: {}", peer, e);
            }
            ConnectionOutcome::ClosedWithoutReply(e)
        }
    };

    stream.shutdown().await?;
    Ok(outcome)
}

/// Keep a connection open until the peer closes it or `idle_timeout`
/// passes, discarding anything it sends.
async fn linger<S>(stream: &mut S, peer: SocketAddr, idle_timeout: Duration)
where
    S: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 1024];
    let drained = tokio::time::timeout(idle_timeout, async {
        loop {
            match stream.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;

    if drained.is_err() {
        debug!("{} idle for {:?}, closing", peer, idle_timeout);
    }
}
