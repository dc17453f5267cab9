//! Calling side of the RPC protocol.
//!
//! Every call opens a fresh TCP connection, writes one frame, half-closes
//! the connection and reads the response until the provider closes it.
//! A provider that drops a request closes nothing, so a call against an
//! unknown service or method ends either with `EmptyResponse` (the provider
//! hung up) or with `Timeout`.

use crate::config::ChannelDefaults;
use crate::protocol::encode_frame;
use crate::{Result, RpcError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Stub channel to one provider address.
#[derive(Debug, Clone)]
pub struct RpcChannel {
    addr: SocketAddr,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RpcChannel {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: ChannelDefaults::CONNECT_TIMEOUT,
            response_timeout: ChannelDefaults::RESPONSE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Call `service.method` with `request` and decode the response.
    pub async fn call<Req, Resp>(&self, service: &str, method: &str, request: &Req) -> Result<Resp>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let bytes = self
            .call_raw(service, method, &request.encode_to_vec())
            .await?;
        if bytes.is_empty() {
            return Err(RpcError::EmptyResponse {
                service: service.to_string(),
                method: method.to_string(),
            });
        }
        Resp::decode(&bytes[..]).map_err(RpcError::ResponseParse)
    }

    /// Send pre-encoded argument bytes and return whatever the provider
    /// wrote before closing the connection.
    pub async fn call_raw(&self, service: &str, method: &str, args: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_frame(service, method, args)?;

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| RpcError::Timeout(self.connect_timeout))?
            .map_err(|e| RpcError::io_with_context(e, format!("connect {}", self.addr)))?;

        debug!("calling {}.{} on {} ({} bytes)", service, method, self.addr, frame.len());

        let exchange = async {
            stream.write_all(&frame).await?;
            stream.shutdown().await?;

            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        };

        tokio::time::timeout(self.response_timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout(self.response_timeout))?
            .map_err(RpcError::from)
    }
}
