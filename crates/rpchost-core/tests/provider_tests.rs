//! End-to-end tests for a provider listening on a real TCP socket.

use rpchost_core::protocol::{encode_frame, encode_header, RpcHeader};
use rpchost_core::{
    Done, MethodDescriptor, ProviderConfig, ProviderHandle, RpcChannel, RpcError, RpcProvider,
    Service, ServiceRegistry, TaskPool,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Clone, PartialEq, prost::Message)]
struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
struct PingResponse {
    #[prost(bool, tag = "1")]
    pong: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
struct EchoRequest {
    #[prost(string, tag = "1")]
    text: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct EchoResponse {
    #[prost(string, tag = "1")]
    text: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct SumRequest {
    #[prost(int64, repeated, tag = "1")]
    values: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct SumResponse {
    #[prost(int64, tag = "1")]
    total: i64,
}

struct EchoService;

impl Service for EchoService {
    fn name(&self) -> &str {
        "Echo"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
        vec![
            MethodDescriptor::new("Ping", |_: Empty, mut resp: PingResponse, done| {
                resp.pong = true;
                done.complete(resp);
            }),
            MethodDescriptor::new("Echo", |req: EchoRequest, mut resp: EchoResponse, done| {
                resp.text = req.text;
                done.complete(resp);
            }),
        ]
    }
}

/// Runs its work on a task pool and completes from there.
struct MathService {
    pool: TaskPool,
}

impl Service for MathService {
    fn name(&self) -> &str {
        "Math"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
        let this = self.clone();
        vec![MethodDescriptor::new(
            "Sum",
            move |req: SumRequest, mut resp: SumResponse, done: Done<SumResponse>| {
                let queued = this.pool.execute(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    resp.total = req.values.iter().sum();
                    done.complete(resp);
                });
                if let Err(e) = queued {
                    tracing::error!("Sum rejected: {}", e);
                }
            },
        )]
    }
}

fn registry() -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(EchoService)).unwrap();
    registry
        .register(Arc::new(MathService {
            pool: TaskPool::new("math", 2, 64).unwrap(),
        }))
        .unwrap();
    registry
}

async fn start() -> ProviderHandle {
    let config = ProviderConfig::new("127.0.0.1", 0)
        .with_worker_threads(3)
        .with_idle_timeout(Duration::from_secs(2));
    RpcProvider::new(config, registry()).start().await.unwrap()
}

#[tokio::test]
async fn test_ping_returns_pong_and_closes() {
    let handle = start().await;

    let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
    stream
        .write_all(&encode_frame("Echo", "Ping", &[]).unwrap())
        .await
        .unwrap();

    // The provider closes after answering; no half-close needed.
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, prost::Message::encode_to_vec(&PingResponse { pong: true }));
}

#[tokio::test]
async fn test_unknown_service_gets_no_bytes() {
    let handle = start().await;

    let bytes = RpcChannel::new(handle.addr())
        .call_raw("Unregistered", "Ping", &[])
        .await
        .unwrap();
    assert!(bytes.is_empty());

    let err = RpcChannel::new(handle.addr())
        .call::<Empty, PingResponse>("Unregistered", "Ping", &Empty {})
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::EmptyResponse { ref service, .. } if service == "Unregistered"));
}

#[tokio::test]
async fn test_truncated_arguments_get_no_bytes() {
    let handle = start().await;

    let header = encode_header(&RpcHeader::new("Echo", "Echo", 50));
    let mut frame = (header.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&[7u8; 10]);

    let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
    stream.write_all(&frame).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_garbage_header_gets_no_bytes() {
    let handle = start().await;

    let mut frame = 6u32.to_le_bytes().to_vec();
    frame.extend_from_slice(&[0x0f, 0xff, 0xff, 0x01, 0x9a, 0x33]);

    let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
    stream.write_all(&frame).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_silent_peer_released_after_idle_timeout() {
    let handle = start().await;

    let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
    stream
        .write_all(&encode_frame("Unregistered", "Ping", &[]).unwrap())
        .await
        .unwrap();

    // Keep the write side open; the provider gives up after idle_timeout.
    let mut response = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("provider should close an idle dropped connection");
    read.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_pool_backed_method() {
    let handle = start().await;

    let resp: SumResponse = RpcChannel::new(handle.addr())
        .call("Math", "Sum", &SumRequest { values: vec![1, 2, 3, 4] })
        .await
        .unwrap();
    assert_eq!(resp.total, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_see_full_registry() {
    let config = ProviderConfig::new("127.0.0.1", 0).with_worker_threads(4);
    let provider = RpcProvider::new(config, registry());
    let shared = provider.registry().clone();
    let handle = provider.start().await.unwrap();
    let channel = RpcChannel::new(handle.addr());

    let calls: Vec<_> = (0..64)
        .map(|i| {
            let channel = channel.clone();
            tokio::spawn(async move {
                match i % 3 {
                    0 => {
                        let resp: PingResponse =
                            channel.call("Echo", "Ping", &Empty {}).await.unwrap();
                        assert!(resp.pong);
                    }
                    1 => {
                        let text = format!("message {}", i);
                        let resp: EchoResponse = channel
                            .call("Echo", "Echo", &EchoRequest { text: text.clone() })
                            .await
                            .unwrap();
                        assert_eq!(resp.text, text);
                    }
                    _ => {
                        let resp: SumResponse = channel
                            .call("Math", "Sum", &SumRequest { values: vec![i, i] })
                            .await
                            .unwrap();
                        assert_eq!(resp.total, 2 * i);
                    }
                }
            })
        })
        .collect();

    for call in calls {
        call.await.unwrap();
    }

    assert_eq!(shared.service_names(), vec!["Echo", "Math"]);
    assert_eq!(shared.resolve("Echo").unwrap().method_names(), vec!["Echo", "Ping"]);
    assert_eq!(shared.resolve("Math").unwrap().method_names(), vec!["Sum"]);
}
