//! Integration tests for the rpchost-provider binary.
//!
//! Each test writes a configuration file, starts the binary on a free port
//! and talks to it through `RpcChannel`.

use rpchost_core::{RpcChannel, RpcError};
use std::io::Write;
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};

#[derive(Clone, PartialEq, prost::Message)]
struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message)]
struct PingResponse {
    #[prost(bool, tag = "1")]
    pong: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
struct ResultCode {
    #[prost(int32, tag = "1")]
    errcode: i32,
    #[prost(string, tag = "2")]
    errmsg: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct LoginRequest {
    #[prost(string, tag = "1")]
    name: String,
    #[prost(string, tag = "2")]
    pwd: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct LoginResponse {
    #[prost(message, optional, tag = "1")]
    result: Option<ResultCode>,
    #[prost(bool, tag = "2")]
    success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
struct RegisterRequest {
    #[prost(uint32, tag = "1")]
    id: u32,
    #[prost(string, tag = "2")]
    name: String,
    #[prost(string, tag = "3")]
    pwd: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct RegisterResponse {
    #[prost(message, optional, tag = "1")]
    result: Option<ResultCode>,
    #[prost(bool, tag = "2")]
    success: bool,
}

/// Find a port that is free right now.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn write_config(port: u16) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    writeln!(file, "# provider under test").unwrap();
    writeln!(file, "rpcserverip=127.0.0.1").unwrap();
    writeln!(file, "rpcserverport={}", port).unwrap();
    writeln!(file, "worker_threads=2").unwrap();
    writeln!(file, "idle_timeout_secs=1").unwrap();
    file.flush().unwrap();
    file
}

fn spawn_provider(config: &NamedTempFile) -> Child {
    Command::new(env!("CARGO_BIN_EXE_rpchost-provider"))
        .arg("-i")
        .arg(config.path())
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to start provider")
}

/// Wait until Echo.Ping answers.
async fn wait_for_provider(channel: &RpcChannel, timeout_secs: u64) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(timeout_secs) {
        let ping = channel
            .call::<PingRequest, PingResponse>("Echo", "Ping", &PingRequest {})
            .await;
        if matches!(ping, Ok(PingResponse { pong: true })) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

async fn start_provider() -> (Child, NamedTempFile, RpcChannel) {
    let port = free_port();
    let config = write_config(port);
    let child = spawn_provider(&config);

    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let channel = RpcChannel::new(addr).with_timeouts(Duration::from_secs(1), Duration::from_secs(5));
    assert!(
        wait_for_provider(&channel, 15).await,
        "provider did not come up on port {}",
        port
    );
    (child, config, channel)
}

#[tokio::test]
async fn test_ping() {
    let (_child, _config, channel) = start_provider().await;

    let resp: PingResponse = channel.call("Echo", "Ping", &PingRequest {}).await.unwrap();
    assert!(resp.pong);
}

#[tokio::test]
async fn test_register_and_login() {
    let (_child, _config, channel) = start_provider().await;

    let registered: RegisterResponse = channel
        .call(
            "UserServiceRpc",
            "Register",
            &RegisterRequest {
                id: 2000,
                name: "zhang san".into(),
                pwd: "123456".into(),
            },
        )
        .await
        .unwrap();
    assert!(registered.success);
    assert_eq!(registered.result.unwrap().errcode, 0);

    let login: LoginResponse = channel
        .call(
            "UserServiceRpc",
            "Login",
            &LoginRequest {
                name: "zhang san".into(),
                pwd: "123456".into(),
            },
        )
        .await
        .unwrap();
    assert!(login.success);

    let rejected: LoginResponse = channel
        .call(
            "UserServiceRpc",
            "Login",
            &LoginRequest {
                name: "zhang san".into(),
                pwd: "000000".into(),
            },
        )
        .await
        .unwrap();
    assert!(!rejected.success);
    assert_ne!(rejected.result.unwrap().errcode, 0);
}

#[tokio::test]
async fn test_unknown_service_gets_empty_response() {
    let (_child, _config, channel) = start_provider().await;

    let err = channel
        .call::<PingRequest, PingResponse>("Unregistered", "Ping", &PingRequest {})
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::EmptyResponse { .. }));
}

#[test]
fn test_missing_config_argument_fails() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_rpchost-provider"))
        .output()
        .expect("Failed to run provider");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--config"), "unexpected usage text: {}", stderr);
}

#[test]
fn test_missing_config_file_fails() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_rpchost-provider"))
        .args(["-i", "/nonexistent/provider.conf"])
        .output()
        .expect("Failed to run provider");

    assert!(!output.status.success());
}

#[test]
fn test_config_without_port_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "rpcserverip=127.0.0.1").unwrap();
    file.flush().unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_rpchost-provider"))
        .arg("-i")
        .arg(file.path())
        .env_remove("RPCHOST_RPCSERVERPORT")
        .output()
        .expect("Failed to run provider");

    assert!(!output.status.success());
}
