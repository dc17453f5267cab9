//! Liveness probe service.

use rpchost_core::{MethodDescriptor, Service};
use std::sync::Arc;

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingResponse {
    #[prost(bool, tag = "1")]
    pub pong: bool,
}

pub struct EchoService;

impl Service for EchoService {
    fn name(&self) -> &str {
        "Echo"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
        vec![MethodDescriptor::new(
            "Ping",
            |_: PingRequest, mut resp: PingResponse, done| {
                resp.pong = true;
                done.complete(resp);
            },
        )]
    }
}
