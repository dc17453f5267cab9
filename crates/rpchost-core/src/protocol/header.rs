//! The request header message.

/// Names the target of a request and the size of its argument payload.
///
/// Field numbers match the `mprpc.RpcHeader` protobuf definition used by
/// existing consumers, so frames are interchangeable with them.
#[derive(Clone, PartialEq, Eq, Hash, prost::Message)]
pub struct RpcHeader {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub method_name: String,
    #[prost(uint32, tag = "3")]
    pub args_size: u32,
}

impl RpcHeader {
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>, args_size: u32) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
            args_size,
        }
    }
}
