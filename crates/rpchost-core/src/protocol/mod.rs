//! Wire protocol for provider requests.
//!
//! Defines the request frame: a 4-byte little-endian header length, a
//! protobuf-encoded [`RpcHeader`], then `args_size` bytes of protobuf-encoded
//! method arguments.
//!
//! ```text
//! [u32 LE: header_len][RpcHeader: header_len bytes][args: args_size bytes]
//! ```
//!
//! Responses carry no framing: the provider writes the encoded result
//! message and closes the connection.

pub mod codec;
pub mod header;

pub use codec::{decode, decode_header, encode_frame, encode_header, encode_result, Frame};
pub use header::RpcHeader;

/// Size of the header length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;
