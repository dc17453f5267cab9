//! Frame encoding and decoding.
//!
//! The decoder assumes the buffer holds exactly one request: it never waits
//! for more bytes and never looks for a second frame. Anything after the
//! first frame is reported through [`Frame::trailing`] and otherwise ignored.

use super::header::RpcHeader;
use super::LENGTH_PREFIX_SIZE;
use crate::method::RpcMessage;
use crate::{Result, RpcError};
use prost::Message;

/// A decoded request frame borrowing its argument bytes from the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: RpcHeader,
    pub args: &'a [u8],
    /// Bytes left in the buffer after this frame.
    pub trailing: usize,
}

impl Frame<'_> {
    pub fn service_name(&self) -> &str {
        &self.header.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.header.method_name
    }
}

/// Decode one request frame from `buf`.
///
/// Fails with `IncompleteHeader` when the length prefix or the header bytes
/// are cut short, `HeaderParse` when the header is not a valid `RpcHeader`,
/// and `IncompleteArgs` when fewer than `args_size` bytes follow the header.
pub fn decode(buf: &[u8]) -> Result<Frame<'_>> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(RpcError::IncompleteHeader {
            needed: LENGTH_PREFIX_SIZE,
            available: buf.len(),
        });
    }

    let header_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let header_end = LENGTH_PREFIX_SIZE.saturating_add(header_len);
    if buf.len() < header_end {
        return Err(RpcError::IncompleteHeader {
            needed: header_end,
            available: buf.len(),
        });
    }

    let header = decode_header(&buf[LENGTH_PREFIX_SIZE..header_end])?;

    let remaining = buf.len() - header_end;
    let args_size = header.args_size as usize;
    if remaining < args_size {
        return Err(RpcError::IncompleteArgs {
            expected: header.args_size,
            available: remaining,
        });
    }

    let args_end = header_end + args_size;
    Ok(Frame {
        header,
        args: &buf[header_end..args_end],
        trailing: buf.len() - args_end,
    })
}

/// Parse serialized header bytes.
///
/// A header that parses but names no service or no method is rejected as
/// well; an all-default message is what an empty or zeroed buffer decodes to.
pub fn decode_header(bytes: &[u8]) -> Result<RpcHeader> {
    let header = RpcHeader::decode(bytes).map_err(|e| RpcError::HeaderParse {
        message: format!("{} ({} header bytes)", e, bytes.len()),
        source: Some(e),
    })?;

    if header.service_name.is_empty() || header.method_name.is_empty() {
        return Err(RpcError::HeaderParse {
            message: "header does not name a service and method".to_string(),
            source: None,
        });
    }

    Ok(header)
}

/// Serialize a header without the length prefix.
pub fn encode_header(header: &RpcHeader) -> Vec<u8> {
    header.encode_to_vec()
}

/// Build a complete request frame for `service.method` carrying `args`.
pub fn encode_frame(service: &str, method: &str, args: &[u8]) -> Result<Vec<u8>> {
    let args_size = u32::try_from(args.len()).map_err(|_| RpcError::FrameTooLarge {
        what: "argument payload",
        size: args.len(),
    })?;

    let header = encode_header(&RpcHeader::new(service, method, args_size));
    let header_len = u32::try_from(header.len()).map_err(|_| RpcError::FrameTooLarge {
        what: "header",
        size: header.len(),
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + header.len() + args.len());
    frame.extend_from_slice(&header_len.to_le_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(args);
    Ok(frame)
}

/// Serialize a populated result container into response bytes.
pub fn encode_result(result: &dyn RpcMessage) -> Result<Vec<u8>> {
    result.encode_bytes()
}
