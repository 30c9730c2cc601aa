// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Object transfer between targets
//!
//! A [`Transport`] delivers [`Message`]s to named endpoints on other
//! targets. Each message carries either object data (header plus payload
//! stream) or the end-of-stream marker a target broadcasts once it will not
//! send anything more for a job. The [`bundle::DataMover`] adds the per-job
//! lifecycle on top.

pub mod bundle;
pub mod loopback;

use std::sync::Arc;

use async_trait::async_trait;
use bucket_copy_types::{BucketRef, NodeId};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::cluster::ObjAttrs;

/// Opcode of a data record
pub const OPC_DATA: i32 = 0;

/// Opcode of the "done sending" marker
pub const OPC_DONE: i32 = 27182;

/// Payload stream of a record
pub type Payload = Box<dyn AsyncRead + Send + Unpin>;

/// An empty payload
pub fn empty_payload() -> Payload {
    Box::new(tokio::io::empty())
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("end of stream")]
    Eof,

    #[error("data mover {0} is not open")]
    NotOpen(String),

    #[error("endpoint {0} is already registered")]
    AlreadyRegistered(String),

    #[error("no endpoint {trname} on {node}")]
    UnknownEndpoint { trname: String, node: NodeId },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown opcode {0}")]
    BadOpcode(i32),

    #[error("data record without a header")]
    MissingHeader,

    #[error("stream closed: {0}")]
    Closed(String),

    #[error("failed to send to {failed} of {total} target(s): {first}")]
    Broadcast {
        failed: usize,
        total: usize,
        first: Box<TransportError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True for a clean end of stream
    pub fn is_eof(&self) -> bool {
        matches!(self, TransportError::Eof)
    }
}

/// Header of a data record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjHdr {
    /// Destination bucket
    pub bck: BucketRef,
    /// Destination object name
    pub obj_name: String,
    /// Object attributes; `size` is `None` for transformed objects
    pub attrs: ObjAttrs,
    /// Sending target
    pub sender: NodeId,
}

/// A record exchanged between targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Object data; the payload carries the bytes
    Data(ObjHdr),
    /// The sending target will send nothing more for this job
    EndOfStream(NodeId),
}

impl Message {
    /// Numeric opcode, for transports that frame one
    pub fn opcode(&self) -> i32 {
        match self {
            Message::Data(_) => OPC_DATA,
            Message::EndOfStream(_) => OPC_DONE,
        }
    }

    /// Decode a framed record.
    pub fn from_opcode(
        opcode: i32,
        sender: NodeId,
        hdr: Option<ObjHdr>,
    ) -> Result<Message, TransportError> {
        match opcode {
            OPC_DATA => hdr.map(Message::Data).ok_or(TransportError::MissingHeader),
            OPC_DONE => Ok(Message::EndOfStream(sender)),
            other => Err(TransportError::BadOpcode(other)),
        }
    }

    /// Target the record came from
    pub fn sender(&self) -> &str {
        match self {
            Message::Data(hdr) => &hdr.sender,
            Message::EndOfStream(sender) => sender,
        }
    }
}

/// Callback invoked for every record arriving at an endpoint.
///
/// `err` carries a transport-level failure for this record, if any. The
/// receiver owns the payload and must drain it.
#[async_trait]
pub trait ObjReceiver: Send + Sync {
    async fn recv(&self, msg: Message, payload: Payload, err: Option<TransportError>);
}

/// Node-to-node transport shared by all jobs of a target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Target this transport belongs to
    fn node_id(&self) -> &str;

    /// Register the receiver for endpoint `trname`.
    fn register(&self, trname: &str, recv: Arc<dyn ObjReceiver>) -> Result<(), TransportError>;

    /// Remove endpoint `trname`; records sent to it afterwards fail.
    fn unregister(&self, trname: &str);

    /// Deliver one record to endpoint `trname` on target `to`.
    async fn send(
        &self,
        trname: &str,
        to: &str,
        msg: Message,
        payload: Payload,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr() -> ObjHdr {
        ObjHdr {
            bck: BucketRef::new("dst", 1),
            obj_name: "obj".to_string(),
            attrs: ObjAttrs::default(),
            sender: "t1".to_string(),
        }
    }

    #[test]
    fn test_opcodes() {
        assert_eq!(Message::Data(hdr()).opcode(), 0);
        assert_eq!(Message::EndOfStream("t1".to_string()).opcode(), 27182);
    }

    #[test]
    fn test_from_opcode() {
        let data = Message::from_opcode(OPC_DATA, "t1".to_string(), Some(hdr())).unwrap();
        assert_eq!(data, Message::Data(hdr()));
        assert_eq!(data.sender(), "t1");

        let done = Message::from_opcode(OPC_DONE, "t2".to_string(), None).unwrap();
        assert_eq!(done, Message::EndOfStream("t2".to_string()));

        assert!(matches!(
            Message::from_opcode(OPC_DATA, "t1".to_string(), None),
            Err(TransportError::MissingHeader)
        ));
        assert!(matches!(
            Message::from_opcode(7, "t1".to_string(), None),
            Err(TransportError::BadOpcode(7))
        ));
    }

    #[test]
    fn test_is_eof() {
        assert!(TransportError::Eof.is_eof());
        assert!(!TransportError::Closed("x".to_string()).is_eof());
    }
}
