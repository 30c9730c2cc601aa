// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-process transport
//!
//! Targets attached to the same [`LoopbackNetwork`] deliver records to each
//! other by calling the destination receiver directly. A send completes
//! once the receiver has returned, so records from one sender arrive in the
//! order they were sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use bucket_copy_types::NodeId;

use super::{Message, ObjReceiver, Payload, Transport, TransportError};

/// A set of in-process targets that can reach each other
#[derive(Default)]
pub struct LoopbackNetwork {
    nodes: Mutex<HashMap<NodeId, Arc<LoopbackTransport>>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a target, returning its transport. Attaching the same ID twice
    /// returns the existing transport.
    pub fn join(self: &Arc<Self>, node_id: impl Into<NodeId>) -> Arc<LoopbackTransport> {
        let node_id = node_id.into();
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(nodes.entry(node_id.clone()).or_insert_with(|| {
            Arc::new(LoopbackTransport {
                node_id,
                network: Arc::downgrade(self),
                endpoints: Mutex::new(HashMap::new()),
            })
        }))
    }

    fn node(&self, node_id: &str) -> Option<Arc<LoopbackTransport>> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
    }
}

/// Transport endpoint of one target on a [`LoopbackNetwork`]
pub struct LoopbackTransport {
    node_id: NodeId,
    network: Weak<LoopbackNetwork>,
    endpoints: Mutex<HashMap<String, Arc<dyn ObjReceiver>>>,
}

impl LoopbackTransport {
    fn receiver(&self, trname: &str) -> Option<Arc<dyn ObjReceiver>> {
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(trname)
            .cloned()
    }

    /// True when endpoint `trname` is registered
    pub fn is_registered(&self, trname: &str) -> bool {
        self.receiver(trname).is_some()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn register(&self, trname: &str, recv: Arc<dyn ObjReceiver>) -> Result<(), TransportError> {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if endpoints.contains_key(trname) {
            return Err(TransportError::AlreadyRegistered(trname.to_string()));
        }
        endpoints.insert(trname.to_string(), recv);
        Ok(())
    }

    fn unregister(&self, trname: &str) {
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(trname);
    }

    async fn send(
        &self,
        trname: &str,
        to: &str,
        msg: Message,
        payload: Payload,
    ) -> Result<(), TransportError> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| TransportError::Closed("loopback network is gone".to_string()))?;
        let node = network
            .node(to)
            .ok_or_else(|| TransportError::UnknownNode(to.to_string()))?;
        let recv = node
            .receiver(trname)
            .ok_or_else(|| TransportError::UnknownEndpoint {
                trname: trname.to_string(),
                node: to.to_string(),
            })?;

        recv.recv(msg, payload, None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::empty_payload;
    use tokio::io::AsyncReadExt;

    #[derive(Default)]
    struct Collect {
        got: Mutex<Vec<(Message, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjReceiver for Collect {
        async fn recv(&self, msg: Message, mut payload: Payload, _err: Option<TransportError>) {
            let mut data = Vec::new();
            let _ = payload.read_to_end(&mut data).await;
            self.got.lock().unwrap().push((msg, data));
        }
    }

    #[tokio::test]
    async fn test_ordered_delivery() {
        let net = LoopbackNetwork::new();
        let t1 = net.join("t1");
        let t2 = net.join("t2");

        let sink = Arc::new(Collect::default());
        t2.register("ep", sink.clone()).unwrap();
        assert!(t2.is_registered("ep"));
        assert!(matches!(
            t2.register("ep", sink.clone()),
            Err(TransportError::AlreadyRegistered(_))
        ));

        for i in 0..3u8 {
            t1.send(
                "ep",
                "t2",
                Message::EndOfStream(format!("t1-{}", i)),
                Box::new(std::io::Cursor::new(vec![i])),
            )
            .await
            .unwrap();
        }

        let got = sink.got.lock().unwrap();
        assert_eq!(got.len(), 3);
        for (i, (msg, data)) in got.iter().enumerate() {
            assert_eq!(msg.sender(), format!("t1-{}", i));
            assert_eq!(data, &vec![i as u8]);
        }
    }

    #[tokio::test]
    async fn test_send_errors() {
        let net = LoopbackNetwork::new();
        let t1 = net.join("t1");
        net.join("t2");

        let err = t1
            .send("ep", "t3", Message::EndOfStream("t1".into()), empty_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownNode(_)));

        let err = t1
            .send("ep", "t2", Message::EndOfStream("t1".into()), empty_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownEndpoint { .. }));
    }
}
