// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Per-job data mover
//!
//! A [`DataMover`] owns one transport endpoint for the lifetime of a job:
//! it registers the job's receiver, gates sends on being open, and
//! broadcasts control records to every other target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bucket_copy_types::NodeId;

use super::{Message, ObjReceiver, Payload, Transport, TransportError, empty_payload};
use crate::cluster::ClusterMap;

pub struct DataMover {
    trname: String,
    transport: Arc<dyn Transport>,
    smap: Arc<dyn ClusterMap>,
    open: AtomicBool,
    registered: AtomicBool,
    owner: Mutex<Option<String>>,
}

impl DataMover {
    pub fn new(
        trname: impl Into<String>,
        transport: Arc<dyn Transport>,
        smap: Arc<dyn ClusterMap>,
    ) -> Self {
        Self {
            trname: trname.into(),
            transport,
            smap,
            open: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            owner: Mutex::new(None),
        }
    }

    /// Target this data mover runs on
    pub fn node_id(&self) -> &str {
        self.transport.node_id()
    }

    /// Register the receiver of inbound records.
    pub fn reg_recv(&self, recv: Arc<dyn ObjReceiver>) -> Result<(), TransportError> {
        self.transport.register(&self.trname, recv)?;
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Unregister the receiver. Safe to call more than once.
    pub fn unreg_recv(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            self.transport.unregister(&self.trname);
        }
    }

    /// Name of the job driving this data mover, for logging
    pub fn set_owner(&self, owner: impl Into<String>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(owner.into());
    }

    fn owner(&self) -> String {
        self.owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.trname.clone())
    }

    pub fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            tracing::debug!(trname = %self.trname, owner = %self.owner(), "Data mover open");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop sending. `err` is the reason the owner is closing, if any.
    pub fn close(&self, err: Option<&dyn std::fmt::Display>) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        match err {
            Some(e) => tracing::info!(
                trname = %self.trname,
                owner = %self.owner(),
                error = %e,
                "Data mover closed with error"
            ),
            None => tracing::debug!(trname = %self.trname, owner = %self.owner(), "Data mover closed"),
        }
    }

    /// Send one record to target `to`.
    pub async fn send(
        &self,
        msg: Message,
        payload: Payload,
        to: &str,
    ) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen(self.trname.clone()));
        }
        self.transport.send(&self.trname, to, msg, payload).await
    }

    /// Send a payload-less record to every other target.
    ///
    /// Every target is attempted; the first failure is reported.
    pub async fn bcast(&self, msg: Message) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen(self.trname.clone()));
        }
        let peers: Vec<NodeId> = self
            .smap
            .target_ids()
            .into_iter()
            .filter(|id| id != self.node_id())
            .collect();

        let total = peers.len();
        let mut failed = 0;
        let mut first = None;
        for peer in peers {
            if let Err(e) = self
                .transport
                .send(&self.trname, &peer, msg.clone(), empty_payload())
                .await
            {
                tracing::warn!(trname = %self.trname, peer = %peer, error = %e, "Broadcast failed");
                failed += 1;
                first.get_or_insert(e);
            }
        }
        match first {
            Some(first) => Err(TransportError::Broadcast {
                failed,
                total,
                first: Box::new(first),
            }),
            None => Ok(()),
        }
    }
}
