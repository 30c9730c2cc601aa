// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for the bucket copy agent

use std::sync::Arc;

use anyhow::Result;

use bucket_copy_types::{AdmissionRequest, AdmissionResponse, Phase, XactSnapshot};

use crate::cluster::{ClusterMap, StaticClusterMap};
use crate::config::AgentConfig;
use crate::error::XactError;
use crate::registry::Registry;
use crate::target::Target;
use crate::tcb::XactTcb;
use crate::tcb::factory::TcbFactory;
use crate::transport::Transport;
use crate::transport::loopback::LoopbackNetwork;
use crate::xact::Xact;

/// API context shared across all request handlers
pub struct ApiContext {
    target: Arc<Target>,
    registry: Arc<Registry>,
    factory: TcbFactory,
    // Keeps an owned in-process network reachable
    _network: Option<Arc<LoopbackNetwork>>,
}

impl ApiContext {
    /// Create a context for a standalone, single-target cluster
    pub async fn new(config: AgentConfig) -> Result<Self> {
        let network = LoopbackNetwork::new();
        let transport: Arc<dyn Transport> = network.join(config.node_id.clone());
        let smap: Arc<dyn ClusterMap> = Arc::new(StaticClusterMap::new([config.node_id.clone()]));
        let target = Target::open_fs(config, smap, transport).await?;
        let mut ctx = Self::with_target(Arc::new(target));
        ctx._network = Some(network);
        Ok(ctx)
    }

    /// Create a context around an existing target
    pub fn with_target(target: Arc<Target>) -> Self {
        let registry = Arc::new(Registry::with_retention(target.config.max_finished_jobs));
        let factory = TcbFactory::new(Arc::clone(&target), Arc::clone(&registry));
        Self {
            target,
            registry,
            factory,
            _network: None,
        }
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Admit a request. A `commit` runs the job in the background.
    pub fn admit(&self, req: AdmissionRequest) -> Result<AdmissionResponse, XactError> {
        let admission = self.factory.admit(&req)?;
        if req.phase == Phase::Commit {
            let tcb = Arc::clone(admission.xact());
            tokio::spawn(async move {
                tcb.run().await;
            });
        }
        Ok(AdmissionResponse {
            id: req.id,
            reused: admission.is_reused(),
        })
    }

    pub fn xact(&self, id: &str) -> Option<Arc<XactTcb>> {
        self.registry.get(id)
    }

    pub fn get(&self, id: &str) -> Option<XactSnapshot> {
        self.registry.get(id).map(|x| x.snapshot())
    }

    pub fn list(&self) -> Vec<XactSnapshot> {
        self.registry.list().iter().map(|x| x.snapshot()).collect()
    }

    /// Abort a job. Returns `None` for an unknown job, otherwise whether
    /// the job was still unfinished.
    pub fn abort(&self, id: &str) -> Option<bool> {
        self.registry.get(id).map(|x| x.abort())
    }
}
