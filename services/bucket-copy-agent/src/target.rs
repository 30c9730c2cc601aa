// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Collaborators of one storage target
//!
//! Jobs reach the object store, cluster map, capacity monitor, transport,
//! buffer pool and registered transforms through a shared [`Target`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{CapacityMonitor, ClusterMap};
use crate::config::AgentConfig;
use crate::fs_store::FsStore;
use crate::memsys::BufferPool;
use crate::store::{Echo, ObjectStore, StoreError, Transform};
use crate::transport::Transport;

pub struct Target {
    pub config: AgentConfig,
    pub store: Arc<dyn ObjectStore>,
    pub capacity: Arc<dyn CapacityMonitor>,
    pub smap: Arc<dyn ClusterMap>,
    pub transport: Arc<dyn Transport>,
    pub slab: Arc<BufferPool>,
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl Target {
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn ObjectStore>,
        capacity: Arc<dyn CapacityMonitor>,
        smap: Arc<dyn ClusterMap>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let slab = BufferPool::new(config.slab_buf_size);
        let mut target = Self {
            config,
            store,
            capacity,
            smap,
            transport,
            slab,
            transforms: HashMap::new(),
        };
        target.register_transform(Arc::new(Echo));
        target
    }

    /// Build a target backed by an [`FsStore`] under `config.data_dir`,
    /// which also serves as the capacity monitor.
    pub async fn open_fs(
        config: AgentConfig,
        smap: Arc<dyn ClusterMap>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, StoreError> {
        let fs = Arc::new(FsStore::open(&config, Arc::clone(&smap)).await?);
        let store: Arc<dyn ObjectStore> = fs.clone();
        let capacity: Arc<dyn CapacityMonitor> = fs;
        Ok(Self::new(config, store, capacity, smap, transport))
    }

    pub fn node_id(&self) -> &str {
        self.transport.node_id()
    }

    pub fn register_transform(&mut self, dp: Arc<dyn Transform>) {
        self.transforms.insert(dp.name().to_string(), dp);
    }

    pub fn transform(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }
}
