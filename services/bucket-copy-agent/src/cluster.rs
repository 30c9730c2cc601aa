// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Cluster-facing collaborators: local object metadata, cluster membership
//! and placement, and capacity status.

use std::fmt;

use bucket_copy_types::{BucketRef, NodeId};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use thiserror::Error;

use crate::store::StoreError;

// ============================================================================
// Local objects
// ============================================================================

/// Object attributes carried alongside object data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjAttrs {
    /// Size in bytes; `None` when not known ahead of time (transformed data)
    pub size: Option<u64>,
    /// MD5 checksum, base64 encoded
    pub cksum: Option<String>,
    /// Last access time
    pub atime: Option<DateTime<Utc>>,
    /// Object version
    pub version: Option<String>,
}

/// Local object metadata: bucket, name and attributes of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lom {
    pub bck: BucketRef,
    pub obj_name: String,
    pub attrs: ObjAttrs,
}

impl Lom {
    /// Resolve a local object, validating its name.
    pub fn init(bck: &BucketRef, obj_name: &str) -> Result<Self, StoreError> {
        if obj_name.is_empty()
            || obj_name.starts_with('/')
            || obj_name.split('/').any(|part| part == ".." || part == ".")
        {
            return Err(StoreError::InvalidName(obj_name.to_string()));
        }
        if bck.name.is_empty() || bck.name.contains('/') {
            return Err(StoreError::InvalidName(bck.to_string()));
        }
        Ok(Self {
            bck: bck.clone(),
            obj_name: obj_name.to_string(),
            attrs: ObjAttrs::default(),
        })
    }

    /// Copy attributes received from elsewhere.
    ///
    /// With `skip_cksum` the checksum is left alone so that it is not
    /// treated as validated.
    pub fn copy_attrs(&mut self, attrs: &ObjAttrs, skip_cksum: bool) {
        self.attrs.size = attrs.size;
        self.attrs.atime = attrs.atime;
        self.attrs.version = attrs.version.clone();
        if !skip_cksum {
            self.attrs.cksum = attrs.cksum.clone();
        }
    }

    /// Size in bytes, 0 if unknown
    pub fn size_bytes(&self) -> u64 {
        self.attrs.size.unwrap_or(0)
    }

    /// Cluster-wide unique name, used for placement
    pub fn uname(&self) -> String {
        format!("{}/{}", self.bck.uname(), self.obj_name)
    }
}

impl fmt::Display for Lom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bck, self.obj_name)
    }
}

// ============================================================================
// Cluster membership
// ============================================================================

/// Cluster membership as seen by one target.
pub trait ClusterMap: Send + Sync {
    /// IDs of all storage targets, including this one
    fn target_ids(&self) -> Vec<NodeId>;

    /// Number of storage targets
    fn count_targets(&self) -> usize {
        self.target_ids().len()
    }

    /// Target that owns the object with the given unique name
    fn hrw_target(&self, uname: &str) -> Option<NodeId> {
        hrw(&self.target_ids(), uname)
    }
}

/// Highest random weight placement: the target whose hash with the name
/// is largest owns it.
pub fn hrw(targets: &[NodeId], uname: &str) -> Option<NodeId> {
    targets
        .iter()
        .max_by_key(|id| {
            let mut hasher = Md5::new();
            hasher.update(id.as_bytes());
            hasher.update(b"/");
            hasher.update(uname.as_bytes());
            let digest = hasher.finalize();
            let mut weight = [0u8; 8];
            weight.copy_from_slice(&digest[..8]);
            u64::from_be_bytes(weight)
        })
        .cloned()
}

/// Fixed cluster membership
#[derive(Debug, Clone)]
pub struct StaticClusterMap {
    targets: Vec<NodeId>,
}

impl StaticClusterMap {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }
}

impl ClusterMap for StaticClusterMap {
    fn target_ids(&self) -> Vec<NodeId> {
        self.targets.clone()
    }

    fn count_targets(&self) -> usize {
        self.targets.len()
    }
}

// ============================================================================
// Capacity
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("out of space: {used} of {quota} bytes used ({pct}% >= {oos_pct}%)")]
    OutOfSpace {
        used: u64,
        quota: u64,
        pct: u8,
        oos_pct: u8,
    },
}

/// Point-in-time capacity status of a target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapStatus {
    /// Bytes in use
    pub used: u64,
    /// Quota in bytes, 0 when unlimited
    pub quota: u64,
    /// Above the high watermark: copies should slow down
    pub throttle: bool,
    /// Set when capacity is exhausted
    pub err: Option<CapacityError>,
}

/// Capacity monitor consulted after every object copy
pub trait CapacityMonitor: Send + Sync {
    fn status(&self) -> CapStatus;
}
