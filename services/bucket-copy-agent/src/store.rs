// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Object store interface used by bucket jobs
//!
//! A job never touches object bytes directly. It asks the store to copy a
//! local object (optionally through a [`Transform`]) and, on the receive
//! side, to persist an object that arrived from a peer.

use std::sync::Arc;

use async_trait::async_trait;
use bucket_copy_types::BucketRef;
use bytes::Bytes;
use thiserror::Error;

use crate::cluster::{CapacityError, Lom};
use crate::memsys::SlabBuf;
use crate::transport::bundle::DataMover;
use crate::transport::{Payload, TransportError};

/// Errors returned by the object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    OutOfSpace(CapacityError),

    #[error("object {0} does not exist")]
    NotFound(String),

    #[error("invalid object or bucket name: {0}")]
    InvalidName(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{obj}: checksum mismatch (expected {expected}, got {actual})")]
    BadChecksum {
        obj: String,
        expected: String,
        actual: String,
    },

    #[error("transform {name} failed: {message}")]
    Transform { name: String, message: String },

    #[error("no target owns {0}")]
    NoTarget(String),

    #[error("failed to send {obj} to {target}: {source}")]
    Send {
        obj: String,
        target: String,
        #[source]
        source: TransportError,
    },
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the store ran out of space
    pub fn is_oos(&self) -> bool {
        matches!(self, StoreError::OutOfSpace(_))
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// Per-object transformation applied by transform (ETL) jobs.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Name under which the transform is registered
    fn name(&self) -> &str;

    /// Transform the content of one object.
    async fn transform(&self, lom: &Lom, data: Bytes) -> Result<Bytes, StoreError>;
}

/// Pass-through transform
#[derive(Debug, Default)]
pub struct Echo;

#[async_trait]
impl Transform for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn transform(&self, _lom: &Lom, data: Bytes) -> Result<Bytes, StoreError> {
        Ok(data)
    }
}

// ============================================================================
// Copy and put parameters
// ============================================================================

/// Per-object copy arguments.
///
/// Jobs borrow these from a pool for the duration of a single copy; see
/// `tcb::params::CopyParamsPool`.
#[derive(Default)]
pub struct CopyObjectParams {
    /// Destination bucket
    pub bck_to: Option<BucketRef>,
    /// Destination object name
    pub obj_name_to: String,
    /// Scratch buffer for reading the source
    pub buf: Option<SlabBuf>,
    /// Data mover used when the destination lives on another target
    pub dm: Option<Arc<DataMover>>,
    /// Transform to apply, if any
    pub dp: Option<Arc<dyn Transform>>,
    /// Do everything except the final write or send
    pub dry_run: bool,
}

impl CopyObjectParams {
    /// Clear every field so nothing leaks into the next borrower.
    pub fn reset(&mut self) {
        *self = CopyObjectParams::default();
    }

    /// True when no field holds a value
    pub fn is_reset(&self) -> bool {
        self.bck_to.is_none()
            && self.obj_name_to.is_empty()
            && self.buf.is_none()
            && self.dm.is_none()
            && self.dp.is_none()
            && !self.dry_run
    }
}

/// Kind of workfile a put is staged through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTag {
    /// Regular put
    Put,
    /// Put of an object received from a peer
    WorkfilePut,
}

impl WorkTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkTag::Put => "put",
            WorkTag::WorkfilePut => "wfput",
        }
    }
}

/// Write classification of a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvType {
    /// Regular write; mirrored to the cloud backend when the bucket has one
    RegularPut,
    /// Object moved between targets; never mirrored
    Migrated,
}

/// Arguments of [`ObjectStore::put_object`]
pub struct PutObjectParams<'a> {
    pub tag: WorkTag,
    pub recv_type: RecvType,
    pub reader: &'a mut Payload,
}

/// Local object store of one target
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Objects of `bck` stored on this target, optionally filtered by name
    /// prefix, in name order.
    async fn list_local(
        &self,
        bck: &BucketRef,
        prefix: Option<&str>,
    ) -> Result<Vec<Lom>, StoreError>;

    /// Copy (and optionally transform) one local object to
    /// `params.bck_to`/`params.obj_name_to`.
    ///
    /// Returns the number of bytes written, or `None` when a transform was
    /// applied and the resulting size is not known to the caller.
    async fn copy_object(
        &self,
        lom: &Lom,
        params: &mut CopyObjectParams,
    ) -> Result<Option<u64>, StoreError>;

    /// Persist an object from `params.reader` under `lom`. Attributes
    /// already set on `lom` are kept, missing ones are computed.
    async fn put_object(
        &self,
        lom: &mut Lom,
        params: PutObjectParams<'_>,
    ) -> Result<(), StoreError>;

    /// Read the full content of a local object
    async fn read_object(&self, bck: &BucketRef, obj_name: &str) -> Result<Bytes, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memsys::BufferPool;

    #[test]
    fn test_reset_clears_every_field() {
        let pool = BufferPool::new(16);
        let mut params = CopyObjectParams {
            bck_to: Some(BucketRef::new("dst", 1)),
            obj_name_to: "obj".to_string(),
            buf: Some(pool.alloc()),
            dm: None,
            dp: Some(Arc::new(Echo)),
            dry_run: true,
        };
        assert!(!params.is_reset());

        params.reset();
        assert!(params.is_reset());
        // The scratch buffer went back to its pool
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_echo_passes_data_through() {
        let lom = Lom::init(&BucketRef::new("b", 1), "obj").unwrap();
        let out = Echo
            .transform(&lom, Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(&out[..], b"hello");
        assert_eq!(Echo.name(), "echo");
    }

    #[test]
    fn test_oos_classification() {
        let oos = StoreError::OutOfSpace(CapacityError::OutOfSpace {
            used: 95,
            quota: 100,
            pct: 95,
            oos_pct: 95,
        });
        assert!(oos.is_oos());
        assert!(!StoreError::NotFound("x".to_string()).is_oos());
    }
}
