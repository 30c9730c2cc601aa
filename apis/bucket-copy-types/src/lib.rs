// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared types for the bucket copy/transform service.
//!
//! This crate contains the data structures exchanged between a storage
//! target running the bucket copy agent and whatever coordinator or operator
//! tooling drives it: admission requests, the two-phase admission `Phase`,
//! and the job status snapshot reported while a job runs and after it ends.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};

// ============================================================================
// Type Aliases
// ============================================================================

/// Job identifier (UUID string), unique cluster-wide
pub type XactId = String;

/// Storage target identifier
pub type NodeId = String;

// ============================================================================
// Buckets
// ============================================================================

/// Storage provider of a bucket.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    /// Native cluster bucket
    #[default]
    Ais,
    /// Amazon S3
    Aws,
    /// Google Cloud Storage
    Gcp,
    /// Azure blob storage
    Azure,
}

/// Remote bucket that backs a cluster bucket.
///
/// Writes into a bucket with a backend are mirrored to the backend once the
/// local copy is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BackendRef {
    /// Provider of the backend bucket
    pub provider: Provider,
    /// Backend bucket name
    pub name: String,
}

/// Reference to a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BucketRef {
    /// Bucket name
    pub name: String,
    /// Bucket provider
    #[serde(default)]
    pub provider: Provider,
    /// Bucket ID assigned by the metadata service; distinguishes a bucket
    /// from an earlier bucket that had the same name.
    #[serde(default)]
    pub bid: u64,
    /// Optional remote backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendRef>,
}

impl BucketRef {
    /// Create a native bucket reference with no backend.
    pub fn new(name: impl Into<String>, bid: u64) -> Self {
        Self {
            name: name.into(),
            provider: Provider::Ais,
            bid,
            backend: None,
        }
    }

    /// Attach a remote backend to this bucket.
    pub fn with_backend(mut self, provider: Provider, name: impl Into<String>) -> Self {
        self.backend = Some(BackendRef {
            provider,
            name: name.into(),
        });
        self
    }

    /// Unique name of the bucket: `<provider>/<name>`
    pub fn uname(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }

    /// Compare two bucket references.
    ///
    /// Name and provider always have to match. `same_bid` additionally
    /// requires the same bucket ID and `same_backend` the same backend.
    pub fn equal(&self, other: &BucketRef, same_bid: bool, same_backend: bool) -> bool {
        if self.name != other.name || self.provider != other.provider {
            return false;
        }
        if same_bid && self.bid != other.bid {
            return false;
        }
        if same_backend && self.backend != other.backend {
            return false;
        }
        true
    }
}

impl fmt::Display for BucketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.provider, self.name)
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Kind of bucket job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum XactKind {
    /// Plain bucket-to-bucket copy
    CopyBucket,
    /// Bucket-to-bucket copy with each object passed through a transform
    EtlBucket,
}

/// Two-phase admission phase.
///
/// A coordinator first sends `Begin` to every target (the job is created
/// and its transfer endpoint registered), then `Commit` for the same job ID
/// (the job starts running).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Prepare: create the job, do not run it yet
    Begin,
    /// Commit: run the job created by `Begin`
    Commit,
}

/// Copy options carried by an admission request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopyBckMsg {
    /// String prepended to every destination object name
    #[serde(default)]
    pub prepend: String,
    /// Only source objects whose names start with this prefix are copied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Visit and account for every object without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

impl CopyBckMsg {
    /// Destination object name for the given source object name.
    pub fn to_name(&self, name: &str) -> String {
        if self.prepend.is_empty() {
            return name.to_string();
        }
        format!("{}{}", self.prepend, name)
    }
}

/// Reference to a named transform registered on every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransformSpec {
    /// Transform name
    pub name: String,
}

/// Request to admit (create or continue) a bucket job on a target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AdmissionRequest {
    /// Cluster-wide job ID (UUID); the same ID is used for both phases
    pub id: XactId,
    /// Job kind
    pub kind: XactKind,
    /// Source bucket
    pub from: BucketRef,
    /// Destination bucket
    pub to: BucketRef,
    /// Copy options
    #[serde(default)]
    pub msg: CopyBckMsg,
    /// Transform to apply; required for `etl_bucket`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformSpec>,
    /// Admission phase
    pub phase: Phase,
}

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdmissionResponse {
    /// Job ID
    pub id: XactId,
    /// True when an existing instance was reused (commit of a begun job)
    pub reused: bool,
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle state of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum XactState {
    /// Admitted, transfer channel registered, not running yet
    #[default]
    Created,
    /// Walking the local shard
    Running,
    /// Local walk done, waiting for peers to finish sending
    Finishing,
    /// Done, with or without an error
    Finished,
    /// Done because of an abort
    Aborted,
}

impl XactState {
    /// True for `Finished` and `Aborted`
    pub fn is_terminal(&self) -> bool {
        matches!(self, XactState::Finished | XactState::Aborted)
    }
}

/// Classification of a job's terminal error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Admission rejected because another instance is running
    Conflict,
    /// Aborted: external abort, out of space, or capacity pressure
    Aborted,
    /// Peers did not all report completion in time; received data is valid
    QuiesceTimeout,
    /// Copy or transform of a local object failed
    Copy,
    /// Persisting an object received from a peer failed
    Persist,
    /// Transfer channel failure
    Transport,
    /// Invalid request
    Invalid,
}

/// Terminal error reported in a job snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct XactErrorInfo {
    /// Error class
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
}

/// Point-in-time status of a job on one target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct XactSnapshot {
    /// Job ID
    pub id: XactId,
    /// Job kind
    pub kind: XactKind,
    /// Source bucket
    pub from: BucketRef,
    /// Destination bucket
    pub to: BucketRef,
    /// Current admission phase
    pub phase: Phase,
    /// Lifecycle state
    pub state: XactState,
    /// Objects copied by this target
    pub objects: u64,
    /// Bytes copied by this target (pre-transform size when the transformed
    /// size is unknown)
    pub bytes: u64,
    /// Terminal error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<XactErrorInfo>,
    /// When the job started running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the job finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_equal() {
        let a = BucketRef::new("src", 7);
        let same_name_new_bid = BucketRef::new("src", 8);
        assert!(a.equal(&same_name_new_bid, false, true));
        assert!(!a.equal(&same_name_new_bid, true, true));

        let backed = BucketRef::new("src", 7).with_backend(Provider::Aws, "remote");
        assert!(a.equal(&backed, true, false));
        assert!(!a.equal(&backed, true, true));

        let other = BucketRef::new("dst", 7);
        assert!(!a.equal(&other, false, false));
    }

    #[test]
    fn test_bucket_display_and_uname() {
        let b = BucketRef::new("photos", 1);
        assert_eq!(b.to_string(), "ais://photos");
        assert_eq!(b.uname(), "ais/photos");
    }

    #[test]
    fn test_copy_msg_to_name() {
        let plain = CopyBckMsg::default();
        assert_eq!(plain.to_name("a/b.txt"), "a/b.txt");

        let msg = CopyBckMsg {
            prepend: "backup/".to_string(),
            ..Default::default()
        };
        assert_eq!(msg.to_name("a/b.txt"), "backup/a/b.txt");
    }

    #[test]
    fn test_enum_display() {
        assert_eq!(XactKind::CopyBucket.to_string(), "copy_bucket");
        assert_eq!(XactKind::EtlBucket.to_string(), "etl_bucket");
        assert_eq!(Phase::Commit.to_string(), "commit");
        assert_eq!(XactState::Finishing.to_string(), "finishing");
        assert_eq!(ErrorKind::QuiesceTimeout.to_string(), "quiesce_timeout");
    }

    #[test]
    fn test_admission_request_deserialize_defaults() {
        let json = r#"{
            "id": "3f1c6a52-8a7e-4a52-9d4e-2b8b2d1f9c11",
            "kind": "copy_bucket",
            "from": {"name": "src"},
            "to": {"name": "dst", "bid": 2},
            "phase": "begin"
        }"#;
        let req: AdmissionRequest = serde_json::from_str(json).expect("deserialize request");
        assert_eq!(req.kind, XactKind::CopyBucket);
        assert_eq!(req.phase, Phase::Begin);
        assert_eq!(req.from.provider, Provider::Ais);
        assert_eq!(req.to.bid, 2);
        assert!(!req.msg.dry_run);
        assert!(req.transform.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(XactState::Finished.is_terminal());
        assert!(XactState::Aborted.is_terminal());
        assert!(!XactState::Finishing.is_terminal());
        assert!(!XactState::Created.is_terminal());
    }
}
