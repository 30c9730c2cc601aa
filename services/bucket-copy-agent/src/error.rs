// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job-level errors

use bucket_copy_types::{ErrorKind, Phase, XactErrorInfo};
use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Errors reported by a bucket job.
///
/// Every variant maps to exactly one [`ErrorKind`], which is what job status
/// reports alongside the message.
#[derive(Debug, Error)]
pub enum XactError {
    #[error("{running} is currently running - not starting new {requested}")]
    Conflict { running: String, requested: String },

    #[error("{existing} already uses ID {id}")]
    DuplicateId { id: String, existing: String },

    #[error("{running}: bucket mismatch, cannot continue with {from} => {to}")]
    BucketMismatch {
        running: String,
        from: String,
        to: String,
    },

    #[error("{running}: unexpected phase transition {current} -> {requested}")]
    PhaseOrder {
        running: String,
        current: Phase,
        requested: Phase,
    },

    #[error("{xact} aborted ({action}){}", with_cause(.cause))]
    Aborted {
        xact: String,
        action: String,
        cause: Option<String>,
    },

    #[error("{xact}: timed out waiting for {pending} peer(s) to finish sending")]
    QuiesceTimeout { xact: String, pending: i32 },

    #[error("{xact}: failed to copy {obj}: {source}")]
    Copy {
        xact: String,
        obj: String,
        #[source]
        source: StoreError,
    },

    #[error("{xact}: failed to persist {obj} received from peer: {source}")]
    Persist {
        xact: String,
        obj: String,
        #[source]
        source: StoreError,
    },

    #[error("{xact}: transport error: {source}")]
    Transport {
        xact: String,
        #[source]
        source: TransportError,
    },

    #[error("invalid request: {0}")]
    Invalid(String),
}

fn with_cause(cause: &Option<String>) -> String {
    match cause {
        Some(c) => format!(": {}", c),
        None => String::new(),
    }
}

impl XactError {
    /// Build an `Aborted` error with an optional underlying cause.
    pub fn aborted(
        xact: impl Into<String>,
        action: impl Into<String>,
        cause: Option<&dyn std::fmt::Display>,
    ) -> Self {
        XactError::Aborted {
            xact: xact.into(),
            action: action.into(),
            cause: cause.map(|c| c.to_string()),
        }
    }

    /// Error class reported in job status
    pub fn kind(&self) -> ErrorKind {
        match self {
            XactError::Conflict { .. }
            | XactError::DuplicateId { .. }
            | XactError::BucketMismatch { .. }
            | XactError::PhaseOrder { .. } => ErrorKind::Conflict,
            XactError::Aborted { .. } => ErrorKind::Aborted,
            XactError::QuiesceTimeout { .. } => ErrorKind::QuiesceTimeout,
            XactError::Copy { .. } => ErrorKind::Copy,
            XactError::Persist { .. } => ErrorKind::Persist,
            XactError::Transport { .. } => ErrorKind::Transport,
            XactError::Invalid(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, XactError::Aborted { .. })
    }

    /// Status representation of this error
    pub fn info(&self) -> XactErrorInfo {
        XactErrorInfo {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}
