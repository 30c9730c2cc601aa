// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Job admission
//!
//! At most one job runs per (source, destination) bucket pair on a target.
//! A request for a pair that already has a job is accepted only as the
//! `commit` continuation of that same job's `begin`.

use std::sync::Arc;

use bucket_copy_types::{AdmissionRequest, Phase, XactKind};

use super::XactTcb;
use crate::error::XactError;
use crate::metrics;
use crate::registry::Registry;
use crate::store::Transform;
use crate::target::Target;
use crate::xact::Xact;

/// Result of a successful admission
pub enum Admission {
    /// A new job was created and started
    New(Arc<XactTcb>),
    /// The running job was moved to `commit` in place
    Reused(Arc<XactTcb>),
}

impl Admission {
    pub fn xact(&self) -> &Arc<XactTcb> {
        match self {
            Admission::New(x) | Admission::Reused(x) => x,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, Admission::Reused(_))
    }
}

/// Decide whether `req` may continue the job `prev` that is already
/// running for the same bucket pair. On success `prev` is now in `commit`.
pub fn when_prev_is_running(prev: &XactTcb, req: &AdmissionRequest) -> Result<(), XactError> {
    if prev.id() != req.id {
        return Err(XactError::Conflict {
            running: prev.name().to_string(),
            requested: format!("{}[{}]", req.kind, req.id),
        });
    }
    let same_buckets =
        prev.from().equal(&req.from, true, true) && prev.to().equal(&req.to, true, true);
    if !same_buckets {
        return Err(XactError::BucketMismatch {
            running: prev.name().to_string(),
            from: req.from.to_string(),
            to: req.to.to_string(),
        });
    }
    let current = prev.phase();
    if current == Phase::Begin && req.phase == Phase::Commit {
        prev.set_phase(Phase::Commit);
        return Ok(());
    }
    Err(XactError::PhaseOrder {
        running: prev.name().to_string(),
        current,
        requested: req.phase,
    })
}

/// Creates jobs and resolves admission conflicts
pub struct TcbFactory {
    target: Arc<Target>,
    registry: Arc<Registry>,
}

impl TcbFactory {
    pub fn new(target: Arc<Target>, registry: Arc<Registry>) -> Self {
        Self { target, registry }
    }

    /// Admit a request: create and start a job, or continue the running one.
    pub fn admit(&self, req: &AdmissionRequest) -> Result<Admission, XactError> {
        let result = self
            .validate(req)
            .and_then(|dp| self.registry.renew(req, |prev| self.create_or_reuse(prev, req, dp)));

        match &result {
            Ok(Admission::New(x)) => {
                metrics::record_admission("new");
                tracing::info!(xact = %x, phase = %req.phase, "Admitted new job");
            }
            Ok(Admission::Reused(x)) => {
                metrics::record_admission("reused");
                tracing::info!(xact = %x, phase = %req.phase, "Admitted, reusing running job");
            }
            Err(e) => {
                metrics::record_admission("rejected");
                tracing::warn!(xact_id = %req.id, error = %e, "Admission rejected");
            }
        }
        result
    }

    fn create_or_reuse(
        &self,
        prev: Option<&Arc<XactTcb>>,
        req: &AdmissionRequest,
        dp: Option<Arc<dyn Transform>>,
    ) -> Result<Admission, XactError> {
        if let Some(prev) = prev {
            when_prev_is_running(prev, req)?;
            return Ok(Admission::Reused(Arc::clone(prev)));
        }
        let tcb = XactTcb::new(Arc::clone(&self.target), req, dp);
        tcb.start()?;
        Ok(Admission::New(tcb))
    }

    /// Check the request and resolve its transform.
    fn validate(&self, req: &AdmissionRequest) -> Result<Option<Arc<dyn Transform>>, XactError> {
        if req.from.equal(&req.to, false, false) {
            return Err(XactError::Invalid(format!(
                "source and destination are the same bucket: {}",
                req.from
            )));
        }
        match (req.kind, &req.transform) {
            (XactKind::CopyBucket, None) => Ok(None),
            (XactKind::CopyBucket, Some(_)) => Err(XactError::Invalid(
                "copy_bucket does not take a transform".to_string(),
            )),
            (XactKind::EtlBucket, None) => Err(XactError::Invalid(
                "etl_bucket requires a transform".to_string(),
            )),
            (XactKind::EtlBucket, Some(spec)) => self
                .target
                .transform(&spec.name)
                .map(Some)
                .ok_or_else(|| XactError::Invalid(format!("unknown transform {}", spec.name))),
        }
    }
}
