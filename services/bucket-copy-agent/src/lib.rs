// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bucket Copy Agent Library
//!
//! This library provides the core functionality for the bucket copy agent
//! service. The agent runs on every storage target and executes bucket
//! copy and transform jobs: each target copies its local shard of the
//! source bucket, sends objects owned by other targets to them, persists
//! objects sent by its peers, and waits for every peer to report completion.
//!
//! # Modules
//!
//! - [`config`] - Agent configuration
//! - [`context`] - API context for request handlers
//! - [`tcb`] - The bucket copy job and its admission
//! - [`xact`] - Generic job bookkeeping, first-error cell, quiescence
//! - [`transport`] - Node-to-node object transfer and the in-process network
//! - [`store`] / [`fs_store`] - Object store interface and filesystem store
//! - [`cluster`] - Object metadata, cluster map, capacity status
//! - [`registry`] - Per-target job registry
//! - [`metrics`] - Prometheus metrics

pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod fs_store;
pub mod memsys;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod target;
pub mod tcb;
pub mod transport;
pub mod xact;

use bucket_copy_api::{BucketCopyApi, XactPath};
use bucket_copy_types::{AdmissionRequest, AdmissionResponse, ErrorKind, XactSnapshot};
use dropshot::{
    ClientErrorStatusCode, HttpError, HttpResponseOk, HttpResponseUpdatedNoContent, Path,
    RequestContext, TypedBody,
};

use crate::context::ApiContext;
use crate::error::XactError;

/// Bucket Copy Agent API implementation
///
/// This enum serves as the implementation type for the `BucketCopyApi` trait.
/// It contains no data - all state is stored in the `ApiContext`.
pub enum BucketCopyAgentImpl {}

fn parse_uuid(uuid: &str) -> Result<(), HttpError> {
    uuid::Uuid::parse_str(uuid)
        .map(|_| ())
        .map_err(|_| HttpError::for_bad_request(None, format!("Invalid UUID format: {}", uuid)))
}

fn xact_http_error(e: XactError) -> HttpError {
    match e.kind() {
        ErrorKind::Conflict => HttpError::for_client_error(
            Some(e.kind().to_string()),
            ClientErrorStatusCode::CONFLICT,
            e.to_string(),
        ),
        ErrorKind::Invalid => HttpError::for_bad_request(Some(e.kind().to_string()), e.to_string()),
        _ => HttpError::for_internal_error(e.to_string()),
    }
}

impl BucketCopyApi for BucketCopyAgentImpl {
    type Context = ApiContext;

    async fn admit_xaction(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<AdmissionRequest>,
    ) -> Result<HttpResponseOk<AdmissionResponse>, HttpError> {
        let ctx = rqctx.context();
        let req = body.into_inner();

        parse_uuid(&req.id)?;

        tracing::info!(
            xact_id = %req.id,
            kind = %req.kind,
            phase = %req.phase,
            from = %req.from,
            to = %req.to,
            "Received admission request"
        );

        let resp = ctx.admit(req).map_err(xact_http_error)?;
        Ok(HttpResponseOk(resp))
    }

    async fn list_xactions(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<XactSnapshot>>, HttpError> {
        Ok(HttpResponseOk(rqctx.context().list()))
    }

    async fn get_xaction(
        rqctx: RequestContext<Self::Context>,
        path: Path<XactPath>,
    ) -> Result<HttpResponseOk<XactSnapshot>, HttpError> {
        let ctx = rqctx.context();
        let uuid = path.into_inner().uuid;

        parse_uuid(&uuid)?;

        let snapshot = ctx
            .get(&uuid)
            .ok_or_else(|| HttpError::for_not_found(None, format!("Job {} not found", uuid)))?;

        Ok(HttpResponseOk(snapshot))
    }

    async fn abort_xaction(
        rqctx: RequestContext<Self::Context>,
        path: Path<XactPath>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError> {
        let ctx = rqctx.context();
        let uuid = path.into_inner().uuid;

        parse_uuid(&uuid)?;

        let aborted = ctx
            .abort(&uuid)
            .ok_or_else(|| HttpError::for_not_found(None, format!("Job {} not found", uuid)))?;

        if aborted {
            tracing::info!(xact_id = %uuid, "Abort requested");
        } else {
            tracing::debug!(xact_id = %uuid, "Abort of finished job ignored");
        }
        Ok(HttpResponseUpdatedNoContent())
    }
}
