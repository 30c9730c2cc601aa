// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the bucket copy agent service.
//!
//! The agent runs on each storage target. A coordinator admits bucket copy
//! and transform jobs on every target in two phases (`begin`, then
//! `commit`); each target then copies its local shard of the source bucket
//! and exchanges objects with its peers.
//!
//! ## Endpoints
//!
//! - `POST /xactions` - Admit a job (begin or commit phase)
//! - `GET /xactions` - List jobs known to this target
//! - `GET /xactions/{uuid}` - Get job status
//! - `POST /xactions/{uuid}/abort` - Abort a job

use bucket_copy_types::{AdmissionRequest, AdmissionResponse, XactSnapshot};
use dropshot::{
    HttpError, HttpResponseOk, HttpResponseUpdatedNoContent, Path, RequestContext, TypedBody,
};
use schemars::JsonSchema;
use serde::Deserialize;

/// Path parameters for job-specific endpoints.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct XactPath {
    /// The job UUID
    pub uuid: String,
}

/// Bucket Copy Agent API
#[dropshot::api_description]
pub trait BucketCopyApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// Admit a job
    ///
    /// A `begin` request creates the job and registers its transfer
    /// endpoint without running it. A `commit` request for the same job ID
    /// starts it. A `commit` with no preceding `begin` creates and starts
    /// the job in one step.
    ///
    /// Returns 409 Conflict if another job is running for the same bucket
    /// pair, or if the phases arrive out of order.
    #[endpoint {
        method = POST,
        path = "/xactions",
        tags = ["xactions"],
    }]
    async fn admit_xaction(
        rqctx: RequestContext<Self::Context>,
        body: TypedBody<AdmissionRequest>,
    ) -> Result<HttpResponseOk<AdmissionResponse>, HttpError>;

    /// List jobs
    #[endpoint {
        method = GET,
        path = "/xactions",
        tags = ["xactions"],
    }]
    async fn list_xactions(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<Vec<XactSnapshot>>, HttpError>;

    /// Get job status
    ///
    /// Returns 404 if the job is not known to this target.
    /// Returns 400 if the UUID is malformed.
    #[endpoint {
        method = GET,
        path = "/xactions/{uuid}",
        tags = ["xactions"],
    }]
    async fn get_xaction(
        rqctx: RequestContext<Self::Context>,
        path: Path<XactPath>,
    ) -> Result<HttpResponseOk<XactSnapshot>, HttpError>;

    /// Abort a job
    ///
    /// A running job observes the abort between objects and while waiting
    /// for its peers. A job that was admitted but never started is torn
    /// down immediately. Aborting a finished job is a no-op.
    #[endpoint {
        method = POST,
        path = "/xactions/{uuid}/abort",
        tags = ["xactions"],
    }]
    async fn abort_xaction(
        rqctx: RequestContext<Self::Context>,
        path: Path<XactPath>,
    ) -> Result<HttpResponseUpdatedNoContent, HttpError>;
}
