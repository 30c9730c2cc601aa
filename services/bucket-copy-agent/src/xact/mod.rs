// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Generic job bookkeeping
//!
//! [`XactBase`] holds what every job kind shares: identity, counters,
//! lifecycle state, the abort token and start/end times. Concrete jobs own
//! one and implement [`Xact`] by delegating to it.

pub mod errcell;
pub mod quiesce;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bucket_copy_types::{
    BucketRef, Phase, XactErrorInfo, XactId, XactKind, XactSnapshot, XactState,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::XactError;

/// Bookkeeping shared by all job kinds
pub struct XactBase {
    id: XactId,
    kind: XactKind,
    from: BucketRef,
    to: BucketRef,
    name: String,
    objects: AtomicU64,
    bytes: AtomicU64,
    state: watch::Sender<XactState>,
    abort: CancellationToken,
    finished: AtomicBool,
    times: Mutex<Times>,
}

#[derive(Default)]
struct Times {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    err: Option<XactErrorInfo>,
}

impl XactBase {
    pub fn new(id: XactId, kind: XactKind, from: BucketRef, to: BucketRef) -> Self {
        let name = format!("{}[{}] <= {}", kind, id, from);
        let (state, _) = watch::channel(XactState::Created);
        Self {
            id,
            kind,
            from,
            to,
            name,
            objects: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            state,
            abort: CancellationToken::new(),
            finished: AtomicBool::new(false),
            times: Mutex::new(Times::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> XactKind {
        self.kind
    }

    pub fn from(&self) -> &BucketRef {
        &self.from
    }

    pub fn to(&self) -> &BucketRef {
        &self.to
    }

    /// `<kind>[<id>] <= <source bucket>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Account for `objs` copied objects totalling `bytes`.
    pub fn objs_add(&self, objs: u64, bytes: u64) {
        self.objects.fetch_add(objs, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> XactState {
        *self.state.borrow()
    }

    /// Move to a non-terminal state. Ignored once the job has finished.
    pub fn set_state(&self, state: XactState) {
        if self.is_finished() {
            return;
        }
        if state == XactState::Running {
            self.times
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .start
                .get_or_insert_with(Utc::now);
        }
        self.state.send_replace(state);
    }

    /// Request an abort. Returns false if the job already finished.
    pub fn abort(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.abort.cancel();
        true
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Finish the job with its terminal error, if any. Only the first call
    /// has an effect; returns whether this call finished the job.
    pub fn finish(&self, err: Option<&XactError>) -> bool {
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        let state = match err {
            Some(e) if e.is_aborted() => XactState::Aborted,
            _ => XactState::Finished,
        };
        {
            let mut times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
            times.end = Some(Utc::now());
            times.err = err.map(XactError::info);
        }
        self.state.send_replace(state);

        match err {
            Some(e) => tracing::info!(
                xact = %self.name,
                objects = self.objects(),
                bytes = self.bytes(),
                error = %e,
                "Job finished with error"
            ),
            None => tracing::info!(
                xact = %self.name,
                objects = self.objects(),
                bytes = self.bytes(),
                "Job finished"
            ),
        }
        true
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_finished(&self) -> XactState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this is unreachable while we
            // hold `&self`.
            Err(_) => self.state(),
        }
    }

    pub fn snapshot(&self, phase: Phase) -> XactSnapshot {
        let times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
        XactSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            from: self.from.clone(),
            to: self.to.clone(),
            phase,
            state: self.state(),
            objects: self.objects(),
            bytes: self.bytes(),
            error: times.err.clone(),
            start_time: times.start,
            end_time: times.end,
        }
    }
}

/// What a supervisor needs from a job: status, abort, and completion.
#[async_trait::async_trait]
pub trait Xact: Send + Sync {
    fn base(&self) -> &XactBase;

    /// Current admission phase
    fn phase(&self) -> Phase;

    fn id(&self) -> &str {
        self.base().id()
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn snapshot(&self) -> XactSnapshot {
        self.base().snapshot(self.phase())
    }

    fn is_finished(&self) -> bool {
        self.base().is_finished()
    }

    /// Request an external abort.
    fn abort(&self) -> bool {
        self.base().abort()
    }

    async fn wait_finished(&self) -> XactState {
        self.base().wait_finished().await
    }
}
