// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Per-target job registry
//!
//! Tracks the current job of every (source, destination) bucket pair and
//! keeps jobs for status queries. Unfinished jobs are always kept; finished
//! ones are evicted oldest first beyond the retention limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use bucket_copy_types::{AdmissionRequest, BucketRef, XactId};

use crate::error::XactError;
use crate::tcb::XactTcb;
use crate::tcb::factory::Admission;
use crate::xact::Xact;

/// Default number of finished jobs kept for status queries
pub const DEFAULT_MAX_FINISHED_JOBS: usize = 1024;

type PairKey = (String, String);

fn pair_key(from: &BucketRef, to: &BucketRef) -> PairKey {
    (from.uname(), to.uname())
}

#[derive(Default)]
struct Inner {
    by_pair: HashMap<PairKey, Arc<XactTcb>>,
    by_id: HashMap<XactId, Arc<XactTcb>>,
    /// Job IDs in admission order
    order: VecDeque<XactId>,
}

impl Inner {
    /// Drop the oldest finished jobs until at most `keep` remain.
    fn evict_finished(&mut self, keep: usize) {
        let Inner {
            by_pair,
            by_id,
            order,
        } = self;
        let finished = by_id.values().filter(|x| x.is_finished()).count();
        let mut excess = finished.saturating_sub(keep);
        if excess == 0 {
            return;
        }
        order.retain(|id| {
            if excess == 0 {
                return true;
            }
            let Some(x) = by_id.get(id).filter(|x| x.is_finished()) else {
                return true;
            };
            let key = pair_key(x.from(), x.to());
            if by_pair.get(&key).is_some_and(|cur| Arc::ptr_eq(cur, x)) {
                by_pair.remove(&key);
            }
            tracing::debug!(xact = %x, "Evicting finished job");
            by_id.remove(id);
            excess -= 1;
            false
        });
    }
}

pub struct Registry {
    inner: Mutex<Inner>,
    max_finished: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_MAX_FINISHED_JOBS)
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that keeps at most `max_finished` finished jobs
    pub fn with_retention(max_finished: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_finished,
        }
    }

    /// Admit `req` under the registry lock.
    ///
    /// `f` sees the unfinished job for the request's bucket pair, if any. A
    /// newly created job it returns becomes the pair's current job.
    ///
    /// A request whose ID already names another job, running or finished,
    /// is rejected unless it continues the pair's current job.
    pub fn renew<F>(&self, req: &AdmissionRequest, f: F) -> Result<Admission, XactError>
    where
        F: FnOnce(Option<&Arc<XactTcb>>) -> Result<Admission, XactError>,
    {
        let key = pair_key(&req.from, &req.to);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let prev = inner.by_pair.get(&key).filter(|x| !x.is_finished());
        if let Some(existing) = inner.by_id.get(&req.id) {
            let continues_prev = prev.is_some_and(|p| Arc::ptr_eq(p, existing));
            if !continues_prev {
                return Err(XactError::DuplicateId {
                    id: req.id.clone(),
                    existing: existing.name().to_string(),
                });
            }
        }
        let admission = f(prev)?;

        if let Admission::New(x) = &admission {
            inner.by_pair.insert(key, Arc::clone(x));
            inner.by_id.insert(x.id().to_string(), Arc::clone(x));
            inner.order.push_back(x.id().to_string());
            inner.evict_finished(self.max_finished);
        }
        Ok(admission)
    }

    pub fn get(&self, id: &str) -> Option<Arc<XactTcb>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(id)
            .cloned()
    }

    /// The unfinished job for a bucket pair
    pub fn running(&self, from: &BucketRef, to: &BucketRef) -> Option<Arc<XactTcb>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_pair
            .get(&pair_key(from, to))
            .filter(|x| !x.is_finished())
            .cloned()
    }

    /// All known jobs, ordered by ID
    pub fn list(&self) -> Vec<Arc<XactTcb>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = inner.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }
}
