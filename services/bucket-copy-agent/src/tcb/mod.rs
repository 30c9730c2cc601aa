// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Bucket copy/transform job
//!
//! An [`XactTcb`] copies every local object of the source bucket to the
//! destination bucket, optionally through a transform. Objects owned by
//! another target are sent there over the job's [`DataMover`]; objects sent
//! by peers are persisted by the job's receive handler.
//!
//! Lifecycle:
//!
//! 1. [`XactTcb::start`] registers the receiver, sizes the peer count and
//!    opens the data mover. Peers may send from this point on.
//! 2. [`XactTcb::run`] walks the local shard with bounded parallelism,
//!    broadcasts the end-of-stream marker, waits for every peer's marker,
//!    then closes the data mover and finishes.
//! 3. [`XactTcb::txn_abort`] tears down a job that was started but never
//!    ran.

pub mod factory;
pub mod params;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bucket_copy_types::{
    AdmissionRequest, BucketRef, CopyBckMsg, ErrorKind, Phase, XactKind, XactState,
};
use futures_util::StreamExt;
use tokio::sync::watch;

use crate::cluster::Lom;
use crate::error::XactError;
use crate::memsys::SlabBuf;
use crate::metrics;
use crate::store::{PutObjectParams, RecvType, Transform, WorkTag};
use crate::target::Target;
use crate::transport::bundle::DataMover;
use crate::transport::{Message, ObjHdr, ObjReceiver, Payload, TransportError};
use crate::xact::errcell::ErrCell;
use crate::xact::quiesce::{PeerAcks, QuiRes};
use crate::xact::{Xact, XactBase};

use self::params::CopyParamsPool;

/// Transport endpoint name of a job
pub fn trname(id: &str) -> String {
    format!("transcpy_{}", id)
}

pub struct XactTcb {
    base: XactBase,
    msg: CopyBckMsg,
    dp: Option<Arc<dyn Transform>>,
    phase: Mutex<Phase>,
    target: Arc<Target>,
    dm: Arc<DataMover>,
    refc: PeerAcks,
    err: ErrCell,
    started: watch::Sender<bool>,
    run_claimed: AtomicBool,
    buf: Mutex<Option<SlabBuf>>,
    params: CopyParamsPool,
    parallel: usize,
}

impl std::fmt::Debug for XactTcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XactTcb").field("id", &self.base.id()).finish_non_exhaustive()
    }
}

impl XactTcb {
    /// Create a job for an admission request. Nothing is registered until
    /// [`XactTcb::start`].
    pub fn new(
        target: Arc<Target>,
        req: &AdmissionRequest,
        dp: Option<Arc<dyn Transform>>,
    ) -> Arc<Self> {
        let dm = Arc::new(DataMover::new(
            trname(&req.id),
            Arc::clone(&target.transport),
            Arc::clone(&target.smap),
        ));
        let parallel = match req.kind {
            XactKind::CopyBucket => 1,
            XactKind::EtlBucket => target.config.etl_parallel.max(1),
        };
        let (started, _) = watch::channel(false);

        Arc::new(Self {
            base: XactBase::new(req.id.clone(), req.kind, req.from.clone(), req.to.clone()),
            msg: req.msg.clone(),
            dp,
            phase: Mutex::new(req.phase),
            target,
            dm,
            refc: PeerAcks::new(0),
            err: ErrCell::new(),
            started,
            run_claimed: AtomicBool::new(false),
            buf: Mutex::new(None),
            params: CopyParamsPool::new(),
            parallel,
        })
    }

    /// Prepare the job: take a scratch buffer, size the peer count from the
    /// current cluster map, register the receiver and open the data mover.
    pub fn start(self: &Arc<Self>) -> Result<(), XactError> {
        *self.buf.lock().unwrap_or_else(PoisonError::into_inner) = Some(self.target.slab.alloc());

        let peers = self.target.smap.count_targets().saturating_sub(1);
        self.refc.set(i32::try_from(peers).unwrap_or(i32::MAX));

        self.dm.set_owner(self.base.name());
        let recv: Arc<dyn ObjReceiver> = Arc::clone(self) as Arc<dyn ObjReceiver>;
        if let Err(source) = self.dm.reg_recv(recv) {
            self.fire_started();
            return Err(XactError::Transport {
                xact: self.base.name().to_string(),
                source,
            });
        }
        self.dm.open();

        tracing::info!(
            xact = %self.base.name(),
            to = %self.base.to(),
            peers,
            parallel = self.parallel,
            "Job started"
        );
        Ok(())
    }

    /// Run the job to completion.
    ///
    /// Only the first call runs; later calls, and calls on a job that was
    /// aborted before it ran, return immediately.
    pub async fn run(self: Arc<Self>) {
        if self.run_claimed.swap(true, Ordering::SeqCst) || self.base.is_finished() {
            return;
        }
        let started = Instant::now();
        self.dm.open();
        self.base.set_state(XactState::Running);
        self.fire_started();
        tracing::info!(xact = %self.base.name(), "Job running");

        if let Err(e) = self.copy_shard().await {
            tracing::warn!(xact = %self.base.name(), error = %e, "Local copy stopped");
            self.err.store(e);
        }

        // Nothing more will be sent from here
        let done = Message::EndOfStream(self.target.node_id().to_string());
        if let Err(source) = self.dm.bcast(done).await {
            self.err.store(XactError::Transport {
                xact: self.base.name().to_string(),
                source,
            });
        }

        self.base.set_state(XactState::Finishing);
        let (optimal, max) = self.target.config.quiesce_timeouts();
        let res = self
            .refc
            .wait(optimal, max, self.base.abort_token(), |_| self.refc.probe())
            .await;
        match res {
            QuiRes::Quiesced => {
                tracing::debug!(xact = %self.base.name(), "All peers done");
            }
            QuiRes::Aborted => {
                self.err
                    .store(XactError::aborted(self.base.name(), "quiesce", None));
            }
            QuiRes::TimedOut => {
                let pending = self.refc.get();
                tracing::warn!(xact = %self.base.name(), pending, "Timed out waiting for peers");
                self.err.store(XactError::QuiesceTimeout {
                    xact: self.base.name().to_string(),
                    pending,
                });
            }
        }

        self.fin(Some(started.elapsed()));
    }

    /// Abort a job that has not started running.
    pub fn txn_abort(&self, cause: Option<&dyn fmt::Display>) {
        let err = XactError::aborted(self.base.name(), "txn-abort", cause);
        self.base.abort_token().cancel();
        self.err.store(err);
        self.fire_started();
        self.fin(None);
    }

    /// Wait until the job runs, or until it is known that it never will.
    pub async fn wait_running(&self) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started).await;
    }

    pub fn from(&self) -> &BucketRef {
        self.base.from()
    }

    pub fn to(&self) -> &BucketRef {
        self.base.to()
    }

    /// Move from `Begin` to `Commit`.
    pub fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Peers that have not reported completion
    pub fn pending_peers(&self) -> i32 {
        self.refc.get()
    }

    /// The job's first error, if any
    pub fn err(&self) -> Option<&XactError> {
        self.err.get()
    }

    /// True once the receiver is registered with the transport
    pub fn is_open(&self) -> bool {
        self.dm.is_open()
    }

    fn fire_started(&self) {
        let fired = self.started.send_if_modified(|started| {
            if *started {
                false
            } else {
                *started = true;
                true
            }
        });
        if fired {
            tracing::debug!(xact = %self.base.name(), "Startup complete");
        }
    }

    async fn copy_shard(self: &Arc<Self>) -> Result<(), XactError> {
        let loms = self
            .target
            .store
            .list_local(self.base.from(), self.msg.prefix.as_deref())
            .await
            .map_err(|source| XactError::Copy {
                xact: self.base.name().to_string(),
                obj: self.base.from().to_string(),
                source,
            })?;
        tracing::debug!(xact = %self.base.name(), objects = loms.len(), "Walking local shard");

        // The first failure stops new objects from starting; copies already
        // in flight run to completion and are counted.
        let first = ErrCell::new();
        futures_util::stream::iter(loms)
            .for_each_concurrent(self.parallel, |lom| {
                let first = &first;
                async move {
                    if first.is_set() {
                        return;
                    }
                    if self.base.is_abort_requested() {
                        first.store(XactError::aborted(self.base.name(), "abort", None));
                        return;
                    }
                    if let Err(e) = self.copy_object(lom).await {
                        first.store(e);
                    }
                }
            })
            .await;
        match first.into_inner() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn copy_object(&self, lom: Lom) -> Result<(), XactError> {
        let buf = self
            .buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.target.slab.alloc());

        let result = {
            let mut params = self.params.get();
            params.bck_to = Some(self.base.to().clone());
            params.obj_name_to = self.msg.to_name(&lom.obj_name);
            params.buf = Some(buf);
            params.dm = Some(Arc::clone(&self.dm));
            params.dp = self.dp.clone();
            params.dry_run = self.msg.dry_run;

            let result = self.target.store.copy_object(&lom, &mut params).await;
            if let Some(buf) = params.buf.take() {
                self.buf
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(buf);
            }
            result
        };

        match result {
            Ok(size) => {
                // Transformed size is not known here; count the source size
                let bytes = size.unwrap_or_else(|| lom.size_bytes());
                self.base.objs_add(1, bytes);
                metrics::record_object_copied(bytes);
            }
            Err(e) if e.is_oos() => {
                return Err(XactError::aborted(self.base.name(), "copy-obj", Some(&e)));
            }
            Err(source) => {
                return Err(XactError::Copy {
                    xact: self.base.name().to_string(),
                    obj: lom.to_string(),
                    source,
                });
            }
        }

        let cs = self.target.capacity.status();
        if let Some(err) = cs.err {
            return Err(XactError::aborted(self.base.name(), "capacity", Some(&err)));
        }
        if cs.throttle {
            tokio::time::sleep(self.target.config.throttle).await;
        }
        Ok(())
    }

    async fn persist(&self, hdr: ObjHdr, payload: &mut Payload) -> Result<(), XactError> {
        let persist_err = |source| XactError::Persist {
            xact: self.base.name().to_string(),
            obj: format!("{}/{}", hdr.bck, hdr.obj_name),
            source,
        };
        let mut lom = Lom::init(&hdr.bck, &hdr.obj_name).map_err(persist_err)?;
        // Trust the sender's data; the checksum is recomputed on write
        lom.copy_attrs(&hdr.attrs, true);
        self.target
            .store
            .put_object(
                &mut lom,
                PutObjectParams {
                    tag: WorkTag::WorkfilePut,
                    recv_type: RecvType::RegularPut,
                    reader: payload,
                },
            )
            .await
            .map_err(persist_err)
    }

    /// Close the data mover, release resources and finish with the first
    /// stored error.
    fn fin(&self, elapsed: Option<Duration>) {
        let err = self.err.get();
        if self.dm.is_open() {
            self.dm.close(err.map(|e| e as &dyn fmt::Display));
        }
        self.dm.unreg_recv();
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).take();

        if self.base.finish(err) {
            let outcome = match err.map(XactError::kind) {
                None => "ok",
                Some(ErrorKind::Aborted) => "aborted",
                Some(ErrorKind::QuiesceTimeout) => "timeout",
                Some(_) => "error",
            };
            metrics::record_job_finished(
                outcome,
                elapsed.unwrap_or_default().as_secs_f64(),
            );
        }
    }
}

async fn drain(payload: &mut Payload) {
    if let Err(e) = tokio::io::copy(payload, &mut tokio::io::sink()).await {
        tracing::debug!(error = %e, "Failed to drain payload");
    }
}

#[async_trait]
impl ObjReceiver for XactTcb {
    async fn recv(&self, msg: Message, mut payload: Payload, err: Option<TransportError>) {
        if let Some(e) = err.filter(|e| !e.is_eof()) {
            tracing::warn!(
                xact = %self.base.name(),
                sender = %msg.sender(),
                error = %e,
                "Dropping record after transport error"
            );
            metrics::record_dropped("transport");
            drain(&mut payload).await;
            return;
        }

        match msg {
            Message::EndOfStream(sender) => {
                let left = self.refc.dec();
                tracing::debug!(xact = %self.base.name(), sender = %sender, left, "Peer done");
                if left < 0 {
                    tracing::error!(
                        xact = %self.base.name(),
                        sender = %sender,
                        left,
                        "Peer count went negative"
                    );
                    metrics::record_protocol_violation();
                    debug_assert!(left >= 0, "{}: peer count went negative", self.base.name());
                }
            }
            Message::Data(hdr) => {
                if self.err.is_set() {
                    metrics::record_dropped("error_latched");
                } else {
                    match self.persist(hdr, &mut payload).await {
                        Ok(()) => metrics::record_object_received(),
                        Err(e) => {
                            tracing::error!(xact = %self.base.name(), error = %e, "Receive failed");
                            metrics::record_dropped("persist");
                            self.err.store(e);
                        }
                    }
                }
            }
        }
        drain(&mut payload).await;
    }
}

#[async_trait]
impl Xact for XactTcb {
    fn base(&self) -> &XactBase {
        &self.base
    }

    fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort a running job between objects or during quiescence; a job that
    /// has not started running is torn down right away.
    fn abort(&self) -> bool {
        if self.base.is_finished() {
            return false;
        }
        if self.run_claimed.load(Ordering::SeqCst) {
            tracing::info!(xact = %self.base.name(), "Abort requested");
            self.base.abort()
        } else {
            self.txn_abort(None);
            true
        }
    }
}

impl fmt::Display for XactTcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.name())
    }
}
