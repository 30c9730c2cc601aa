// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

// Allow expect/unwrap in tests - they provide clear panic messages on failure
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Integration tests for bucket copy jobs
//!
//! Every test builds one or more targets, each with its own data directory,
//! connected through an in-process network.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;

use bucket_copy_agent::cluster::{
    CapStatus, CapacityError, CapacityMonitor, ClusterMap, Lom, StaticClusterMap,
};
use bucket_copy_agent::config::AgentConfig;
use bucket_copy_agent::context::ApiContext;
use bucket_copy_agent::error::XactError;
use bucket_copy_agent::fs_store::FsStore;
use bucket_copy_agent::store::{ObjectStore, StoreError, Transform};
use bucket_copy_agent::target::Target;
use bucket_copy_agent::transport::loopback::LoopbackNetwork;
use bucket_copy_agent::xact::Xact;
use bucket_copy_types::{
    AdmissionRequest, BucketRef, CopyBckMsg, ErrorKind, Phase, Provider, TransformSpec,
    XactKind, XactSnapshot, XactState,
};

struct Node {
    ctx: ApiContext,
    fs: Arc<FsStore>,
    _dir: TempDir,
}

fn config(dir: &TempDir, node_id: &str) -> AgentConfig {
    AgentConfig {
        data_dir: dir.path().to_path_buf(),
        node_id: node_id.to_string(),
        max_keepalive: Duration::from_millis(50),
        send_file_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Build one target per ID on a shared network.
async fn cluster(
    ids: &[&str],
    tweak: impl Fn(&mut AgentConfig),
    transforms: Vec<Arc<dyn Transform>>,
) -> (Vec<Node>, Arc<LoopbackNetwork>) {
    let net = LoopbackNetwork::new();
    let smap: Arc<dyn ClusterMap> = Arc::new(StaticClusterMap::new(ids.iter().copied()));
    let mut nodes = Vec::new();
    for id in ids {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, id);
        tweak(&mut cfg);
        let fs = Arc::new(FsStore::open(&cfg, Arc::clone(&smap)).await.unwrap());
        let mut target = Target::new(
            cfg,
            fs.clone(),
            fs.clone(),
            Arc::clone(&smap),
            net.join(*id),
        );
        for dp in &transforms {
            target.register_transform(Arc::clone(dp));
        }
        nodes.push(Node {
            ctx: ApiContext::with_target(Arc::new(target)),
            fs,
            _dir: dir,
        });
    }
    (nodes, net)
}

fn request(id: &str, phase: Phase) -> AdmissionRequest {
    AdmissionRequest {
        id: id.to_string(),
        kind: XactKind::CopyBucket,
        from: BucketRef::new("src", 1),
        to: BucketRef::new("dst", 2),
        msg: CopyBckMsg::default(),
        transform: None,
        phase,
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Admit `req` on every node as `begin`, then as `commit`, and wait for
/// every node to finish.
async fn run_everywhere(nodes: &[Node], req: &AdmissionRequest) -> Vec<XactSnapshot> {
    for node in nodes {
        let mut begin = req.clone();
        begin.phase = Phase::Begin;
        let resp = node.ctx.admit(begin).unwrap();
        assert!(!resp.reused);
    }
    for node in nodes {
        let mut commit = req.clone();
        commit.phase = Phase::Commit;
        let resp = node.ctx.admit(commit).unwrap();
        assert!(resp.reused);
    }
    let mut snaps = Vec::new();
    for node in nodes {
        let xact = node.ctx.xact(&req.id).unwrap();
        tokio::time::timeout(Duration::from_secs(30), xact.wait_finished())
            .await
            .unwrap();
        snaps.push(xact.snapshot());
    }
    snaps
}

#[tokio::test]
async fn test_single_node_copy() {
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![]).await;
    let node = &nodes[0];
    let src = BucketRef::new("src", 1);
    for (name, size) in [("a", 10), ("b", 20), ("c", 30)] {
        node.fs.put_bytes(&src, name, vec![1u8; size]).await.unwrap();
    }

    let snaps = run_everywhere(&nodes, &request(&new_id(), Phase::Commit)).await;
    let snap = &snaps[0];
    assert_eq!(snap.state, XactState::Finished);
    assert_eq!(snap.phase, Phase::Commit);
    assert_eq!(snap.objects, 3);
    assert_eq!(snap.bytes, 60);
    assert!(snap.error.is_none());
    assert!(snap.start_time.is_some());
    assert!(snap.end_time.is_some());

    let dst = BucketRef::new("dst", 2);
    for (name, size) in [("a", 10), ("b", 20), ("c", 30)] {
        let data = node.fs.read_object(&dst, name).await.unwrap();
        assert_eq!(data.len(), size);
    }
}

#[tokio::test]
async fn test_commit_without_begin_runs() {
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![]).await;
    let node = &nodes[0];
    node.fs
        .put_bytes(&BucketRef::new("src", 1), "only", "payload")
        .await
        .unwrap();

    let id = new_id();
    let resp = node.ctx.admit(request(&id, Phase::Commit)).unwrap();
    assert!(!resp.reused);

    let xact = node.ctx.xact(&id).unwrap();
    assert_eq!(xact.wait_finished().await, XactState::Finished);
    assert_eq!(xact.snapshot().objects, 1);
}

#[tokio::test]
async fn test_three_nodes_distribute_by_hrw() {
    let ids = ["t1", "t2", "t3"];
    let (nodes, _net) = cluster(&ids, |_| {}, vec![]).await;
    let src = BucketRef::new("src", 1);
    let dst = BucketRef::new("dst", 2);

    // Each target holds its own shard of the source bucket
    let mut total_bytes = 0u64;
    let mut names = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        for j in 0..8 {
            let name = format!("shard-{}/obj-{}", i, j);
            let data = vec![b'x'; 100 + j];
            total_bytes += data.len() as u64;
            node.fs.put_bytes(&src, &name, data).await.unwrap();
            names.push((name, 100 + j));
        }
    }

    let snaps = run_everywhere(&nodes, &request(&new_id(), Phase::Commit)).await;
    for snap in &snaps {
        assert_eq!(snap.state, XactState::Finished, "{:?}", snap.error);
        assert!(snap.error.is_none());
        assert_eq!(snap.objects, 8);
    }
    assert_eq!(snaps.iter().map(|s| s.bytes).sum::<u64>(), total_bytes);

    // Every destination object lives on its owner and nowhere else
    let smap = StaticClusterMap::new(ids);
    for (name, size) in &names {
        let uname = Lom::init(&dst, name).unwrap().uname();
        let owner = smap.hrw_target(&uname).unwrap();
        for (id, node) in ids.iter().zip(&nodes) {
            let found = node.fs.read_object(&dst, name).await;
            if *id == owner {
                assert_eq!(found.unwrap().len(), *size, "{} on {}", name, id);
            } else {
                assert!(matches!(found, Err(StoreError::NotFound(_))), "{} on {}", name, id);
            }
        }
    }

    for node in &nodes {
        let xact = node.ctx.registry().list().pop().unwrap();
        assert_eq!(xact.pending_peers(), 0);
        assert!(!xact.is_open());
    }
}

#[tokio::test]
async fn test_quiesce_timeout_when_peer_never_commits() {
    let (nodes, _net) = cluster(
        &["t1", "t2"],
        |cfg| cfg.send_file_timeout = Duration::from_millis(400),
        vec![],
    )
    .await;
    nodes[0]
        .fs
        .put_bytes(&BucketRef::new("src", 1), "a", "abc")
        .await
        .unwrap();

    let id = new_id();
    nodes[0].ctx.admit(request(&id, Phase::Begin)).unwrap();
    nodes[1].ctx.admit(request(&id, Phase::Begin)).unwrap();
    nodes[0].ctx.admit(request(&id, Phase::Commit)).unwrap();

    let xact = nodes[0].ctx.xact(&id).unwrap();
    let state = tokio::time::timeout(Duration::from_secs(10), xact.wait_finished())
        .await
        .unwrap();
    assert_eq!(state, XactState::Finished);

    let snap = xact.snapshot();
    let err = snap.error.unwrap();
    assert_eq!(err.kind, ErrorKind::QuiesceTimeout);
    assert_eq!(snap.objects, 1);
    assert_eq!(xact.pending_peers(), 1);

    // The idle peer is still waiting for its commit
    let peer = nodes[1].ctx.xact(&id).unwrap();
    assert!(!peer.is_finished());
    assert!(nodes[1].ctx.abort(&id).unwrap());
    assert_eq!(peer.wait_finished().await, XactState::Aborted);
}

/// Capacity monitor that reports out-of-space from the given call onward
struct FailingCapacity {
    calls: AtomicUsize,
    fail_at: usize,
}

impl CapacityMonitor for FailingCapacity {
    fn status(&self) -> CapStatus {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let err = (n >= self.fail_at).then_some(CapacityError::OutOfSpace {
            used: 99,
            quota: 100,
            pct: 99,
            oos_pct: 95,
        });
        CapStatus {
            used: 99,
            quota: 100,
            throttle: err.is_some(),
            err,
        }
    }
}

#[tokio::test]
async fn test_capacity_error_aborts_between_objects() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, "t1");
    let smap: Arc<dyn ClusterMap> = Arc::new(StaticClusterMap::new(["t1"]));
    let fs = Arc::new(FsStore::open(&cfg, Arc::clone(&smap)).await.unwrap());
    let capacity = Arc::new(FailingCapacity {
        calls: AtomicUsize::new(0),
        fail_at: 2,
    });
    let net = LoopbackNetwork::new();
    let target = Target::new(cfg, fs.clone(), capacity, smap, net.join("t1"));
    let ctx = ApiContext::with_target(Arc::new(target));

    let src = BucketRef::new("src", 1);
    for i in 0..3 {
        fs.put_bytes(&src, &format!("obj-{}", i), vec![0u8; 10])
            .await
            .unwrap();
    }

    let id = new_id();
    ctx.admit(request(&id, Phase::Commit)).unwrap();
    let xact = ctx.xact(&id).unwrap();
    assert_eq!(xact.wait_finished().await, XactState::Aborted);

    let snap = xact.snapshot();
    assert_eq!(snap.objects, 2);
    assert_eq!(snap.bytes, 20);
    let err = snap.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Aborted);
    assert!(err.message.contains("capacity"), "{}", err.message);
}

#[tokio::test]
async fn test_out_of_space_aborts() {
    let (nodes, _net) = cluster(&["t1"], |cfg| cfg.capacity_bytes = 100, vec![]).await;
    let node = &nodes[0];
    let src = BucketRef::new("src", 1);
    node.fs.put_bytes(&src, "a", vec![0u8; 40]).await.unwrap();
    node.fs.put_bytes(&src, "b", vec![0u8; 40]).await.unwrap();

    let snaps = run_everywhere(&nodes, &request(&new_id(), Phase::Commit)).await;
    assert_eq!(snaps[0].state, XactState::Aborted);
    assert_eq!(snaps[0].error.as_ref().unwrap().kind, ErrorKind::Aborted);
    assert_eq!(snaps[0].objects, 0);
}

/// Uppercases object data
struct Upper;

#[async_trait]
impl Transform for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    async fn transform(&self, _lom: &Lom, data: Bytes) -> Result<Bytes, StoreError> {
        Ok(Bytes::from(data.to_ascii_uppercase()))
    }
}

#[tokio::test]
async fn test_transform_job() {
    let dp: Arc<dyn Transform> = Arc::new(Upper);
    let (nodes, _net) = cluster(&["t1", "t2"], |_| {}, vec![dp]).await;
    let src = BucketRef::new("src", 1);
    let dst = BucketRef::new("dst", 2);
    let mut expected = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        for j in 0..4 {
            let name = format!("n{}-{}.txt", i, j);
            node.fs.put_bytes(&src, &name, "hello world").await.unwrap();
            expected.push(name);
        }
    }

    let mut req = request(&new_id(), Phase::Commit);
    req.kind = XactKind::EtlBucket;
    req.transform = Some(TransformSpec {
        name: "upper".to_string(),
    });
    let snaps = run_everywhere(&nodes, &req).await;

    for snap in &snaps {
        assert_eq!(snap.state, XactState::Finished, "{:?}", snap.error);
        assert_eq!(snap.kind, XactKind::EtlBucket);
        assert_eq!(snap.objects, 4);
        // Transformed sizes are unknown, so source sizes are counted
        assert_eq!(snap.bytes, 4 * 11);
    }

    for name in &expected {
        let mut found = 0;
        for node in &nodes {
            if let Ok(data) = node.fs.read_object(&dst, name).await {
                assert_eq!(&data[..], b"HELLO WORLD");
                found += 1;
            }
        }
        assert_eq!(found, 1, "{}", name);
    }
}

#[tokio::test]
async fn test_prefix_prepend_and_dry_run() {
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![]).await;
    let node = &nodes[0];
    let src = BucketRef::new("src", 1);
    let dst = BucketRef::new("dst", 2);
    for name in ["logs/a", "logs/b", "img/c"] {
        node.fs.put_bytes(&src, name, "12345").await.unwrap();
    }

    // Dry run visits and counts without writing
    let mut dry = request(&new_id(), Phase::Commit);
    dry.msg = CopyBckMsg {
        prepend: String::new(),
        prefix: None,
        dry_run: true,
    };
    let snaps = run_everywhere(&nodes, &dry).await;
    assert_eq!(snaps[0].objects, 3);
    assert_eq!(snaps[0].bytes, 15);
    assert!(node.fs.list_local(&dst, None).await.unwrap().is_empty());

    let mut req = request(&new_id(), Phase::Commit);
    req.msg = CopyBckMsg {
        prepend: "copy-".to_string(),
        prefix: Some("logs/".to_string()),
        dry_run: false,
    };
    let snaps = run_everywhere(&nodes, &req).await;
    assert_eq!(snaps[0].objects, 2);

    let names: Vec<String> = node
        .fs
        .list_local(&dst, None)
        .await
        .unwrap()
        .into_iter()
        .map(|lom| lom.obj_name)
        .collect();
    assert_eq!(names, vec!["copy-logs/a", "copy-logs/b"]);
}

#[tokio::test]
async fn test_destination_with_backend_is_mirrored() {
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![]).await;
    let node = &nodes[0];
    node.fs
        .put_bytes(&BucketRef::new("src", 1), "a", "mirror me")
        .await
        .unwrap();

    let mut req = request(&new_id(), Phase::Commit);
    req.to = BucketRef::new("dst", 2).with_backend(Provider::Aws, "remote");
    let snaps = run_everywhere(&nodes, &req).await;
    assert_eq!(snaps[0].state, XactState::Finished);

    let cloud = node.fs.cloud_path(&req.to, "a").unwrap();
    assert_eq!(std::fs::read(cloud).unwrap(), b"mirror me");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_begin_admits_one() {
    let (nodes, _net) = cluster(&["t1", "t2"], |_| {}, vec![]).await;
    let ctx = Arc::new(nodes.into_iter().next().unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let node = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            let id = new_id();
            node.ctx.admit(request(&id, Phase::Begin)).map(|_| id)
        }));
    }

    let mut admitted = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(id) => admitted.push(id),
            Err(e) => {
                assert!(matches!(e, XactError::Conflict { .. }), "{}", e);
                conflicts += 1;
            }
        }
    }
    assert_eq!(admitted.len(), 1);
    assert_eq!(conflicts, 7);
    assert_eq!(ctx.ctx.list().len(), 1);

    assert_eq!(ctx.ctx.abort(&admitted[0]), Some(true));
    assert_eq!(ctx.ctx.abort(&admitted[0]), Some(false));
    assert_eq!(ctx.ctx.abort("unknown"), None);
}

/// Transform that takes a while per object
struct Slow;

#[async_trait]
impl Transform for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn transform(&self, _lom: &Lom, data: Bytes) -> Result<Bytes, StoreError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(data)
    }
}

#[tokio::test]
async fn test_abort_running_job() {
    let dp: Arc<dyn Transform> = Arc::new(Slow);
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![dp]).await;
    let node = &nodes[0];
    let src = BucketRef::new("src", 1);
    for i in 0..20 {
        node.fs
            .put_bytes(&src, &format!("obj-{:02}", i), "data")
            .await
            .unwrap();
    }

    let id = new_id();
    let mut req = request(&id, Phase::Commit);
    req.kind = XactKind::EtlBucket;
    req.transform = Some(TransformSpec {
        name: "slow".to_string(),
    });
    node.ctx.admit(req).unwrap();

    let xact = node.ctx.xact(&id).unwrap();
    xact.wait_running().await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(node.ctx.abort(&id), Some(true));

    assert_eq!(xact.wait_finished().await, XactState::Aborted);
    let snap = xact.snapshot();
    assert!(snap.objects < 20, "copied {}", snap.objects);
    assert_eq!(snap.error.unwrap().kind, ErrorKind::Aborted);
}

/// Transform that rejects every object
struct Broken;

#[async_trait]
impl Transform for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn transform(&self, lom: &Lom, _data: Bytes) -> Result<Bytes, StoreError> {
        Err(StoreError::Transform {
            name: self.name().to_string(),
            message: format!("cannot process {}", lom.obj_name),
        })
    }
}

#[tokio::test]
async fn test_transform_failure_is_reported() {
    let dp: Arc<dyn Transform> = Arc::new(Broken);
    let (nodes, _net) = cluster(&["t1"], |_| {}, vec![dp]).await;
    let node = &nodes[0];
    node.fs
        .put_bytes(&BucketRef::new("src", 1), "a", "data")
        .await
        .unwrap();

    let mut req = request(&new_id(), Phase::Commit);
    req.kind = XactKind::EtlBucket;
    req.transform = Some(TransformSpec {
        name: "broken".to_string(),
    });
    let snaps = run_everywhere(&nodes, &req).await;

    assert_eq!(snaps[0].state, XactState::Finished);
    assert_eq!(snaps[0].objects, 0);
    let err = snaps[0].error.as_ref().unwrap();
    assert_eq!(err.kind, ErrorKind::Copy);
    assert!(err.message.contains("cannot process a"), "{}", err.message);
}

/// Fails object "a" quickly while object "b" takes a while
struct FailFirst;

#[async_trait]
impl Transform for FailFirst {
    fn name(&self) -> &str {
        "fail-first"
    }

    async fn transform(&self, lom: &Lom, data: Bytes) -> Result<Bytes, StoreError> {
        match lom.obj_name.as_str() {
            "a" => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(StoreError::Transform {
                    name: self.name().to_string(),
                    message: "cannot process a".to_string(),
                })
            }
            "b" => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(data)
            }
            _ => Ok(data),
        }
    }
}

#[tokio::test]
async fn test_failure_lets_inflight_copy_finish() {
    let dp: Arc<dyn Transform> = Arc::new(FailFirst);
    let (nodes, _net) = cluster(&["t1"], |cfg| cfg.etl_parallel = 2, vec![dp]).await;
    let node = &nodes[0];
    let src = BucketRef::new("src", 1);
    let dst = BucketRef::new("dst", 2);
    for name in ["a", "b", "c"] {
        node.fs.put_bytes(&src, name, "data").await.unwrap();
    }

    let mut req = request(&new_id(), Phase::Commit);
    req.kind = XactKind::EtlBucket;
    req.transform = Some(TransformSpec {
        name: "fail-first".to_string(),
    });
    let snaps = run_everywhere(&nodes, &req).await;

    // "b" was already running when "a" failed; "c" never started
    let snap = &snaps[0];
    assert_eq!(snap.state, XactState::Finished);
    assert_eq!(snap.objects, 1);
    assert_eq!(snap.bytes, 4);
    assert_eq!(snap.error.as_ref().unwrap().kind, ErrorKind::Copy);
    assert_eq!(&node.fs.read_object(&dst, "b").await.unwrap()[..], b"data");
    assert!(matches!(
        node.fs.read_object(&dst, "a").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        node.fs.read_object(&dst, "c").await,
        Err(StoreError::NotFound(_))
    ));
}
