// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Filesystem object store
//!
//! Objects live at `<objects>/<provider>/<bucket>/<name>`. Puts stream into
//! a workfile under `<work>` while computing the MD5 checksum, then rename
//! into place. A regular put into a bucket with a cloud backend is mirrored
//! under `<cloud>/<provider>/<backend bucket>/<name>`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bucket_copy_types::{BucketRef, NodeId};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::cluster::{CapStatus, CapacityError, CapacityMonitor, ClusterMap, Lom};
use crate::config::AgentConfig;
use crate::store::{
    CopyObjectParams, ObjectStore, PutObjectParams, RecvType, StoreError, WorkTag,
};
use crate::transport::{Message, ObjHdr, Payload, TransportError};

/// Read size used when no scratch buffer is supplied
const DEFAULT_READ_SIZE: usize = 64 * 1024;

pub struct FsStore {
    node_id: NodeId,
    objects_dir: PathBuf,
    work_dir: PathBuf,
    cloud_dir: PathBuf,
    smap: Arc<dyn ClusterMap>,
    quota: u64,
    high_wm_pct: u8,
    oos_pct: u8,
    used: AtomicU64,
}

impl FsStore {
    /// Open (creating if needed) the store under `config.data_dir`.
    pub async fn open(config: &AgentConfig, smap: Arc<dyn ClusterMap>) -> Result<Self, StoreError> {
        for dir in [config.objects_dir(), config.work_dir(), config.cloud_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;
        }
        let used = dir_size(&config.objects_dir()).await?;

        tracing::info!(
            node_id = %config.node_id,
            data_dir = %config.data_dir.display(),
            used_bytes = used,
            quota_bytes = config.capacity_bytes,
            "Opened object store"
        );

        Ok(Self {
            node_id: config.node_id.clone(),
            objects_dir: config.objects_dir(),
            work_dir: config.work_dir(),
            cloud_dir: config.cloud_dir(),
            smap,
            quota: config.capacity_bytes,
            high_wm_pct: config.capacity_high_wm_pct,
            oos_pct: config.capacity_oos_pct,
            used: AtomicU64::new(used),
        })
    }

    fn bucket_dir(&self, bck: &BucketRef) -> PathBuf {
        self.objects_dir
            .join(bck.provider.to_string())
            .join(&bck.name)
    }

    /// Path of a local object
    pub fn obj_path(&self, bck: &BucketRef, obj_name: &str) -> PathBuf {
        self.bucket_dir(bck).join(obj_name)
    }

    /// Path of the cloud mirror of an object, if its bucket has a backend
    pub fn cloud_path(&self, bck: &BucketRef, obj_name: &str) -> Option<PathBuf> {
        bck.backend.as_ref().map(|b| {
            self.cloud_dir
                .join(b.provider.to_string())
                .join(&b.name)
                .join(obj_name)
        })
    }

    /// Bytes currently stored
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Store `data` as a local object.
    pub async fn put_bytes(
        &self,
        bck: &BucketRef,
        obj_name: &str,
        data: impl Into<Bytes>,
    ) -> Result<Lom, StoreError> {
        let mut lom = Lom::init(bck, obj_name)?;
        let mut reader: Payload = Box::new(Cursor::new(data.into()));
        self.put_object(
            &mut lom,
            PutObjectParams {
                tag: WorkTag::Put,
                recv_type: RecvType::RegularPut,
                reader: &mut reader,
            },
        )
        .await?;
        Ok(lom)
    }

    /// Check that writing `written` bytes over an object of `old` bytes
    /// stays within the quota.
    fn reserve(&self, old: u64, written: u64) -> Result<(), StoreError> {
        let quota = self.quota;
        let result = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let new = used.saturating_sub(old).saturating_add(written);
                if quota > 0 && new > quota {
                    None
                } else {
                    Some(new)
                }
            });
        match result {
            Ok(_) => Ok(()),
            Err(used) => {
                let new = used.saturating_sub(old).saturating_add(written);
                Err(StoreError::OutOfSpace(CapacityError::OutOfSpace {
                    used: new,
                    quota,
                    pct: pct(new, quota),
                    oos_pct: self.oos_pct,
                }))
            }
        }
    }

    async fn mirror(&self, lom: &Lom, local: &Path) -> Result<(), StoreError> {
        let Some(cloud) = self.cloud_path(&lom.bck, &lom.obj_name) else {
            return Ok(());
        };
        if let Some(parent) = cloud.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
        }
        fs::copy(local, &cloud)
            .await
            .map_err(|e| StoreError::io(format!("mirror {} to cloud", lom), e))?;
        tracing::debug!(obj = %lom, cloud = %cloud.display(), "Mirrored to cloud backend");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list_local(
        &self,
        bck: &BucketRef,
        prefix: Option<&str>,
    ) -> Result<Vec<Lom>, StoreError> {
        let root = self.bucket_dir(bck);
        let mut loms = Vec::new();
        let mut dirs = vec![root.clone()];

        while let Some(dir) = dirs.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(format!("list {}", dir.display()), e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(format!("list {}", dir.display()), e))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| StoreError::io(format!("stat {}", path.display()), e))?;
                if meta.is_dir() {
                    dirs.push(path);
                    continue;
                }
                let Some(name) = rel_name(&root, &path) else {
                    continue;
                };
                if prefix.is_some_and(|p| !name.starts_with(p)) {
                    continue;
                }
                let mut lom = Lom::init(bck, &name)?;
                lom.attrs.size = Some(meta.len());
                lom.attrs.atime = meta.modified().ok().map(DateTime::<Utc>::from);
                loms.push(lom);
            }
        }

        loms.sort_by(|a, b| a.obj_name.cmp(&b.obj_name));
        Ok(loms)
    }

    async fn copy_object(
        &self,
        lom: &Lom,
        params: &mut CopyObjectParams,
    ) -> Result<Option<u64>, StoreError> {
        let bck_to = params
            .bck_to
            .clone()
            .ok_or_else(|| StoreError::InvalidName("missing destination bucket".to_string()))?;
        let mut dst = Lom::init(&bck_to, &params.obj_name_to)?;

        let src = self.obj_path(&lom.bck, &lom.obj_name);
        let mut file = File::open(&src).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(lom.to_string()),
            _ => StoreError::io(format!("open {}", src.display()), e),
        })?;

        dst.attrs.version = lom.attrs.version.clone();
        dst.attrs.atime = Some(Utc::now());

        let owner = self
            .smap
            .hrw_target(&dst.uname())
            .ok_or_else(|| StoreError::NoTarget(dst.to_string()))?;

        // Plain copies stream straight from the source file; the checksum is
        // computed by whoever writes the destination. A transform needs the
        // whole object, read through the scratch buffer.
        let (payload, size): (Payload, Option<u64>) = match &params.dp {
            None => {
                let len = file
                    .metadata()
                    .await
                    .map_err(|e| StoreError::io(format!("stat {}", src.display()), e))?
                    .len();
                dst.attrs.size = Some(len);
                (Box::new(file), Some(len))
            }
            Some(dp) => {
                let data = read_all(&mut file, &src, lom.size_bytes(), params.buf.as_deref_mut())
                    .await?;
                let data = dp.transform(lom, data).await?;
                dst.attrs.size = None;
                dst.attrs.cksum = Some(md5_b64(&data));
                (Box::new(Cursor::new(data)), None)
            }
        };

        if params.dry_run {
            return Ok(size);
        }

        if owner == self.node_id {
            let mut reader = payload;
            self.put_object(
                &mut dst,
                PutObjectParams {
                    tag: WorkTag::Put,
                    recv_type: RecvType::RegularPut,
                    reader: &mut reader,
                },
            )
            .await?;
            return Ok(size);
        }

        let dm = params.dm.as_ref().ok_or_else(|| StoreError::Send {
            obj: dst.to_string(),
            target: owner.clone(),
            source: TransportError::NotOpen("no data mover".to_string()),
        })?;
        let hdr = ObjHdr {
            bck: dst.bck.clone(),
            obj_name: dst.obj_name.clone(),
            attrs: dst.attrs.clone(),
            sender: self.node_id.clone(),
        };
        dm.send(Message::Data(hdr), payload, &owner)
            .await
            .map_err(|source| StoreError::Send {
                obj: dst.to_string(),
                target: owner,
                source,
            })?;
        Ok(size)
    }

    async fn put_object(
        &self,
        lom: &mut Lom,
        params: PutObjectParams<'_>,
    ) -> Result<(), StoreError> {
        let work = self.work_dir.join(format!(
            "{}.{}",
            params.tag.as_str(),
            uuid::Uuid::new_v4()
        ));
        let dst = self.obj_path(&lom.bck, &lom.obj_name);

        let written = write_workfile(&work, params.reader).await;
        let (written, cksum) = match written {
            Ok(w) => w,
            Err(e) => {
                let _ = fs::remove_file(&work).await;
                return Err(e);
            }
        };

        if let Some(expected) = lom.attrs.cksum.as_ref().filter(|c| **c != cksum) {
            let _ = fs::remove_file(&work).await;
            return Err(StoreError::BadChecksum {
                obj: lom.to_string(),
                expected: expected.clone(),
                actual: cksum,
            });
        }

        let old = fs::metadata(&dst).await.map(|m| m.len()).unwrap_or(0);
        if let Err(e) = self.reserve(old, written) {
            let _ = fs::remove_file(&work).await;
            return Err(e);
        }

        let finalize = async {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
            }
            fs::rename(&work, &dst)
                .await
                .map_err(|e| StoreError::io(format!("rename to {}", dst.display()), e))
        };
        if let Err(e) = finalize.await {
            let _ = fs::remove_file(&work).await;
            // Give back the reservation
            self.used.fetch_sub(written, Ordering::SeqCst);
            self.used.fetch_add(old, Ordering::SeqCst);
            return Err(e);
        }

        lom.attrs.size = Some(written);
        lom.attrs.cksum = Some(cksum);
        if lom.attrs.atime.is_none() {
            lom.attrs.atime = Some(Utc::now());
        }

        if params.recv_type == RecvType::RegularPut {
            self.mirror(lom, &dst).await?;
        }
        Ok(())
    }

    async fn read_object(&self, bck: &BucketRef, obj_name: &str) -> Result<Bytes, StoreError> {
        let path = self.obj_path(bck, obj_name);
        fs::read(&path).await.map(Bytes::from).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(format!("{}/{}", bck, obj_name)),
            _ => StoreError::io(format!("read {}", path.display()), e),
        })
    }
}

impl CapacityMonitor for FsStore {
    fn status(&self) -> CapStatus {
        let used = self.used();
        if self.quota == 0 {
            return CapStatus {
                used,
                ..Default::default()
            };
        }
        let pct = pct(used, self.quota);
        let err = (pct >= self.oos_pct).then(|| CapacityError::OutOfSpace {
            used,
            quota: self.quota,
            pct,
            oos_pct: self.oos_pct,
        });
        CapStatus {
            used,
            quota: self.quota,
            throttle: pct >= self.high_wm_pct,
            err,
        }
    }
}

/// Stream `reader` into a new file at `path`, returning the byte count and
/// base64 MD5.
async fn write_workfile(path: &Path, reader: &mut Payload) -> Result<(u64, String), StoreError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| StoreError::io(format!("create {}", path.display()), e))?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DEFAULT_READ_SIZE];
    let mut written = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| StoreError::io("read payload", e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])
            .await
            .map_err(|e| StoreError::io(format!("write {}", path.display()), e))?;
        written += n as u64;
    }
    file.flush()
        .await
        .map_err(|e| StoreError::io(format!("flush {}", path.display()), e))?;

    Ok((written, b64(&hasher.finalize())))
}

/// Read all of `file` through `buf`, or a local buffer if none is given.
async fn read_all(
    file: &mut File,
    path: &Path,
    size_hint: u64,
    buf: Option<&mut [u8]>,
) -> Result<Bytes, StoreError> {
    let mut local_buf;
    let buf = match buf {
        Some(buf) => buf,
        None => {
            local_buf = vec![0u8; DEFAULT_READ_SIZE];
            &mut local_buf[..]
        }
    };
    let mut data = BytesMut::with_capacity(size_hint as usize);
    loop {
        let n = file
            .read(buf)
            .await
            .map_err(|e| StoreError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    Ok(data.freeze())
}

fn b64(digest: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest)
}

/// Base64 MD5 of `data`
pub fn md5_b64(data: &[u8]) -> String {
    b64(&Md5::digest(data))
}

fn pct(used: u64, quota: u64) -> u8 {
    if quota == 0 {
        return 0;
    }
    (used.saturating_mul(100) / quota).min(u64::from(u8::MAX)) as u8
}

/// Object name of `path` relative to the bucket directory `root`
fn rel_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

async fn dir_size(root: &Path) -> Result<u64, StoreError> {
    let mut total = 0;
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(format!("list {}", dir.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(format!("list {}", dir.display()), e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StoreError::io(format!("stat {}", entry.path().display()), e))?;
            if meta.is_dir() {
                dirs.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}
