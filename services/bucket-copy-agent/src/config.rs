// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Agent configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::registry::DEFAULT_MAX_FINISHED_JOBS;

/// Default data directory for objects and workfiles
const DEFAULT_DATA_DIR: &str = "/var/tmp/bucket-copy";

/// Default keepalive cadence; also the optimal quiescence interval
const DEFAULT_MAX_KEEPALIVE_MS: u64 = 4_000;

/// Default file send timeout; quiescence gives up after half of it
const DEFAULT_SEND_FILE_TIMEOUT_SECS: u64 = 300;

const DEFAULT_CAPACITY_HIGH_WM_PCT: u8 = 80;
const DEFAULT_CAPACITY_OOS_PCT: u8 = 95;
const DEFAULT_THROTTLE_MS: u64 = 10;

/// Size of pooled scratch buffers
const DEFAULT_SLAB_BUF_SIZE: usize = 128 * 1024;

/// Parallelism factor for transform jobs, overlapping disk reads with
/// transformation
const DEFAULT_ETL_PARALLEL: usize = 2;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Directory for objects, workfiles and the mirrored cloud backend
    pub data_dir: PathBuf,
    /// Identity of this storage target
    pub node_id: String,
    /// Cluster keepalive interval
    pub max_keepalive: Duration,
    /// Timeout for sending a single object to a peer
    pub send_file_timeout: Duration,
    /// Storage quota in bytes (0 = unlimited)
    pub capacity_bytes: u64,
    /// Used-space percentage above which copies are throttled
    pub capacity_high_wm_pct: u8,
    /// Used-space percentage at which the capacity status turns into an error
    pub capacity_oos_pct: u8,
    /// Pause between objects while above the high watermark
    pub throttle: Duration,
    /// Size of pooled scratch buffers
    pub slab_buf_size: usize,
    /// Number of concurrent copies for transform jobs
    pub etl_parallel: usize,
    /// Finished jobs kept for status queries
    pub max_finished_jobs: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_id: default_node_id(),
            max_keepalive: Duration::from_millis(DEFAULT_MAX_KEEPALIVE_MS),
            send_file_timeout: Duration::from_secs(DEFAULT_SEND_FILE_TIMEOUT_SECS),
            capacity_bytes: 0,
            capacity_high_wm_pct: DEFAULT_CAPACITY_HIGH_WM_PCT,
            capacity_oos_pct: DEFAULT_CAPACITY_OOS_PCT,
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            slab_buf_size: DEFAULT_SLAB_BUF_SIZE,
            etl_parallel: DEFAULT_ETL_PARALLEL,
            max_finished_jobs: DEFAULT_MAX_FINISHED_JOBS,
        }
    }
}

fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "node-0".to_string())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| default_node_id());

        Self {
            data_dir,
            node_id,
            max_keepalive: Duration::from_millis(env_or(
                "MAX_KEEPALIVE_MS",
                DEFAULT_MAX_KEEPALIVE_MS,
            )),
            send_file_timeout: Duration::from_secs(env_or(
                "SEND_FILE_TIMEOUT_SECS",
                DEFAULT_SEND_FILE_TIMEOUT_SECS,
            )),
            capacity_bytes: env_or("CAPACITY_BYTES", 0),
            capacity_high_wm_pct: env_or("CAPACITY_HIGH_WM_PCT", DEFAULT_CAPACITY_HIGH_WM_PCT),
            capacity_oos_pct: env_or("CAPACITY_OOS_PCT", DEFAULT_CAPACITY_OOS_PCT),
            throttle: Duration::from_millis(env_or("THROTTLE_MS", DEFAULT_THROTTLE_MS)),
            slab_buf_size: env_or("SLAB_BUF_SIZE", DEFAULT_SLAB_BUF_SIZE),
            etl_parallel: env_or("ETL_PARALLEL", DEFAULT_ETL_PARALLEL),
            max_finished_jobs: env_or("MAX_FINISHED_JOBS", DEFAULT_MAX_FINISHED_JOBS),
        }
    }

    /// `(optimal, maximum)` quiescence timeouts.
    ///
    /// The optimal interval follows the keepalive cadence; the maximum is
    /// half the file send timeout.
    pub fn quiesce_timeouts(&self) -> (Duration, Duration) {
        (self.max_keepalive, self.send_file_timeout / 2)
    }

    /// Get the path to store objects
    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    /// Get the path for in-flight workfiles
    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }

    /// Get the path of the mirrored cloud backend
    pub fn cloud_dir(&self) -> PathBuf {
        self.data_dir.join("cloud")
    }
}
