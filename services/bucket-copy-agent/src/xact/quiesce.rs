// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Reference-counted quiescence
//!
//! A job waits for every peer to report that it has finished sending. The
//! count of outstanding peers lives in [`PeerAcks`]; [`PeerAcks::wait`]
//! resolves once the count reaches zero, the job is aborted, or the
//! two-tier timeout expires.
//!
//! The tiers: while the liveness probe keeps reporting activity the wait is
//! re-armed, up to the `max` bound. Once the probe reports no activity for
//! `optimal`, the wait gives up early.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Smallest and largest polling step
const MIN_STEP: Duration = Duration::from_millis(10);
const MAX_STEP: Duration = Duration::from_secs(1);

/// Outcome of a quiescence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiRes {
    /// All peers reported completion
    Quiesced,
    /// The job was aborted while waiting
    Aborted,
    /// Peers still outstanding when the wait gave up
    TimedOut,
}

/// Result of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Peers may still be sending; keep waiting
    Active,
    /// No sign of activity since the last probe
    Idle,
}

/// Count of peers that have not yet reported completion.
#[derive(Debug, Default)]
pub struct PeerAcks {
    refc: AtomicI32,
    zero: Notify,
}

impl PeerAcks {
    pub fn new(expected: i32) -> Self {
        Self {
            refc: AtomicI32::new(expected),
            zero: Notify::new(),
        }
    }

    /// Reset the expected count.
    pub fn set(&self, expected: i32) {
        self.refc.store(expected, Ordering::SeqCst);
    }

    /// Record one completion, returning the remaining count. A negative
    /// result means more completions arrived than were expected.
    pub fn dec(&self) -> i32 {
        let left = self.refc.fetch_sub(1, Ordering::SeqCst) - 1;
        if left == 0 {
            self.zero.notify_one();
        }
        left
    }

    pub fn get(&self) -> i32 {
        self.refc.load(Ordering::SeqCst)
    }

    pub fn is_quiesced(&self) -> bool {
        self.get() <= 0
    }

    /// Liveness probe that reports activity for as long as peers are
    /// outstanding. With it the wait runs up to `max`.
    pub fn probe(&self) -> Probe {
        if self.is_quiesced() {
            Probe::Idle
        } else {
            Probe::Active
        }
    }

    /// Wait for the count to reach zero.
    ///
    /// `probe` is called after every polling step with the total time waited
    /// so far.
    pub async fn wait<F>(
        &self,
        optimal: Duration,
        max: Duration,
        abort: &CancellationToken,
        mut probe: F,
    ) -> QuiRes
    where
        F: FnMut(Duration) -> Probe,
    {
        if self.is_quiesced() {
            return QuiRes::Quiesced;
        }
        let step = (optimal / 8).clamp(MIN_STEP, MAX_STEP);
        let mut total = Duration::ZERO;
        let mut idle = Duration::ZERO;

        loop {
            tokio::select! {
                _ = abort.cancelled() => return QuiRes::Aborted,
                _ = self.zero.notified() => {}
                _ = tokio::time::sleep(step) => total += step,
            }
            if self.is_quiesced() {
                return QuiRes::Quiesced;
            }
            if total >= max {
                return QuiRes::TimedOut;
            }
            match probe(total) {
                Probe::Active => idle = Duration::ZERO,
                Probe::Idle => {
                    idle += step;
                    if idle >= optimal {
                        return QuiRes::TimedOut;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_zero_resolves_immediately() {
        let acks = PeerAcks::new(0);
        let res = acks
            .wait(
                Duration::from_secs(4),
                Duration::from_secs(150),
                &CancellationToken::new(),
                |_| Probe::Active,
            )
            .await;
        assert_eq!(res, QuiRes::Quiesced);
    }

    #[tokio::test]
    async fn test_quiesces_when_peers_report() {
        let acks = Arc::new(PeerAcks::new(2));
        let peers = Arc::clone(&acks);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(peers.dec(), 1);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(peers.dec(), 0);
        });

        let started = std::time::Instant::now();
        let res = acks
            .wait(
                Duration::from_millis(100),
                Duration::from_secs(10),
                &CancellationToken::new(),
                |_| Probe::Active,
            )
            .await;
        assert_eq!(res, QuiRes::Quiesced);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(acks.get(), 0);
    }

    #[tokio::test]
    async fn test_max_bound() {
        let acks = PeerAcks::new(1);
        let res = acks
            .wait(
                Duration::from_millis(80),
                Duration::from_millis(200),
                &CancellationToken::new(),
                |_| acks.probe(),
            )
            .await;
        assert_eq!(res, QuiRes::TimedOut);
        assert_eq!(acks.get(), 1);
    }

    #[tokio::test]
    async fn test_idle_tier_gives_up_early() {
        let acks = PeerAcks::new(1);
        let started = std::time::Instant::now();
        let res = acks
            .wait(
                Duration::from_millis(80),
                Duration::from_secs(30),
                &CancellationToken::new(),
                |_| Probe::Idle,
            )
            .await;
        assert_eq!(res, QuiRes::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_activity_rearms_optimal() {
        let acks = PeerAcks::new(1);
        let mut calls = 0;
        let res = acks
            .wait(
                Duration::from_millis(80),
                Duration::from_secs(30),
                &CancellationToken::new(),
                |_| {
                    calls += 1;
                    // Active for the first 20 steps, then idle
                    if calls <= 20 { Probe::Active } else { Probe::Idle }
                },
            )
            .await;
        assert_eq!(res, QuiRes::TimedOut);
        // 20 active steps plus 8 idle ones of 10ms
        assert!(calls >= 28);
    }

    #[tokio::test]
    async fn test_abort() {
        let acks = PeerAcks::new(1);
        let abort = CancellationToken::new();
        let canceller = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });
        let res = acks
            .wait(
                Duration::from_secs(4),
                Duration::from_secs(150),
                &abort,
                |_| Probe::Active,
            )
            .await;
        assert_eq!(res, QuiRes::Aborted);
    }

    #[test]
    fn test_dec_past_zero() {
        let acks = PeerAcks::new(1);
        assert_eq!(acks.dec(), 0);
        assert!(acks.is_quiesced());
        assert_eq!(acks.dec(), -1);
    }
}
