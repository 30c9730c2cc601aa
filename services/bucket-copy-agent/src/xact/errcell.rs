// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Store-once error slot shared by pipeline workers and receivers

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::XactError;

/// First-error-wins cell.
///
/// The first [`ErrCell::store`] succeeds; later ones are counted and
/// discarded.
#[derive(Debug, Default)]
pub struct ErrCell {
    first: OnceLock<XactError>,
    discarded: AtomicUsize,
}

impl ErrCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless an error is already present. Returns true if
    /// `err` became the stored error.
    pub fn store(&self, err: XactError) -> bool {
        match self.first.set(err) {
            Ok(()) => true,
            Err(later) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %later, "Discarding error, one is already stored");
                false
            }
        }
    }

    pub fn get(&self) -> Option<&XactError> {
        self.first.get()
    }

    pub fn is_set(&self) -> bool {
        self.first.get().is_some()
    }

    /// Consume the cell, returning the stored error
    pub fn into_inner(self) -> Option<XactError> {
        self.first.into_inner()
    }

    /// Number of errors discarded because one was already stored
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }
}
