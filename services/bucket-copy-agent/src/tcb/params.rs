// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Pool of per-object copy parameters

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use crate::store::CopyObjectParams;

/// Pool of [`CopyObjectParams`].
///
/// Each borrow is exclusive. The parameters are reset when the guard drops,
/// before anyone else can borrow them.
#[derive(Default)]
pub struct CopyParamsPool {
    free: Mutex<Vec<Box<CopyObjectParams>>>,
}

impl CopyParamsPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ParamsGuard<'_> {
        let params = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        ParamsGuard { params, pool: self }
    }

    /// Number of idle entries
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive borrow of pooled copy parameters
pub struct ParamsGuard<'a> {
    params: Box<CopyObjectParams>,
    pool: &'a CopyParamsPool,
}

impl Deref for ParamsGuard<'_> {
    type Target = CopyObjectParams;

    fn deref(&self) -> &CopyObjectParams {
        &self.params
    }
}

impl DerefMut for ParamsGuard<'_> {
    fn deref_mut(&mut self) -> &mut CopyObjectParams {
        &mut self.params
    }
}

impl Drop for ParamsGuard<'_> {
    fn drop(&mut self) {
        self.params.reset();
        let params = std::mem::take(&mut self.params);
        self.pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(params);
    }
}
