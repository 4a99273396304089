// Copyright 2026 vbsfs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::BTreeMap,
    sync::{Mutex, RwLock},
};

use lazy_static::lazy_static;
use snafu::OptionExt;
use vbsfs_common::{Handle, HANDLE_START};

use crate::{
    err::{BadHandleSnafu, Result},
    file::VirtualFile,
};

lazy_static! {
    static ref OPEN_RECORDINGS: HandleTable = HandleTable::default();
}

/// Process-wide map from handle to open recording. Open and close take the
/// write side; read and seek only need the read side, so unrelated handles
/// stream in parallel. The per-entry mutex serializes callers that share a
/// single handle.
#[derive(Default)]
pub(crate) struct HandleTable {
    entries: RwLock<BTreeMap<Handle, Mutex<VirtualFile>>>,
}

impl HandleTable {
    pub(crate) fn global() -> &'static HandleTable {
        &OPEN_RECORDINGS
    }

    /// Mint the next handle and install the file under it. Handles start at
    /// [HANDLE_START] and step down from the smallest live handle, so none
    /// is reused while anything stays open and none collides with a kernel
    /// descriptor.
    pub(crate) fn install(&self, file: VirtualFile) -> Handle {
        let mut entries = self.entries.write().unwrap();
        let handle = match entries.keys().next() {
            None => HANDLE_START,
            Some(smallest) => smallest - 1,
        };
        entries.insert(handle, Mutex::new(file));
        handle
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.entries.read().unwrap().contains_key(&handle)
    }

    /// Run `op` against the file behind `handle`.
    pub(crate) fn with_file<T>(
        &self,
        handle: Handle,
        op: impl FnOnce(&mut VirtualFile) -> T,
    ) -> Result<T> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(&handle).context(BadHandleSnafu { handle })?;
        let mut file = entry.lock().unwrap();
        Ok(op(&mut file))
    }

    /// Drop the entry; every descriptor the recording held closes with it.
    pub(crate) fn remove(&self, handle: Handle) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(&handle).context(BadHandleSnafu { handle })?;
        Ok(())
    }
}
