/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::errors::CPUTopologyError;
use crate::CTResult;
use crate::L2Id;
use crate::LogicalCoreId;
use crate::SocketId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreInfo {
    pub core_id: LogicalCoreId,
    pub socket: SocketId,
    pub l2_id: L2Id,
}

impl CoreInfo {
    pub fn new(core_id: LogicalCoreId, socket: SocketId, l2_id: L2Id) -> Self {
        Self {
            core_id,
            socket,
            l2_id,
        }
    }
}

/// Flattened CPU topology, cores are kept sorted by their logical id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    cores: Vec<CoreInfo>,
}

impl CpuInfo {
    pub fn new(mut cores: Vec<CoreInfo>) -> Self {
        cores.sort_by_key(|core| core.core_id);
        cores.dedup_by_key(|core| core.core_id);
        Self { cores }
    }

    pub fn cores(&self) -> impl Iterator<Item = &CoreInfo> {
        self.cores.iter()
    }

    pub fn core_ids(&self) -> impl Iterator<Item = LogicalCoreId> + '_ {
        self.cores.iter().map(|core| core.core_id)
    }

    pub fn core(&self, core_id: LogicalCoreId) -> Option<&CoreInfo> {
        self.cores
            .binary_search_by_key(&core_id, |core| core.core_id)
            .ok()
            .map(|idx| &self.cores[idx])
    }

    pub fn socket_of(&self, core_id: LogicalCoreId) -> CTResult<SocketId> {
        self.core(core_id)
            .map(|core| core.socket)
            .ok_or(CPUTopologyError::socket_not_found(core_id))
    }

    pub fn sockets(&self) -> Vec<SocketId> {
        let mut sockets = self.cores.iter().map(|core| core.socket).collect::<Vec<_>>();
        sockets.sort();
        sockets.dedup();
        sockets
    }

    pub fn l2_ids(&self) -> Vec<L2Id> {
        let mut l2_ids = self.cores.iter().map(|core| core.l2_id).collect::<Vec<_>>();
        l2_ids.sort();
        l2_ids.dedup();
        l2_ids
    }

    pub fn cores_on_socket(&self, socket: SocketId) -> impl Iterator<Item = LogicalCoreId> + '_ {
        self.cores
            .iter()
            .filter(move |core| core.socket == socket)
            .map(|core| core.core_id)
    }

    pub fn cores_in_l2(&self, l2_id: L2Id) -> impl Iterator<Item = LogicalCoreId> + '_ {
        self.cores
            .iter()
            .filter(move |core| core.l2_id == l2_id)
            .map(|core| core.core_id)
    }

    /// Some registers are shared by a whole package, so any core of it can be used to access them.
    pub fn first_core_on_socket(&self, socket: SocketId) -> Option<LogicalCoreId> {
        self.cores_on_socket(socket).next()
    }

    pub fn first_core_in_l2(&self, l2_id: L2Id) -> Option<LogicalCoreId> {
        self.cores_in_l2(l2_id).next()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}
