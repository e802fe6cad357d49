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

//! Backend relying on the Linux resctrl filesystem.

mod allocation;
mod files;
mod info;
mod monitoring;
mod schemata;

use std::path::Path;
use std::path::PathBuf;

use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::CpuInfo;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MonEvent;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::OsBackend;
use crate::RdtBackend;
use crate::RdtResult;

pub struct ResctrlBackend {
    root: PathBuf,
    cpu_info: CpuInfo,
    next_group_id: u64,
}

impl ResctrlBackend {
    /// The filesystem is only touched by operations, so a missing mount fails them instead.
    pub fn new(root: impl Into<PathBuf>, cpu_info: CpuInfo) -> Self {
        Self {
            root: root.into(),
            cpu_info,
            next_group_id: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn info_dir(&self, resource: &str) -> PathBuf {
        self.root.join("info").join(resource)
    }

    /// The default class is the root of the mount.
    fn class_dir(&self, class_id: ClassId) -> PathBuf {
        if class_id == ClassId::DEFAULT {
            self.root.clone()
        } else {
            self.root.join(format!("COS{class_id}"))
        }
    }
}

impl RdtBackend for ResctrlBackend {
    fn alloc_assoc_set(&mut self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()> {
        self.assoc_set(core_id, class_id)
    }

    fn alloc_assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<ClassId> {
        self.assoc_get(core_id)
    }

    fn alloc_assign(
        &mut self,
        technology: Technology,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId> {
        self.assign(technology, core_ids)
    }

    fn alloc_release(&mut self, core_ids: &[LogicalCoreId]) -> RdtResult<()> {
        self.release(core_ids)
    }

    fn alloc_reset(&mut self, l3_cdp: CdpConfig) -> RdtResult<()> {
        self.reset(l3_cdp)
    }

    fn l3ca_set(&mut self, socket: SocketId, allocations: &[L3Allocation]) -> RdtResult<()> {
        self.set_l3(socket, allocations)
    }

    fn l3ca_get(&mut self, socket: SocketId, max_num_ca: usize) -> RdtResult<Vec<L3Allocation>> {
        self.get_l3(socket, max_num_ca)
    }

    fn l2ca_set(&mut self, l2_id: L2Id, allocations: &[L2Allocation]) -> RdtResult<()> {
        self.set_l2(l2_id, allocations)
    }

    fn l2ca_get(&mut self, l2_id: L2Id, max_num_ca: usize) -> RdtResult<Vec<L2Allocation>> {
        self.get_l2(l2_id, max_num_ca)
    }

    fn mon_start(
        &mut self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        self.start_cores(core_ids, event, context, group)
    }

    fn mon_stop(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        self.stop_group(group)
    }

    fn mon_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()> {
        groups
            .iter_mut()
            .try_for_each(|group| self.poll_group(group))
    }
}

impl OsBackend for ResctrlBackend {
    fn mon_start_pid(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        self.start_pid(group)
    }
}
