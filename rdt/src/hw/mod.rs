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

//! Backend programming the RDT model specific registers directly.

mod allocation;
mod capability;
mod monitoring;
#[cfg(test)]
mod tests;

use rdt_msr::registers;
use rdt_msr::MsrAccess;
use rdt_msr::RdtFeatures;
use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::CpuInfo;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Rmid;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

pub use capability::HwCapability;

use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::HwBackend;
use crate::RdtBackend;
use crate::RdtError;
use crate::RdtResult;

pub struct MsrBackend<M: MsrAccess> {
    msr: M,
    cpu_info: CpuInfo,
    capability: HwCapability,
}

impl<M: MsrAccess> MsrBackend<M> {
    pub fn new(msr: M, cpu_info: CpuInfo, capability: HwCapability) -> Self {
        Self {
            msr,
            cpu_info,
            capability,
        }
    }

    /// Detects RDT features with CPUID and the current L3 CDP state from the first socket.
    pub fn detect(msr: M, cpu_info: CpuInfo) -> Self {
        let features = RdtFeatures::detect();
        let cdp_supported = features
            .l3ca
            .map(|l3| l3.cdp_supported)
            .unwrap_or(false);
        let first_core = cpu_info.core_ids().next();

        let l3_cdp_enabled = match first_core {
            Some(core_id) if cdp_supported => {
                match msr.read(registers::IA32_L3_QOS_CFG, core_id) {
                    Ok(value) => value & registers::L3_QOS_CFG_CDP_ENABLE != 0,
                    Err(error) => {
                        tracing::warn!("reading L3 CDP state failed, assuming it's off: {error}");
                        false
                    }
                }
            }
            _ => false,
        };

        let capability = HwCapability::new(features).with_l3_cdp(l3_cdp_enabled);
        Self::new(msr, cpu_info, capability)
    }

    pub fn capability(&self) -> &HwCapability {
        &self.capability
    }

    pub fn cpu_info(&self) -> &CpuInfo {
        &self.cpu_info
    }

    fn read(&self, register_id: u32, core_id: LogicalCoreId) -> RdtResult<u64> {
        Ok(self.msr.read(register_id, core_id)?)
    }

    fn write(&self, register_id: u32, value: u64, core_id: LogicalCoreId) -> RdtResult<()> {
        Ok(self.msr.write(register_id, value, core_id)?)
    }

    fn write_masked(
        &self,
        register_id: u32,
        value: u64,
        mask: u64,
        core_id: LogicalCoreId,
    ) -> RdtResult<()> {
        Ok(self.msr.write_masked(register_id, value, mask, core_id)?)
    }

    /// Socket-wide registers are reachable from any core of the socket.
    fn socket_core(&self, socket: SocketId) -> RdtResult<LogicalCoreId> {
        self.cpu_info
            .first_core_on_socket(socket)
            .ok_or_else(|| RdtError::invalid_param(format!("socket {socket} doesn't exist")))
    }

    fn l2_core(&self, l2_id: L2Id) -> RdtResult<LogicalCoreId> {
        self.cpu_info
            .first_core_in_l2(l2_id)
            .ok_or_else(|| RdtError::invalid_param(format!("L2 cluster {l2_id} doesn't exist")))
    }

    fn read_class(&self, core_id: LogicalCoreId) -> RdtResult<ClassId> {
        let value = self.read(registers::IA32_PQR_ASSOC, core_id)?;
        Ok(registers::pqr_assoc_class(value))
    }

    fn write_class(&self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()> {
        self.write_masked(
            registers::IA32_PQR_ASSOC,
            registers::pqr_assoc_class_bits(class_id),
            registers::PQR_ASSOC_COS_MASK,
            core_id,
        )
    }

    fn read_rmid(&self, core_id: LogicalCoreId) -> RdtResult<Rmid> {
        let value = self.read(registers::IA32_PQR_ASSOC, core_id)?;
        Ok(registers::pqr_assoc_rmid(value))
    }

    fn write_rmid(&self, core_id: LogicalCoreId, rmid: Rmid) -> RdtResult<()> {
        self.write_masked(
            registers::IA32_PQR_ASSOC,
            registers::pqr_assoc_rmid_bits(rmid),
            registers::PQR_ASSOC_RMID_MASK,
            core_id,
        )
    }
}

impl<M: MsrAccess> RdtBackend for MsrBackend<M> {
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
        self.start_monitoring(core_ids, event, context, group)
    }

    fn mon_stop(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        self.stop_monitoring(group)
    }

    fn mon_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()> {
        groups
            .iter_mut()
            .try_for_each(|group| self.poll_group(group))
    }
}

impl<M: MsrAccess> HwBackend for MsrBackend<M> {
    fn mba_set(
        &mut self,
        socket: SocketId,
        requested: &[MbaAllocation],
    ) -> RdtResult<Vec<MbaAllocation>> {
        self.set_mba(socket, requested)
    }

    fn mba_get(
        &mut self,
        socket: SocketId,
        max_num_cos: usize,
    ) -> RdtResult<Vec<MbaAllocation>> {
        self.get_mba(socket, max_num_cos)
    }

    fn mon_reset(&mut self) -> RdtResult<()> {
        let core_ids = self.cpu_info.core_ids().collect::<Vec<_>>();
        for core_id in core_ids {
            self.write_rmid(core_id, Rmid::UNMONITORED)?;
        }
        Ok(())
    }

    fn mon_assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<Rmid> {
        crate::domain::core_info(&self.cpu_info, core_id)?;
        self.read_rmid(core_id)
    }
}
