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

use std::collections::BTreeSet;

use rdt_msr::registers;
use rdt_msr::registers::CdpMaskKind;
use rdt_msr::MsrAccess;
use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use super::MsrBackend;
use crate::domain::assign_domain;
use crate::domain::check_cores_exist;
use crate::domain::core_info;
use crate::limits::check_class;
use crate::limits::check_mask_fits;
use crate::limits::check_room;
use crate::BackendError;
use crate::RdtError;
use crate::RdtResult;

impl<M: MsrAccess> MsrBackend<M> {
    pub(super) fn assoc_set(&mut self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()> {
        core_info(&self.cpu_info, core_id)?;
        let num_classes = self.capability.assoc_num_classes()?;
        if class_id.as_u32() >= num_classes {
            return Err(RdtError::invalid_param(format!(
                "class of service {class_id} is out of range, only {num_classes} are available"
            )));
        }

        self.write_class(core_id, class_id)
    }

    pub(super) fn assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<ClassId> {
        core_info(&self.cpu_info, core_id)?;
        self.read_class(core_id)
    }

    /// Takes the highest class not used by other cores of the domain.
    pub(super) fn assign(
        &mut self,
        technology: Technology,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId> {
        let domain = assign_domain(&self.cpu_info, technology, core_ids)?;
        let num_classes = self.capability.num_classes_for(technology)?;

        let requested = core_ids.iter().copied().collect::<BTreeSet<_>>();
        let mut used_classes = BTreeSet::new();
        for core_id in domain.cores(&self.cpu_info) {
            if !requested.contains(&core_id) {
                used_classes.insert(self.read_class(core_id)?);
            }
        }

        let class_id = (1..num_classes)
            .rev()
            .map(ClassId::new)
            .find(|class_id| !used_classes.contains(class_id))
            .ok_or_else(|| BackendError::resource_exhausted("class of service"))?;

        for &core_id in core_ids {
            self.write_class(core_id, class_id)?;
        }
        tracing::debug!("cores {core_ids:?} assigned to class of service {class_id}");

        Ok(class_id)
    }

    pub(super) fn release(&mut self, core_ids: &[LogicalCoreId]) -> RdtResult<()> {
        check_cores_exist(&self.cpu_info, core_ids)?;
        for &core_id in core_ids {
            self.write_class(core_id, ClassId::DEFAULT)?;
        }
        Ok(())
    }

    pub(super) fn reset(&mut self, l3_cdp: CdpConfig) -> RdtResult<()> {
        let features = self.capability.features;
        let cdp_supported = features
            .l3ca
            .map(|l3| l3.cdp_supported)
            .unwrap_or(false);

        let cdp_enabled = match l3_cdp {
            CdpConfig::On if !cdp_supported => {
                tracing::error!("L3 CDP requested but not supported by the platform");
                return Err(RdtError::invalid_param("L3 CDP is not supported"));
            }
            CdpConfig::On => true,
            CdpConfig::Off => false,
            CdpConfig::Any => self.capability.l3_cdp_enabled,
        };

        if let Some(l3) = features.l3ca {
            let full_mask = l3.full_ways_mask();
            for socket in self.cpu_info.sockets() {
                let core_id = self.socket_core(socket)?;
                // With CDP the same registers are used in pairs, so each of them gets a full mask.
                for register_idx in 0..l3.num_classes {
                    let register_id = registers::l3_mask_register(ClassId::new(register_idx), None);
                    self.write(register_id, full_mask, core_id)?;
                }
                if cdp_supported && cdp_enabled != self.capability.l3_cdp_enabled {
                    let value = if cdp_enabled {
                        registers::L3_QOS_CFG_CDP_ENABLE
                    } else {
                        0
                    };
                    self.write_masked(
                        registers::IA32_L3_QOS_CFG,
                        value,
                        registers::L3_QOS_CFG_CDP_ENABLE,
                        core_id,
                    )?;
                }
            }
            self.capability.l3_cdp_enabled = cdp_enabled;
        }

        if let Some(l2) = features.l2ca {
            let full_mask = l2.full_ways_mask();
            for l2_id in self.cpu_info.l2_ids() {
                let core_id = self.l2_core(l2_id)?;
                for class_idx in 0..l2.num_classes {
                    let register_id = registers::l2_mask_register(ClassId::new(class_idx));
                    self.write(register_id, full_mask, core_id)?;
                }
            }
        }

        if let Some(mba) = features.mba {
            for socket in self.cpu_info.sockets() {
                let core_id = self.socket_core(socket)?;
                for class_idx in 0..mba.num_classes {
                    self.write(registers::mba_register(ClassId::new(class_idx)), 0, core_id)?;
                }
            }
        }

        let core_ids = self.cpu_info.core_ids().collect::<Vec<_>>();
        for core_id in core_ids {
            self.write_class(core_id, ClassId::DEFAULT)?;
        }
        tracing::debug!("allocation reset, L3 CDP enabled: {cdp_enabled}");

        Ok(())
    }

    pub(super) fn set_l3(&mut self, socket: SocketId, allocations: &[L3Allocation]) -> RdtResult<()> {
        let full_mask = self.capability.l3()?.full_ways_mask();
        let num_classes = self.capability.l3_num_classes()?;
        let cdp_enabled = self.capability.l3_cdp_enabled;
        let core_id = self.socket_core(socket)?;

        for allocation in allocations {
            check_class(allocation.class_id, num_classes, "L3")?;
            if allocation.mask.is_cdp() && !cdp_enabled {
                return Err(RdtError::invalid_param(format!(
                    "L3 COS{} has code and data masks but CDP is off",
                    allocation.class_id
                )));
            }
            for mask in allocation.mask.masks() {
                check_mask_fits(mask, full_mask, allocation.class_id, "L3")?;
            }
        }

        for allocation in allocations {
            let class_id = allocation.class_id;
            if cdp_enabled {
                let data_register = registers::l3_mask_register(class_id, Some(CdpMaskKind::Data));
                let code_register = registers::l3_mask_register(class_id, Some(CdpMaskKind::Code));
                self.write(data_register, allocation.mask.data_mask(), core_id)?;
                self.write(code_register, allocation.mask.code_mask(), core_id)?;
            } else {
                let register_id = registers::l3_mask_register(class_id, None);
                self.write(register_id, allocation.mask.data_mask(), core_id)?;
            }
        }

        Ok(())
    }

    pub(super) fn get_l3(
        &mut self,
        socket: SocketId,
        max_num_ca: usize,
    ) -> RdtResult<Vec<L3Allocation>> {
        let num_classes = self.capability.l3_num_classes()?;
        check_room(num_classes, max_num_ca, "L3")?;
        let core_id = self.socket_core(socket)?;

        (0..num_classes)
            .map(ClassId::new)
            .map(|class_id| -> RdtResult<L3Allocation> {
                if self.capability.l3_cdp_enabled {
                    let data_register =
                        registers::l3_mask_register(class_id, Some(CdpMaskKind::Data));
                    let code_register =
                        registers::l3_mask_register(class_id, Some(CdpMaskKind::Code));
                    let data_mask = self.read(data_register, core_id)?;
                    let code_mask = self.read(code_register, core_id)?;
                    Ok(L3Allocation::with_cdp(class_id, code_mask, data_mask))
                } else {
                    let register_id = registers::l3_mask_register(class_id, None);
                    Ok(L3Allocation::new(class_id, self.read(register_id, core_id)?))
                }
            })
            .collect()
    }

    pub(super) fn set_l2(&mut self, l2_id: L2Id, allocations: &[L2Allocation]) -> RdtResult<()> {
        let l2 = *self.capability.l2()?;
        let core_id = self.l2_core(l2_id)?;

        for allocation in allocations {
            check_class(allocation.class_id, l2.num_classes, "L2")?;
            check_mask_fits(
                allocation.ways_mask,
                l2.full_ways_mask(),
                allocation.class_id,
                "L2",
            )?;
        }

        for allocation in allocations {
            let register_id = registers::l2_mask_register(allocation.class_id);
            self.write(register_id, allocation.ways_mask, core_id)?;
        }

        Ok(())
    }

    pub(super) fn get_l2(&mut self, l2_id: L2Id, max_num_ca: usize) -> RdtResult<Vec<L2Allocation>> {
        let num_classes = self.capability.l2()?.num_classes;
        check_room(num_classes, max_num_ca, "L2")?;
        let core_id = self.l2_core(l2_id)?;

        (0..num_classes)
            .map(ClassId::new)
            .map(|class_id| -> RdtResult<L2Allocation> {
                let ways_mask = self.read(registers::l2_mask_register(class_id), core_id)?;
                Ok(L2Allocation::new(class_id, ways_mask))
            })
            .collect()
    }

    /// The delay is the bandwidth share taken away, rounded down to the throttling granularity.
    pub(super) fn set_mba(
        &mut self,
        socket: SocketId,
        requested: &[MbaAllocation],
    ) -> RdtResult<Vec<MbaAllocation>> {
        if requested.is_empty() {
            return Err(RdtError::invalid_param("no MBA classes of service to set"));
        }
        let mba = *self.capability.mba()?;
        let core_id = self.socket_core(socket)?;

        for allocation in requested {
            check_class(allocation.class_id, mba.num_classes, "MBA")?;
            if allocation.mb_rate == 0 || allocation.mb_rate > MbaAllocation::MAX_RATE {
                return Err(RdtError::invalid_param(format!(
                    "MBA COS{} rate {} is out of 1..=100",
                    allocation.class_id, allocation.mb_rate
                )));
            }
        }
        if !mba.is_linear {
            return Err(BackendError::unsupported("non-linear MBA").into());
        }

        let mut actual = Vec::with_capacity(requested.len());
        for allocation in requested {
            let delay = MbaAllocation::MAX_RATE - allocation.mb_rate;
            let delay = (delay / mba.throttle_step * mba.throttle_step).min(mba.throttle_max);
            self.write(
                registers::mba_register(allocation.class_id),
                delay as u64,
                core_id,
            )?;
            actual.push(MbaAllocation::new(
                allocation.class_id,
                MbaAllocation::MAX_RATE - delay,
            ));
        }

        Ok(actual)
    }

    pub(super) fn get_mba(
        &mut self,
        socket: SocketId,
        max_num_cos: usize,
    ) -> RdtResult<Vec<MbaAllocation>> {
        let num_classes = self.capability.mba()?.num_classes;
        check_room(num_classes, max_num_cos, "MBA")?;
        let core_id = self.socket_core(socket)?;

        (0..num_classes)
            .map(ClassId::new)
            .map(|class_id| -> RdtResult<MbaAllocation> {
                let delay = self.read(registers::mba_register(class_id), core_id)?;
                let delay = delay.min(MbaAllocation::MAX_RATE as u64) as u32;
                Ok(MbaAllocation::new(class_id, MbaAllocation::MAX_RATE - delay))
            })
            .collect()
    }
}
