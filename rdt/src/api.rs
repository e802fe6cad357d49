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

use once_cell::sync::Lazy;

use cpu_utils::CPUTopology;
use cpu_utils::CpuInfo;
use rdt_config::RdtConfig;
use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Pid;
use rdt_shared::types::Rmid;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use crate::contiguity::is_contiguous;
use crate::gate::Gate;
use crate::monitoring::check_event;
use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::monitoring::MonTarget;
use crate::BackendError;
use crate::Backends;
use crate::PidMonitor;
use crate::RdtError;
use crate::RdtResult;

#[cfg(test)]
mod spy;
#[cfg(test)]
mod tests;

static GLOBAL: Lazy<RdtApi> = Lazy::new(RdtApi::new);

/// The process-wide instance.
pub fn global() -> &'static RdtApi {
    &GLOBAL
}

/// Entry point for allocation and monitoring requests.
///
/// Every operation is serialized, validated and then handed to exactly one backend:
/// the hardware or the OS one, as the backend selector decides on each call.
/// MBA and RMID association requests always go to the hardware backend.
pub struct RdtApi {
    gate: Gate,
}

impl Default for RdtApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RdtApi {
    pub fn new() -> Self {
        Self { gate: Gate::new() }
    }

    pub fn init(&self, backends: Backends) -> RdtResult<()> {
        self.gate.init(backends)?;
        tracing::info!("RDT control initialized");
        Ok(())
    }

    /// Initializes with the MSR and resctrl backends on the detected topology.
    pub fn init_from_config(&self, config: &RdtConfig) -> RdtResult<()> {
        if self.is_initialized() {
            return Err(RdtError::AlreadyInitialized);
        }

        let cpu_info = CPUTopology::new()?.cpu_info()?;
        self.init_with_cpu_info(config, cpu_info)
    }

    /// Same as [`Self::init_from_config`], for callers that already read the topology.
    pub fn init_with_cpu_info(&self, config: &RdtConfig, cpu_info: CpuInfo) -> RdtResult<()> {
        if self.is_initialized() {
            return Err(RdtError::AlreadyInitialized);
        }

        let backends = crate::setup::build_backends(config, cpu_info)?;
        self.init(backends)
    }

    pub fn fini(&self) -> RdtResult<()> {
        let _backends = self.gate.fini()?;
        tracing::info!("RDT control shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.is_initialized()
    }

    pub fn alloc_assoc_set(&self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()> {
        self.gate
            .enter(|backends| backends.selected().alloc_assoc_set(core_id, class_id))
    }

    pub fn alloc_assoc_get(&self, core_id: LogicalCoreId) -> RdtResult<ClassId> {
        self.gate
            .enter(|backends| backends.selected().alloc_assoc_get(core_id))
    }

    /// Finds an unused class of service for the technologies and associates the cores with it.
    pub fn alloc_assign(
        &self,
        technology: Technology,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId> {
        if technology.is_empty() || Technology::from_bits(technology.bits()).is_none() {
            return Err(RdtError::invalid_param(format!(
                "invalid technology mask {:#x}",
                technology.bits()
            )));
        }
        if core_ids.is_empty() {
            return Err(RdtError::invalid_param("no cores to assign"));
        }

        self.gate
            .enter(|backends| backends.selected().alloc_assign(technology, core_ids))
    }

    pub fn alloc_release(&self, core_ids: &[LogicalCoreId]) -> RdtResult<()> {
        if core_ids.is_empty() {
            return Err(RdtError::invalid_param("no cores to release"));
        }

        self.gate
            .enter(|backends| backends.selected().alloc_release(core_ids))
    }

    /// Restores default allocation: full masks, no throttling, every core in the default class.
    pub fn alloc_reset(&self, l3_cdp: CdpConfig) -> RdtResult<()> {
        self.gate
            .enter(|backends| backends.selected().alloc_reset(l3_cdp))
    }

    /// Same as [`RdtApi::alloc_reset`] with the L3 CDP requirement in its raw form.
    pub fn alloc_reset_raw(&self, l3_cdp: u32) -> RdtResult<()> {
        let l3_cdp = CdpConfig::try_from(l3_cdp)?;
        self.alloc_reset(l3_cdp)
    }

    pub fn l3ca_set(&self, socket: SocketId, allocations: &[L3Allocation]) -> RdtResult<()> {
        if allocations.is_empty() {
            return Err(RdtError::invalid_param("no L3 classes of service to set"));
        }

        self.gate.enter(|backends| {
            check_l3_masks(allocations)?;
            backends.selected().l3ca_set(socket, allocations)
        })
    }

    pub fn l3ca_get(&self, socket: SocketId, max_num_ca: usize) -> RdtResult<Vec<L3Allocation>> {
        if max_num_ca == 0 {
            return Err(RdtError::invalid_param("no room for L3 classes of service"));
        }

        self.gate
            .enter(|backends| backends.selected().l3ca_get(socket, max_num_ca))
    }

    pub fn l2ca_set(&self, l2_id: L2Id, allocations: &[L2Allocation]) -> RdtResult<()> {
        if allocations.is_empty() {
            return Err(RdtError::invalid_param("no L2 classes of service to set"));
        }

        self.gate.enter(|backends| {
            check_l2_masks(allocations)?;
            backends.selected().l2ca_set(l2_id, allocations)
        })
    }

    pub fn l2ca_get(&self, l2_id: L2Id, max_num_ca: usize) -> RdtResult<Vec<L2Allocation>> {
        if max_num_ca == 0 {
            return Err(RdtError::invalid_param("no room for L2 classes of service"));
        }

        self.gate
            .enter(|backends| backends.selected().l2ca_get(l2_id, max_num_ca))
    }

    /// Returns the rates actually programmed.
    pub fn mba_set(
        &self,
        socket: SocketId,
        requested: &[MbaAllocation],
    ) -> RdtResult<Vec<MbaAllocation>> {
        self.gate
            .enter(|backends| backends.hardware().mba_set(socket, requested))
    }

    pub fn mba_get(&self, socket: SocketId, max_num_cos: usize) -> RdtResult<Vec<MbaAllocation>> {
        self.gate
            .enter(|backends| backends.hardware().mba_get(socket, max_num_cos))
    }

    pub fn mon_reset(&self) -> RdtResult<()> {
        self.gate.enter(|backends| backends.hardware().mon_reset())
    }

    pub fn mon_assoc_get(&self, core_id: LogicalCoreId) -> RdtResult<Rmid> {
        self.gate
            .enter(|backends| backends.hardware().mon_assoc_get(core_id))
    }

    /// Starts monitoring of the cores, the group becomes active on success.
    pub fn mon_start(
        &self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        if core_ids.is_empty() {
            return Err(RdtError::invalid_param("no cores to monitor"));
        }
        check_event(event)?;
        check_inactive(group)?;

        self.gate.enter(|backends| {
            backends
                .selected()
                .mon_start(core_ids, event, context, group)?;
            group.activate();
            Ok(())
        })
    }

    /// Starts monitoring of a process, the group becomes active on success.
    ///
    /// The group is cleared and filled with the request before dispatching,
    /// so after a failure it still shows what was asked for.
    pub fn mon_start_pid(
        &self,
        pid: Pid,
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        if pid.is_negative() {
            return Err(RdtError::invalid_param(format!("invalid pid {pid}")));
        }
        check_event(event)?;
        check_inactive(group)?;

        self.gate.enter(|backends| {
            group.reset();
            group.populate(event, MonTarget::Pid(pid), context)?;

            if backends.use_hardware() {
                pid_monitor(backends)?.pid_start(group)?;
            } else {
                backends.os().mon_start_pid(group)?;
            }

            group.activate();
            Ok(())
        })
    }

    pub fn mon_stop(&self, group: &mut MonGroup) -> RdtResult<()> {
        check_active(group)?;

        self.gate.enter(|backends| {
            if !backends.use_hardware() {
                backends.os().mon_stop(group)?;
            } else if group.pid().is_some() {
                pid_monitor(backends)?.pid_stop(group)?;
            } else {
                backends.hardware().mon_stop(group)?;
            }

            group.deactivate();
            Ok(())
        })
    }

    /// Refreshes the values of every group, all of them have to be active.
    pub fn mon_poll(&self, groups: &mut [&mut MonGroup]) -> RdtResult<()> {
        if groups.is_empty() {
            return Err(RdtError::invalid_param("no groups to poll"));
        }
        for (idx, group) in groups.iter().enumerate() {
            if !group.is_active() {
                tracing::error!("monitoring group {idx} of the batch is not active");
                return Err(RdtError::invalid_param(format!(
                    "monitoring group {idx} of the batch is not active"
                )));
            }
        }

        self.gate.enter(|backends| {
            if !backends.use_hardware() {
                return backends.os().mon_poll(groups);
            }

            let (mut pid_groups, mut core_groups): (Vec<&mut MonGroup>, Vec<&mut MonGroup>) =
                groups
                    .iter_mut()
                    .map(|group| &mut **group)
                    .partition(|group| group.pid().is_some());
            // Nothing is polled unless every group of the batch has a backend.
            if !pid_groups.is_empty() {
                pid_monitor(backends)?;
            }
            if !core_groups.is_empty() {
                backends.hardware().mon_poll(&mut core_groups)?;
            }
            if !pid_groups.is_empty() {
                pid_monitor(backends)?.pid_poll(&mut pid_groups)?;
            }
            Ok(())
        })
    }
}

fn check_l3_masks(allocations: &[L3Allocation]) -> RdtResult<()> {
    match allocations
        .iter()
        .find(|allocation| !allocation.mask.masks().all(is_contiguous))
    {
        Some(allocation) => {
            tracing::error!("L3 COS{} bit mask is not contiguous!", allocation.class_id);
            Err(RdtError::invalid_param(format!(
                "L3 COS{} bit mask is not contiguous",
                allocation.class_id
            )))
        }
        None => Ok(()),
    }
}

fn check_l2_masks(allocations: &[L2Allocation]) -> RdtResult<()> {
    match allocations
        .iter()
        .find(|allocation| !is_contiguous(allocation.ways_mask))
    {
        Some(allocation) => {
            tracing::error!("L2 COS{} bit mask is not contiguous!", allocation.class_id);
            Err(RdtError::invalid_param(format!(
                "L2 COS{} bit mask is not contiguous",
                allocation.class_id
            )))
        }
        None => Ok(()),
    }
}

fn check_inactive(group: &MonGroup) -> RdtResult<()> {
    if group.is_active() {
        return Err(RdtError::invalid_param("monitoring group is already active"));
    }
    Ok(())
}

fn check_active(group: &MonGroup) -> RdtResult<()> {
    if !group.is_active() {
        return Err(RdtError::invalid_param("monitoring group is not active"));
    }
    Ok(())
}

fn pid_monitor(backends: &mut Backends) -> RdtResult<&mut (dyn PidMonitor + 'static)> {
    backends.pid_monitor().ok_or_else(|| {
        tracing::error!("PID monitoring API not built");
        BackendError::not_built("PID monitoring API").into()
    })
}
