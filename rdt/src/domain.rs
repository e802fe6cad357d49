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

use rdt_shared::types::CoreInfo;
use rdt_shared::types::CpuInfo;
use rdt_shared::types::L2Id;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use crate::RdtError;
use crate::RdtResult;

/// Cache and memory domains shared by a set of cores being assigned a class of service.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct AssignDomain {
    pub(crate) technology: Technology,
    pub(crate) socket: SocketId,
    pub(crate) l2_id: L2Id,
}

pub(crate) fn core_info(cpu_info: &CpuInfo, core_id: LogicalCoreId) -> RdtResult<&CoreInfo> {
    cpu_info
        .core(core_id)
        .ok_or_else(|| RdtError::invalid_param(format!("logical core {core_id} doesn't exist")))
}

pub(crate) fn check_cores_exist(cpu_info: &CpuInfo, core_ids: &[LogicalCoreId]) -> RdtResult<()> {
    core_ids
        .iter()
        .try_for_each(|&core_id| core_info(cpu_info, core_id).map(|_| ()))
}

/// Classes of service are per socket for L3 and MBA and per L2 cluster for L2,
/// so all cores must belong to the same domains of the requested technologies.
pub(crate) fn assign_domain(
    cpu_info: &CpuInfo,
    technology: Technology,
    core_ids: &[LogicalCoreId],
) -> RdtResult<AssignDomain> {
    let (first_core_id, rest) = core_ids
        .split_first()
        .ok_or_else(|| RdtError::invalid_param("no cores to assign"))?;
    let first = *core_info(cpu_info, *first_core_id)?;

    for &core_id in rest {
        let core = core_info(cpu_info, core_id)?;
        if technology.intersects(Technology::L3CA | Technology::MBA) && core.socket != first.socket
        {
            return Err(RdtError::invalid_param(format!(
                "cores {first_core_id} and {core_id} are on different sockets"
            )));
        }
        if technology.contains(Technology::L2CA) && core.l2_id != first.l2_id {
            return Err(RdtError::invalid_param(format!(
                "cores {first_core_id} and {core_id} don't share an L2 cache"
            )));
        }
    }

    Ok(AssignDomain {
        technology,
        socket: first.socket,
        l2_id: first.l2_id,
    })
}

impl AssignDomain {
    /// All cores whose class of service is shared with the domain.
    pub(crate) fn cores(&self, cpu_info: &CpuInfo) -> BTreeSet<LogicalCoreId> {
        let mut cores = BTreeSet::new();
        if self
            .technology
            .intersects(Technology::L3CA | Technology::MBA)
        {
            cores.extend(cpu_info.cores_on_socket(self.socket));
        }
        if self.technology.contains(Technology::L2CA) {
            cores.extend(cpu_info.cores_in_l2(self.l2_id));
        }
        cores
    }
}
