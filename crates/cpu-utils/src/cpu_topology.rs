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

use std::collections::BTreeMap;

use crate::errors::CPUTopologyError;
use crate::CTResult;
use crate::CoreInfo;
use crate::CpuInfo;
use crate::L2Id;
use crate::LogicalCoreId;
use crate::SocketId;

#[derive(Debug)]
pub struct CPUTopology {
    topology: hwlocality::Topology,
}

impl CPUTopology {
    pub fn new() -> CTResult<Self> {
        let topology = hwlocality::Topology::new()?;
        Ok(Self { topology })
    }

    /// Builds a flat description of every logical core: which package it sits on
    /// and which L2 cache it shares with its siblings.
    pub fn cpu_info(&self) -> CTResult<CpuInfo> {
        let sockets = self.logical_cores_per_socket()?;
        let l2_clusters = self.logical_cores_per_l2();

        let cores = sockets
            .into_iter()
            .map(|(core_id, socket)| {
                // Some virtualized platforms don't expose L2 caches, then every core is
                // treated as its own cluster.
                let l2_id = l2_clusters
                    .get(&core_id)
                    .copied()
                    .unwrap_or_else(|| L2Id::new(core_id.into()));
                CoreInfo::new(core_id, socket, l2_id)
            })
            .collect::<Vec<_>>();

        Ok(CpuInfo::new(cores))
    }

    fn logical_cores_per_socket(&self) -> CTResult<BTreeMap<LogicalCoreId, SocketId>> {
        use hwlocality::object::types::ObjectType;

        let mut result = BTreeMap::new();
        for package in self.topology.objects_with_type(ObjectType::Package) {
            let socket_id = SocketId::from(package.logical_index() as u32);
            let package_cpuset = package
                .cpuset()
                .ok_or(CPUTopologyError::cpuset_not_found(socket_id))?;

            for core_id in package_cpuset.into_iter().map(usize::from) {
                result.insert(LogicalCoreId::from(core_id as u32), socket_id);
            }
        }

        if result.is_empty() {
            return Err(CPUTopologyError::SocketsNotFound);
        }

        Ok(result)
    }

    fn logical_cores_per_l2(&self) -> BTreeMap<LogicalCoreId, L2Id> {
        use hwlocality::object::types::ObjectType;

        let mut result = BTreeMap::new();
        for l2_cache in self.topology.objects_with_type(ObjectType::L2Cache) {
            let l2_id = L2Id::from(l2_cache.logical_index() as u32);
            let Some(l2_cpuset) = l2_cache.cpuset() else {
                continue;
            };

            for core_id in l2_cpuset.into_iter().map(usize::from) {
                result.insert(LogicalCoreId::from(core_id as u32), l2_id);
            }
        }

        result
    }
}
