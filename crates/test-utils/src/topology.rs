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

use rdt_shared::types::CoreInfo;
use rdt_shared::types::CpuInfo;

/// Cores 0..=3 on socket 0 and 4..=7 on socket 1, every pair of cores shares an L2 cache.
pub fn two_socket_cpu_info() -> CpuInfo {
    let cores = (0u32..8)
        .map(|core_id| CoreInfo::new(core_id.into(), (core_id / 4).into(), (core_id / 2).into()))
        .collect();
    CpuInfo::new(cores)
}

/// One socket where each core has its own L2 cache.
pub fn single_socket_cpu_info(cores_count: u32) -> CpuInfo {
    let cores = (0..cores_count)
        .map(|core_id| CoreInfo::new(core_id.into(), 0.into(), core_id.into()))
        .collect();
    CpuInfo::new(cores)
}
