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

mod allocation;
mod cdp_config;
mod ids;
mod mon_event;
mod mon_values;
mod technology;

pub use allocation::L2Allocation;
pub use allocation::L3Allocation;
pub use allocation::L3Mask;
pub use allocation::MbaAllocation;
pub use cdp_config::CdpConfig;
pub use cdp_config::InvalidCdpConfig;
pub use ids::ClassId;
pub use ids::Pid;
pub use ids::Rmid;
pub use mon_event::MonEvent;
pub use mon_values::MonValues;
pub use technology::Technology;

pub use cpu_utils::CoreInfo;
pub use cpu_utils::CpuInfo;
pub use cpu_utils::L2Id;
pub use cpu_utils::LogicalCoreId;
pub use cpu_utils::SocketId;
