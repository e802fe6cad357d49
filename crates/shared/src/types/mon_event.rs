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

bitflags::bitflags! {
    /// Events a monitoring group can track.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MonEvent: u32 {
        /// LLC occupancy
        const L3_OCCUP = 0x0001;
        /// Local memory bandwidth
        const LMEM_BW = 0x0002;
        /// Total memory bandwidth
        const TMEM_BW = 0x0004;
        /// Remote memory bandwidth, derived from total and local
        const RMEM_BW = 0x0008;
        /// LLC misses, counted by a general purpose performance counter
        const PERF_LLC_MISS = 0x4000;
        /// Instructions per clock, counted by fixed performance counters
        const PERF_IPC = 0x8000;
    }
}

impl MonEvent {
    /// Events backed by the resource monitoring hardware.
    pub const PRIMARY: MonEvent = MonEvent::L3_OCCUP
        .union(MonEvent::LMEM_BW)
        .union(MonEvent::TMEM_BW)
        .union(MonEvent::RMEM_BW);

    /// Events that can only ride along with a primary one.
    pub const AUXILIARY: MonEvent = MonEvent::PERF_LLC_MISS.union(MonEvent::PERF_IPC);

    pub const MBM: MonEvent = MonEvent::LMEM_BW
        .union(MonEvent::TMEM_BW)
        .union(MonEvent::RMEM_BW);

    pub fn has_primary(&self) -> bool {
        self.intersects(Self::PRIMARY)
    }

    pub fn has_auxiliary(&self) -> bool {
        self.intersects(Self::AUXILIARY)
    }
}
