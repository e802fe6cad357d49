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

/// Counters of a monitoring group, updated on every poll.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MonValues {
    /// LLC occupancy in bytes.
    pub llc: u64,
    /// Local memory bandwidth in bytes, accumulated since start.
    pub mbm_local: u64,
    /// Total memory bandwidth in bytes, accumulated since start.
    pub mbm_total: u64,
    /// Remote memory bandwidth in bytes, accumulated since start.
    pub mbm_remote: u64,
    pub mbm_local_delta: u64,
    pub mbm_total_delta: u64,
    pub mbm_remote_delta: u64,
    pub ipc_retired_delta: u64,
    pub ipc_unhalted_delta: u64,
    /// Instructions retired per unhalted cycle since the previous poll.
    pub ipc: f64,
    pub llc_misses: u64,
    pub llc_misses_delta: u64,
}

impl MonValues {
    pub fn add_mbm_deltas(&mut self, local_delta: u64, total_delta: u64) {
        let remote_delta = total_delta.saturating_sub(local_delta);

        self.mbm_local_delta = local_delta;
        self.mbm_total_delta = total_delta;
        self.mbm_remote_delta = remote_delta;
        self.mbm_local += local_delta;
        self.mbm_total += total_delta;
        self.mbm_remote += remote_delta;
    }

    pub fn add_perf_deltas(&mut self, retired_delta: u64, unhalted_delta: u64, miss_delta: u64) {
        self.ipc_retired_delta = retired_delta;
        self.ipc_unhalted_delta = unhalted_delta;
        self.ipc = if unhalted_delta == 0 {
            0.0
        } else {
            retired_delta as f64 / unhalted_delta as f64
        };
        self.llc_misses_delta = miss_delta;
        self.llc_misses += miss_delta;
    }
}
