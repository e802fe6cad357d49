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

use rdt_shared::types::MonEvent;

/// Cache allocation parameters of one cache level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CatFeatures {
    pub num_classes: u32,
    pub num_ways: u32,
    pub cdp_supported: bool,
}

impl CatFeatures {
    /// Mask with every way of the cache set.
    pub fn full_ways_mask(&self) -> u64 {
        if self.num_ways >= u64::BITS {
            u64::MAX
        } else {
            (1u64 << self.num_ways) - 1
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MbaFeatures {
    pub num_classes: u32,
    /// Maximal throttling delay supported.
    pub throttle_max: u32,
    /// Granularity of the throttling delay.
    pub throttle_step: u32,
    pub is_linear: bool,
}

impl MbaFeatures {
    pub fn new(num_classes: u32, throttle_max: u32, is_linear: bool) -> Self {
        let throttle_step = 100u32.saturating_sub(throttle_max).max(1);
        Self {
            num_classes,
            throttle_max,
            throttle_step,
            is_linear,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MonFeatures {
    /// Highest RMID the platform supports.
    pub max_rmid: u32,
    /// Multiplier converting raw counter values into bytes.
    pub upscaling_factor: u64,
    pub events: MonEvent,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RdtFeatures {
    pub l3ca: Option<CatFeatures>,
    pub l2ca: Option<CatFeatures>,
    pub mba: Option<MbaFeatures>,
    pub mon: Option<MonFeatures>,
}

impl RdtFeatures {
    /// Reads RDT capabilities of the current CPU, this method should typically be called only once.
    pub fn detect() -> Self {
        crate::msr_impl::detect_features()
    }
}
