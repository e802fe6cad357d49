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

use raw_cpuid::CpuId;
use raw_cpuid::CpuIdReaderNative;

use rdt_shared::types::MonEvent;

use crate::CatFeatures;
use crate::MbaFeatures;
use crate::MonFeatures;
use crate::RdtFeatures;

pub(crate) fn detect_features() -> RdtFeatures {
    let cpuid = CpuId::new();

    let features = RdtFeatures {
        l3ca: detect_l3ca(&cpuid),
        l2ca: detect_l2ca(&cpuid),
        mba: detect_mba(&cpuid),
        mon: detect_mon(&cpuid),
    };
    tracing::debug!("Detected RDT features: {features:?}");

    features
}

fn detect_l3ca(cpuid: &CpuId<CpuIdReaderNative>) -> Option<CatFeatures> {
    let info = cpuid.get_rdt_allocation_info()?;
    if !info.has_l3_cat() {
        return None;
    }

    let l3_cat = info.l3_cat()?;
    Some(CatFeatures {
        num_classes: l3_cat.highest_cos() as u32 + 1,
        num_ways: l3_cat.capacity_mask_length() as u32,
        cdp_supported: l3_cat.has_code_data_prioritization(),
    })
}

fn detect_l2ca(cpuid: &CpuId<CpuIdReaderNative>) -> Option<CatFeatures> {
    let info = cpuid.get_rdt_allocation_info()?;
    if !info.has_l2_cat() {
        return None;
    }

    let l2_cat = info.l2_cat()?;
    Some(CatFeatures {
        num_classes: l2_cat.highest_cos() as u32 + 1,
        num_ways: l2_cat.capacity_mask_length() as u32,
        cdp_supported: false,
    })
}

fn detect_mba(cpuid: &CpuId<CpuIdReaderNative>) -> Option<MbaFeatures> {
    let info = cpuid.get_rdt_allocation_info()?;
    if !info.has_memory_bandwidth_allocation() {
        return None;
    }

    let mba = info.memory_bandwidth_allocation()?;
    Some(MbaFeatures::new(
        mba.highest_cos() as u32 + 1,
        mba.max_hba_throttling() as u32,
        mba.has_linear_response_delay(),
    ))
}

fn detect_mon(cpuid: &CpuId<CpuIdReaderNative>) -> Option<MonFeatures> {
    let info = cpuid.get_rdt_monitoring_info()?;
    let l3_monitoring = info.l3_monitoring()?;

    let mut events = MonEvent::empty();
    events.set(
        MonEvent::L3_OCCUP,
        l3_monitoring.has_occupancy_monitoring(),
    );
    events.set(
        MonEvent::TMEM_BW,
        l3_monitoring.has_total_bandwidth_monitoring(),
    );
    events.set(
        MonEvent::LMEM_BW,
        l3_monitoring.has_local_bandwidth_monitoring(),
    );
    if events.contains(MonEvent::TMEM_BW | MonEvent::LMEM_BW) {
        events |= MonEvent::RMEM_BW;
    }

    // Architectural performance monitoring provides the fixed counters used for IPC
    // and the general purpose one used for LLC misses.
    if cpuid
        .get_performance_monitoring_info()
        .map(|info| info.version_id() >= 2 && info.number_of_counters() > 0)
        .unwrap_or(false)
    {
        events |= MonEvent::AUXILIARY;
    }

    Some(MonFeatures {
        max_rmid: l3_monitoring.maximum_rmid_range(),
        upscaling_factor: l3_monitoring.conversion_factor() as u64,
        events,
    })
}
