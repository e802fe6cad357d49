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

//! RDT register map, see Intel SDM Vol. 3B, "Intel Resource Director Technology".

use rdt_shared::types::ClassId;
use rdt_shared::types::Rmid;

/// Associates an RMID and a class of service with a logical core.
pub const IA32_PQR_ASSOC: u32 = 0xC8F;
/// Bit 0 enables L3 Code/Data Prioritization.
pub const IA32_L3_QOS_CFG: u32 = 0xC81;
pub const IA32_L3_MASK_0: u32 = 0xC90;
pub const IA32_L2_MASK_0: u32 = 0xD10;
pub const IA32_MBA_THRTL_0: u32 = 0xD50;
pub const IA32_QM_EVTSEL: u32 = 0xC8D;
pub const IA32_QM_CTR: u32 = 0xC8E;

pub const IA32_PMC0: u32 = 0xC1;
pub const IA32_PERFEVTSEL0: u32 = 0x186;
/// Instructions retired.
pub const IA32_FIXED_CTR0: u32 = 0x309;
/// Unhalted core cycles.
pub const IA32_FIXED_CTR1: u32 = 0x30A;
pub const IA32_FIXED_CTR_CTRL: u32 = 0x38D;
pub const IA32_PERF_GLOBAL_CTRL: u32 = 0x38F;

pub const PQR_ASSOC_RMID_MASK: u64 = (1 << 10) - 1;
pub const PQR_ASSOC_COS_SHIFT: u32 = 32;
pub const PQR_ASSOC_COS_MASK: u64 = 0xFFFF_FFFF << PQR_ASSOC_COS_SHIFT;

pub const L3_QOS_CFG_CDP_ENABLE: u64 = 1;

pub const QM_EVTSEL_RMID_SHIFT: u32 = 32;
pub const QM_EVTSEL_RMID_MASK: u64 = (1 << 10) - 1;
pub const QM_CTR_ERROR: u64 = 1 << 63;
pub const QM_CTR_UNAVAILABLE: u64 = 1 << 62;
pub const QM_CTR_DATA_MASK: u64 = (1 << 62) - 1;

/// Width of the memory bandwidth counters, they wrap around quite often.
pub const MBM_COUNTER_WIDTH: u32 = 24;
/// Width of the fixed and general purpose performance counters.
pub const PERF_COUNTER_WIDTH: u32 = 48;

/// Enables fixed counters 0 and 1 in both user and kernel mode.
pub const FIXED_CTR_CTRL_ENABLE: u64 = 0x33;
/// Enables PMC0 and fixed counters 0 and 1.
pub const PERF_GLOBAL_CTRL_ENABLE: u64 = (0x3 << 32) | 0x1;
/// LONGEST_LAT_CACHE.MISS with USR, OS and EN bits set.
pub const PERFEVTSEL_LLC_MISS: u64 = 0x2E | (0x41 << 8) | (1 << 16) | (1 << 17) | (1 << 22);

/// Event ids understood by IA32_QM_EVTSEL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QmEvent {
    LlcOccupancy = 1,
    TotalBandwidth = 2,
    LocalBandwidth = 3,
}

pub fn pqr_assoc_class(value: u64) -> ClassId {
    ClassId::new((value >> PQR_ASSOC_COS_SHIFT) as u32)
}

pub fn pqr_assoc_rmid(value: u64) -> Rmid {
    Rmid::new((value & PQR_ASSOC_RMID_MASK) as u32)
}

pub fn pqr_assoc_class_bits(class_id: ClassId) -> u64 {
    (class_id.as_u32() as u64) << PQR_ASSOC_COS_SHIFT
}

pub fn pqr_assoc_rmid_bits(rmid: Rmid) -> u64 {
    rmid.as_u32() as u64 & PQR_ASSOC_RMID_MASK
}

/// Mask register of a class, with CDP on even registers hold data masks and odd ones code masks.
pub fn l3_mask_register(class_id: ClassId, cdp: Option<CdpMaskKind>) -> u32 {
    match cdp {
        None => IA32_L3_MASK_0 + class_id.as_u32(),
        Some(CdpMaskKind::Data) => IA32_L3_MASK_0 + class_id.as_u32() * 2,
        Some(CdpMaskKind::Code) => IA32_L3_MASK_0 + class_id.as_u32() * 2 + 1,
    }
}

pub fn l2_mask_register(class_id: ClassId) -> u32 {
    IA32_L2_MASK_0 + class_id.as_u32()
}

pub fn mba_register(class_id: ClassId) -> u32 {
    IA32_MBA_THRTL_0 + class_id.as_u32()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CdpMaskKind {
    Code,
    Data,
}

pub fn qm_evtsel(rmid: Rmid, event: QmEvent) -> u64 {
    ((rmid.as_u32() as u64 & QM_EVTSEL_RMID_MASK) << QM_EVTSEL_RMID_SHIFT) | event as u64
}

/// Extracts the counter data, None if the hardware flagged the read as failed.
pub fn qm_ctr_data(value: u64) -> Option<u64> {
    if value & (QM_CTR_ERROR | QM_CTR_UNAVAILABLE) != 0 {
        return None;
    }

    Some(value & QM_CTR_DATA_MASK)
}

/// Difference between two readings of a counter of the given width that may have wrapped around.
pub fn counter_delta(old_value: u64, new_value: u64, width: u32) -> u64 {
    let mask = if width >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    new_value.wrapping_sub(old_value) & mask
}
