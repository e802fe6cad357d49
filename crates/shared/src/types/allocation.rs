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

use serde::Deserialize;
use serde::Serialize;

use super::ClassId;

/// L3 capacity bit mask of a class of service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum L3Mask {
    /// One mask for both code and data fetches.
    Ways(u64),
    /// Code/Data Prioritization is on, code and data fetches are restricted independently.
    CodeData { code_mask: u64, data_mask: u64 },
}

impl L3Mask {
    pub fn is_cdp(&self) -> bool {
        matches!(self, L3Mask::CodeData { .. })
    }

    pub fn code_mask(&self) -> u64 {
        match *self {
            L3Mask::Ways(ways_mask) => ways_mask,
            L3Mask::CodeData { code_mask, .. } => code_mask,
        }
    }

    pub fn data_mask(&self) -> u64 {
        match *self {
            L3Mask::Ways(ways_mask) => ways_mask,
            L3Mask::CodeData { data_mask, .. } => data_mask,
        }
    }

    /// Every mask this entry consists of.
    pub fn masks(&self) -> impl Iterator<Item = u64> {
        let masks = match *self {
            L3Mask::Ways(ways_mask) => [Some(ways_mask), None],
            L3Mask::CodeData {
                code_mask,
                data_mask,
            } => [Some(data_mask), Some(code_mask)],
        };
        masks.into_iter().flatten()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct L3Allocation {
    pub class_id: ClassId,
    pub mask: L3Mask,
}

impl L3Allocation {
    pub fn new(class_id: impl Into<ClassId>, ways_mask: u64) -> Self {
        Self {
            class_id: class_id.into(),
            mask: L3Mask::Ways(ways_mask),
        }
    }

    pub fn with_cdp(class_id: impl Into<ClassId>, code_mask: u64, data_mask: u64) -> Self {
        Self {
            class_id: class_id.into(),
            mask: L3Mask::CodeData {
                code_mask,
                data_mask,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct L2Allocation {
    pub class_id: ClassId,
    pub ways_mask: u64,
}

impl L2Allocation {
    pub fn new(class_id: impl Into<ClassId>, ways_mask: u64) -> Self {
        Self {
            class_id: class_id.into(),
            ways_mask,
        }
    }
}

/// Memory bandwidth allocation of a class of service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MbaAllocation {
    pub class_id: ClassId,
    /// Percentage of the memory bandwidth available to the class, 1..=100.
    pub mb_rate: u32,
}

impl MbaAllocation {
    pub const MAX_RATE: u32 = 100;

    pub fn new(class_id: impl Into<ClassId>, mb_rate: u32) -> Self {
        Self {
            class_id: class_id.into(),
            mb_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mask_is_used_for_code_and_data() {
        let mask = L3Mask::Ways(0xF0);

        assert!(!mask.is_cdp());
        assert_eq!(mask.code_mask(), 0xF0);
        assert_eq!(mask.data_mask(), 0xF0);
        assert_eq!(mask.masks().collect::<Vec<_>>(), vec![0xF0]);
    }

    #[test]
    fn cdp_mask_yields_both_masks() {
        let allocation = L3Allocation::with_cdp(3, 0x0F, 0xF0);

        assert!(allocation.mask.is_cdp());
        assert_eq!(allocation.mask.masks().collect::<Vec<_>>(), vec![0xF0, 0x0F]);
    }
}
