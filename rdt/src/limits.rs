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

//! Checks of requests against what the platform provides, common to both backends.

use rdt_shared::types::ClassId;

use crate::RdtError;
use crate::RdtResult;

pub(crate) fn check_class(class_id: ClassId, num_classes: u32, resource: &str) -> RdtResult<()> {
    if class_id.as_u32() >= num_classes {
        return Err(RdtError::invalid_param(format!(
            "{resource} COS{class_id} is out of range, only {num_classes} classes are available"
        )));
    }
    Ok(())
}

pub(crate) fn check_mask_fits(
    mask: u64,
    full_mask: u64,
    class_id: ClassId,
    resource: &str,
) -> RdtResult<()> {
    if mask & !full_mask != 0 {
        return Err(RdtError::invalid_param(format!(
            "{resource} COS{class_id} mask {mask:#x} exceeds the cache ways {full_mask:#x}"
        )));
    }
    Ok(())
}

/// Getters fill a caller sized table, every class must fit into it.
pub(crate) fn check_room(num_classes: u32, max_num: usize, resource: &str) -> RdtResult<()> {
    if num_classes as usize > max_num {
        return Err(RdtError::invalid_param(format!(
            "{resource} has {num_classes} classes of service, room for only {max_num}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn class_must_be_below_count() {
        assert!(check_class(ClassId::new(3), 4, "L3").is_ok());
        let error = check_class(ClassId::new(4), 4, "L3").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Param);
    }

    #[test]
    fn mask_must_fit_ways() {
        assert!(check_mask_fits(0x7FF, 0x7FF, ClassId::new(1), "L3").is_ok());
        assert!(check_mask_fits(0x800, 0x7FF, ClassId::new(1), "L3").is_err());
    }

    #[test]
    fn table_must_fit_classes() {
        assert!(check_room(8, 8, "L2").is_ok());
        assert!(check_room(8, 7, "L2").is_err());
    }
}
