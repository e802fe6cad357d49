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

/// This module is a stub implementation to allow the code to compile on non-x86_64 archs,
/// every register access fails.
use rdt_shared::types::LogicalCoreId;

use crate::MSRError;
use crate::MSRResult;
use crate::MsrAccess;
use crate::RdtFeatures;

#[derive(Copy, Clone, Debug, Default)]
pub struct DevCpuMsr;

impl DevCpuMsr {
    pub fn new() -> Self {
        Self
    }
}

impl MsrAccess for DevCpuMsr {
    fn read(&self, register_id: u32, core_id: LogicalCoreId) -> MSRResult<u64> {
        Err(MSRError::unsupported(register_id, core_id))
    }

    fn write(&self, register_id: u32, _value: u64, core_id: LogicalCoreId) -> MSRResult<()> {
        Err(MSRError::unsupported(register_id, core_id))
    }
}

pub(crate) fn detect_features() -> RdtFeatures {
    RdtFeatures::default()
}
