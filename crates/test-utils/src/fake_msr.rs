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

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use rdt_msr::MSRError;
use rdt_msr::MSRResult;
use rdt_msr::MsrAccess;
use rdt_shared::types::LogicalCoreId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MsrWrite {
    pub register_id: u32,
    pub value: u64,
    pub core_id: LogicalCoreId,
}

#[derive(Debug, Default)]
struct FakeMsrState {
    registers: HashMap<(u32, LogicalCoreId), u64>,
    writes: Vec<MsrWrite>,
    broken_registers: HashSet<u32>,
}

/// In-memory register file, clones share the same registers.
/// Registers never written read as zero.
#[derive(Clone, Debug, Default)]
pub struct FakeMsr {
    state: Arc<Mutex<FakeMsrState>>,
}

impl FakeMsr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, register_id: u32, core_id: impl Into<LogicalCoreId>, value: u64) {
        self.state
            .lock()
            .registers
            .insert((register_id, core_id.into()), value);
    }

    pub fn get(&self, register_id: u32, core_id: impl Into<LogicalCoreId>) -> u64 {
        self.state
            .lock()
            .registers
            .get(&(register_id, core_id.into()))
            .copied()
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<MsrWrite> {
        self.state.lock().writes.clone()
    }

    pub fn writes_to(&self, register_id: u32) -> Vec<MsrWrite> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|write| write.register_id == register_id)
            .copied()
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Every further access to the register fails.
    pub fn break_register(&self, register_id: u32) {
        self.state.lock().broken_registers.insert(register_id);
    }
}

impl MsrAccess for FakeMsr {
    fn read(&self, register_id: u32, core_id: LogicalCoreId) -> MSRResult<u64> {
        let state = self.state.lock();
        if state.broken_registers.contains(&register_id) {
            return Err(MSRError::Unsupported {
                register_id,
                core_id,
            });
        }

        Ok(state
            .registers
            .get(&(register_id, core_id))
            .copied()
            .unwrap_or_default())
    }

    fn write(&self, register_id: u32, value: u64, core_id: LogicalCoreId) -> MSRResult<()> {
        let mut state = self.state.lock();
        if state.broken_registers.contains(&register_id) {
            return Err(MSRError::Unsupported {
                register_id,
                core_id,
            });
        }

        state.registers.insert((register_id, core_id), value);
        state.writes.push(MsrWrite {
            register_id,
            value,
            core_id,
        });
        Ok(())
    }
}
