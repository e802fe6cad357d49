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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MbaAllocation;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Rmid;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::monitoring::MonTarget;
use crate::BackendError;
use crate::BackendSelector;
use crate::HwBackend;
use crate::OsBackend;
use crate::PidMonitor;
use crate::RdtBackend;
use crate::RdtResult;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Origin {
    Hardware,
    Os,
    PidMonitor,
}

/// Calls seen by the spies, shared between all of them.
#[derive(Clone, Debug, Default)]
pub(super) struct CallLog {
    calls: Arc<Mutex<Vec<(Origin, &'static str)>>>,
}

impl CallLog {
    fn record(&self, origin: Origin, operation: &'static str) {
        self.calls.lock().push((origin, operation));
    }

    pub(super) fn calls(&self) -> Vec<(Origin, &'static str)> {
        self.calls.lock().clone()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// Records every call and either succeeds with canned values or fails.
pub(super) struct SpyBackend {
    origin: Origin,
    log: CallLog,
    fail: bool,
}

impl SpyBackend {
    pub(super) fn new(origin: Origin, log: CallLog) -> Self {
        Self {
            origin,
            log,
            fail: false,
        }
    }

    pub(super) fn failing(origin: Origin, log: CallLog) -> Self {
        Self {
            origin,
            log,
            fail: true,
        }
    }

    fn outcome(&self, operation: &'static str) -> RdtResult<()> {
        self.log.record(self.origin, operation);
        if self.fail {
            return Err(BackendError::unsupported(operation).into());
        }
        Ok(())
    }
}

impl RdtBackend for SpyBackend {
    fn alloc_assoc_set(&mut self, _core_id: LogicalCoreId, _class_id: ClassId) -> RdtResult<()> {
        self.outcome("alloc_assoc_set")
    }

    fn alloc_assoc_get(&mut self, _core_id: LogicalCoreId) -> RdtResult<ClassId> {
        self.outcome("alloc_assoc_get").map(|_| ClassId::new(1))
    }

    fn alloc_assign(
        &mut self,
        _technology: Technology,
        _core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId> {
        self.outcome("alloc_assign").map(|_| ClassId::new(3))
    }

    fn alloc_release(&mut self, _core_ids: &[LogicalCoreId]) -> RdtResult<()> {
        self.outcome("alloc_release")
    }

    fn alloc_reset(&mut self, _l3_cdp: CdpConfig) -> RdtResult<()> {
        self.outcome("alloc_reset")
    }

    fn l3ca_set(&mut self, _socket: SocketId, _allocations: &[L3Allocation]) -> RdtResult<()> {
        self.outcome("l3ca_set")
    }

    fn l3ca_get(&mut self, _socket: SocketId, _max_num_ca: usize) -> RdtResult<Vec<L3Allocation>> {
        self.outcome("l3ca_get")
            .map(|_| vec![L3Allocation::new(0, 0xFF)])
    }

    fn l2ca_set(&mut self, _l2_id: L2Id, _allocations: &[L2Allocation]) -> RdtResult<()> {
        self.outcome("l2ca_set")
    }

    fn l2ca_get(&mut self, _l2_id: L2Id, _max_num_ca: usize) -> RdtResult<Vec<L2Allocation>> {
        self.outcome("l2ca_get")
            .map(|_| vec![L2Allocation::new(0, 0xF)])
    }

    fn mon_start(
        &mut self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        self.outcome("mon_start")?;
        group.populate(event, MonTarget::Cores(core_ids.to_vec()), context)?;
        Ok(())
    }

    fn mon_stop(&mut self, _group: &mut MonGroup) -> RdtResult<()> {
        self.outcome("mon_stop")
    }

    fn mon_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()> {
        self.outcome("mon_poll")?;
        for group in groups.iter_mut() {
            group.values_mut().llc += 1;
        }
        Ok(())
    }
}

impl HwBackend for SpyBackend {
    fn mba_set(
        &mut self,
        _socket: SocketId,
        requested: &[MbaAllocation],
    ) -> RdtResult<Vec<MbaAllocation>> {
        self.outcome("mba_set").map(|_| requested.to_vec())
    }

    fn mba_get(
        &mut self,
        _socket: SocketId,
        _max_num_cos: usize,
    ) -> RdtResult<Vec<MbaAllocation>> {
        self.outcome("mba_get")
            .map(|_| vec![MbaAllocation::new(0, MbaAllocation::MAX_RATE)])
    }

    fn mon_reset(&mut self) -> RdtResult<()> {
        self.outcome("mon_reset")
    }

    fn mon_assoc_get(&mut self, _core_id: LogicalCoreId) -> RdtResult<Rmid> {
        self.outcome("mon_assoc_get").map(|_| Rmid::new(1))
    }
}

impl OsBackend for SpyBackend {
    fn mon_start_pid(&mut self, _group: &mut MonGroup) -> RdtResult<()> {
        self.outcome("mon_start_pid")
    }
}

pub(super) struct SpyPidMonitor {
    log: CallLog,
}

impl SpyPidMonitor {
    pub(super) fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl PidMonitor for SpyPidMonitor {
    fn pid_start(&mut self, _group: &mut MonGroup) -> RdtResult<()> {
        self.log.record(Origin::PidMonitor, "pid_start");
        Ok(())
    }

    fn pid_stop(&mut self, _group: &mut MonGroup) -> RdtResult<()> {
        self.log.record(Origin::PidMonitor, "pid_stop");
        Ok(())
    }

    fn pid_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()> {
        self.log.record(Origin::PidMonitor, "pid_poll");
        for group in groups.iter_mut() {
            group.values_mut().llc += 10;
        }
        Ok(())
    }
}

/// Selector that can be flipped from a test and counts how often it was asked.
#[derive(Clone, Debug, Default)]
pub(super) struct SwitchSelector {
    use_hardware: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
}

impl SwitchSelector {
    pub(super) fn set_hardware(&self, use_hardware: bool) {
        self.use_hardware.store(use_hardware, Ordering::SeqCst);
    }

    pub(super) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl BackendSelector for SwitchSelector {
    fn use_hardware(&self) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.use_hardware.load(Ordering::SeqCst)
    }
}
