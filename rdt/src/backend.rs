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
use crate::RdtResult;

/// Operations both the hardware and the OS backends provide.
///
/// Backends receive already validated input: non-empty core lists and tables,
/// contiguous masks, valid event masks and groups in the right state.
pub trait RdtBackend: Send {
    fn alloc_assoc_set(&mut self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()>;

    fn alloc_assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<ClassId>;

    /// Picks an unused class of service and associates the cores with it.
    fn alloc_assign(
        &mut self,
        technology: Technology,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId>;

    /// Moves the cores back to the default class of service.
    fn alloc_release(&mut self, core_ids: &[LogicalCoreId]) -> RdtResult<()>;

    fn alloc_reset(&mut self, l3_cdp: CdpConfig) -> RdtResult<()>;

    fn l3ca_set(&mut self, socket: SocketId, allocations: &[L3Allocation]) -> RdtResult<()>;

    fn l3ca_get(&mut self, socket: SocketId, max_num_ca: usize) -> RdtResult<Vec<L3Allocation>>;

    fn l2ca_set(&mut self, l2_id: L2Id, allocations: &[L2Allocation]) -> RdtResult<()>;

    fn l2ca_get(&mut self, l2_id: L2Id, max_num_ca: usize) -> RdtResult<Vec<L2Allocation>>;

    /// Starts monitoring and fills the event, target, context and bookkeeping of the group.
    fn mon_start(
        &mut self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()>;

    fn mon_stop(&mut self, group: &mut MonGroup) -> RdtResult<()>;

    fn mon_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()>;
}

/// Gives a view of a backend as a plain [`RdtBackend`].
pub trait AsRdtBackend {
    fn as_rdt_backend(&mut self) -> &mut dyn RdtBackend;
}

impl<T: RdtBackend> AsRdtBackend for T {
    fn as_rdt_backend(&mut self) -> &mut dyn RdtBackend {
        self
    }
}

/// Backend programming the RDT registers directly.
pub trait HwBackend: RdtBackend + AsRdtBackend {
    /// Returns the rates actually applied, they could differ from the requested ones
    /// because of the throttling granularity.
    fn mba_set(
        &mut self,
        socket: SocketId,
        requested: &[MbaAllocation],
    ) -> RdtResult<Vec<MbaAllocation>>;

    fn mba_get(&mut self, socket: SocketId, max_num_cos: usize)
        -> RdtResult<Vec<MbaAllocation>>;

    /// Associates every core with the default RMID.
    fn mon_reset(&mut self) -> RdtResult<()>;

    fn mon_assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<Rmid>;
}

/// Backend relying on the kernel resctrl interface.
pub trait OsBackend: RdtBackend + AsRdtBackend {
    /// Starts monitoring of the process already recorded in the group.
    fn mon_start_pid(&mut self, group: &mut MonGroup) -> RdtResult<()>;
}

/// Per-process monitoring on top of the hardware backend.
pub trait PidMonitor: Send {
    /// Starts monitoring of the process already recorded in the group.
    fn pid_start(&mut self, group: &mut MonGroup) -> RdtResult<()>;

    fn pid_stop(&mut self, group: &mut MonGroup) -> RdtResult<()>;

    fn pid_poll(&mut self, groups: &mut [&mut MonGroup]) -> RdtResult<()>;
}

/// Decides which backend serves a request.
pub trait BackendSelector: Send {
    fn use_hardware(&self) -> bool;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interface {
    Msr,
    Os,
}

/// Selector with a fixed answer, decided once at initialization.
#[derive(Copy, Clone, Debug)]
pub struct StaticSelector {
    interface: Interface,
}

impl StaticSelector {
    pub fn new(interface: Interface) -> Self {
        Self { interface }
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }
}

impl BackendSelector for StaticSelector {
    fn use_hardware(&self) -> bool {
        self.interface == Interface::Msr
    }
}

/// Everything the facade dispatches to.
pub struct Backends {
    selector: Box<dyn BackendSelector>,
    hw: Box<dyn HwBackend>,
    os: Box<dyn OsBackend>,
    pid_monitor: Option<Box<dyn PidMonitor>>,
}

impl Backends {
    pub fn new(
        selector: impl BackendSelector + 'static,
        hw: impl HwBackend + 'static,
        os: impl OsBackend + 'static,
    ) -> Self {
        Self {
            selector: Box::new(selector),
            hw: Box::new(hw),
            os: Box::new(os),
            pid_monitor: None,
        }
    }

    pub fn with_pid_monitor(mut self, pid_monitor: impl PidMonitor + 'static) -> Self {
        self.pid_monitor = Some(Box::new(pid_monitor));
        self
    }

    pub(crate) fn use_hardware(&self) -> bool {
        let use_hardware = self.selector.use_hardware();
        tracing::debug!(
            "dispatching to the {} backend",
            if use_hardware { "hardware" } else { "OS" }
        );
        use_hardware
    }

    /// Queries the selector and returns the chosen backend.
    pub(crate) fn selected(&mut self) -> &mut dyn RdtBackend {
        if self.use_hardware() {
            self.hw.as_rdt_backend()
        } else {
            self.os.as_rdt_backend()
        }
    }

    pub(crate) fn hardware(&mut self) -> &mut dyn HwBackend {
        self.hw.as_mut()
    }

    pub(crate) fn os(&mut self) -> &mut dyn OsBackend {
        self.os.as_mut()
    }

    pub(crate) fn pid_monitor(&mut self) -> Option<&mut (dyn PidMonitor + 'static)> {
        self.pid_monitor.as_deref_mut()
    }
}
