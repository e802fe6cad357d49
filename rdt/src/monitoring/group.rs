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

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MonEvent;
use rdt_shared::types::MonValues;
use rdt_shared::types::Pid;
use rdt_shared::types::Rmid;
use rdt_shared::types::SocketId;

use crate::RdtError;
use crate::RdtResult;

/// Opaque caller data carried along with a group.
pub type MonContext = Arc<dyn Any + Send + Sync>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum GroupState {
    #[default]
    Inactive,
    Active,
}

/// What a group monitors, set by a successful start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MonTarget {
    #[default]
    None,
    Cores(Vec<LogicalCoreId>),
    Pid(Pid),
}

/// Previous raw MBM readings of one domain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MbmSnapshot {
    pub(crate) local: u64,
    pub(crate) total: u64,
}

/// Previous raw perf counter readings of one core.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PerfSnapshot {
    pub(crate) retired: u64,
    pub(crate) unhalted: u64,
    pub(crate) llc_misses: u64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Bookkeeping {
    pub(crate) rmid: Option<Rmid>,
    pub(crate) resctrl_dir: Option<PathBuf>,
    pub(crate) mbm_snapshots: BTreeMap<SocketId, MbmSnapshot>,
    pub(crate) perf_snapshots: BTreeMap<LogicalCoreId, PerfSnapshot>,
}

/// A monitoring group owned by the caller and filled in by the library.
///
/// A group is active from a successful start to a successful stop,
/// only active groups can be polled or stopped.
#[derive(Debug, Default)]
pub struct MonGroup {
    state: GroupState,
    event: MonEvent,
    target: MonTarget,
    context: Option<MonContext>,
    values: MonValues,
    pub(crate) bookkeeping: Bookkeeping,
}

impl MonGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == GroupState::Active
    }

    pub fn event(&self) -> MonEvent {
        self.event
    }

    pub fn target(&self) -> &MonTarget {
        &self.target
    }

    /// Monitored cores, empty for a process group.
    pub fn cores(&self) -> &[LogicalCoreId] {
        match &self.target {
            MonTarget::Cores(cores) => cores,
            MonTarget::None | MonTarget::Pid(_) => &[],
        }
    }

    pub fn pid(&self) -> Option<Pid> {
        match self.target {
            MonTarget::Pid(pid) => Some(pid),
            MonTarget::None | MonTarget::Cores(_) => None,
        }
    }

    pub fn context(&self) -> Option<&MonContext> {
        self.context.as_ref()
    }

    pub fn values(&self) -> &MonValues {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut MonValues {
        &mut self.values
    }

    /// RMID allocated by the hardware backend.
    pub fn rmid(&self) -> Option<Rmid> {
        self.bookkeeping.rmid
    }

    /// Directory of the group in the resctrl filesystem.
    pub fn resctrl_dir(&self) -> Option<&Path> {
        self.bookkeeping.resctrl_dir.as_deref()
    }

    /// Records what the group monitors, used by backends while starting a group.
    ///
    /// Values of a previous run are dropped. An active group can't be retargeted.
    pub fn populate(
        &mut self,
        event: MonEvent,
        target: MonTarget,
        context: Option<MonContext>,
    ) -> RdtResult<()> {
        if self.is_active() {
            tracing::error!("monitoring group is active, its target can't be changed");
            return Err(RdtError::invalid_param(
                "monitoring group is active, its target can't be changed",
            ));
        }

        self.event = event;
        self.target = target;
        self.context = context;
        self.values = MonValues::default();
        Ok(())
    }

    pub(crate) fn activate(&mut self) {
        self.state = GroupState::Active;
    }

    pub(crate) fn deactivate(&mut self) {
        self.state = GroupState::Inactive;
    }

    /// Forgets everything, including the state.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
