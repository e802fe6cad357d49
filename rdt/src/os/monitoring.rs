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

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MonEvent;
use rdt_shared::types::SocketId;

use super::files;
use super::ResctrlBackend;
use crate::domain::check_cores_exist;
use crate::monitoring::MbmSnapshot;
use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::monitoring::MonTarget;
use crate::BackendError;
use crate::RdtError;
use crate::RdtResult;

const DOMAIN_DIR_PREFIX: &str = "mon_L3_";

impl ResctrlBackend {
    pub(super) fn start_cores(
        &mut self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        self.check_events(event)?;
        let requested = core_ids.iter().copied().collect::<BTreeSet<_>>();
        if requested.len() != core_ids.len() {
            return Err(RdtError::invalid_param("cores to monitor are repeated"));
        }
        check_cores_exist(&self.cpu_info, core_ids)?;

        for group_dir in files::sub_dirs(&self.mon_groups_dir())? {
            let busy_cores = files::read_cpus(&group_dir.join("cpus_list"))?;
            if let Some(&core_id) = busy_cores.intersection(&requested).next() {
                tracing::error!("monitoring on core {core_id} is already started");
                return Err(BackendError::CoreBusy { core_id }.into());
            }
        }

        let group_dir = self.create_group_dir()?;
        if let Err(error) = files::write_cpus(&group_dir.join("cpus_list"), &requested) {
            self.remove_group_dir(&group_dir);
            return Err(error);
        }

        if let Err(error) = group.populate(event, MonTarget::Cores(core_ids.to_vec()), context) {
            self.remove_group_dir(&group_dir);
            return Err(error);
        }
        group.bookkeeping.resctrl_dir = Some(group_dir);
        group.bookkeeping.mbm_snapshots.clear();
        tracing::debug!("monitoring of cores {core_ids:?} started");

        Ok(())
    }

    pub(super) fn start_pid(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        let pid = group
            .pid()
            .ok_or_else(|| RdtError::invalid_param("group doesn't monitor a process"))?;
        self.check_events(group.event())?;

        let group_dir = self.create_group_dir()?;
        if let Err(error) = files::write(&group_dir.join("tasks"), &format!("{pid}\n")) {
            self.remove_group_dir(&group_dir);
            return Err(error);
        }

        group.bookkeeping.resctrl_dir = Some(group_dir);
        group.bookkeeping.mbm_snapshots.clear();
        tracing::debug!("monitoring of process {pid} started");

        Ok(())
    }

    /// Removing the group directory hands its cores and tasks back to the parent group.
    pub(super) fn stop_group(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        let group_dir = group
            .resctrl_dir()
            .ok_or_else(|| RdtError::invalid_param("group has no resctrl directory"))?;

        files::remove_dir(group_dir)?;
        group.bookkeeping = Default::default();
        Ok(())
    }

    /// The kernel counts bytes since the group was created, so the first poll compares with zero.
    pub(super) fn poll_group(&self, group: &mut MonGroup) -> RdtResult<()> {
        let group_dir = group
            .resctrl_dir()
            .ok_or_else(|| RdtError::invalid_param("group has no resctrl directory"))?
            .to_path_buf();
        let event = group.event();

        let mut llc = 0;
        let mut local_delta = 0;
        let mut total_delta = 0;
        for domain_dir in files::sub_dirs(&group_dir.join("mon_data"))? {
            let Some(domain_id) = domain_id(&domain_dir) else {
                continue;
            };

            if event.contains(MonEvent::L3_OCCUP) {
                llc += read_counter(&domain_dir, "llc_occupancy")?;
            }
            if event.intersects(MonEvent::MBM) {
                let current = read_mbm(&domain_dir, event)?;
                let previous = group
                    .bookkeeping
                    .mbm_snapshots
                    .insert(domain_id, current)
                    .unwrap_or_default();
                local_delta += current.local.saturating_sub(previous.local);
                total_delta += current.total.saturating_sub(previous.total);
            }
        }

        if event.contains(MonEvent::L3_OCCUP) {
            group.values_mut().llc = llc;
        }
        if event.intersects(MonEvent::MBM) {
            group.values_mut().add_mbm_deltas(local_delta, total_delta);
        }

        Ok(())
    }

    /// Performance counters aren't exposed by resctrl.
    fn check_events(&self, event: MonEvent) -> RdtResult<()> {
        if event.has_auxiliary() {
            return Err(BackendError::unsupported("performance events through resctrl").into());
        }

        let supported = self.mon_events()?;
        if !supported.contains(event) {
            let missing = event.difference(supported);
            return Err(BackendError::unsupported(format!("monitoring events {missing:?}")).into());
        }
        Ok(())
    }

    fn mon_groups_dir(&self) -> PathBuf {
        self.root.join("mon_groups")
    }

    fn create_group_dir(&mut self) -> RdtResult<PathBuf> {
        let mon_groups_dir = self.mon_groups_dir();
        loop {
            let name = format!("rdt-{}-{}", std::process::id(), self.next_group_id);
            self.next_group_id += 1;

            let group_dir = mon_groups_dir.join(name);
            if !group_dir.exists() {
                files::create_dir(&group_dir)?;
                return Ok(group_dir);
            }
        }
    }

    fn remove_group_dir(&self, group_dir: &Path) {
        if let Err(error) = files::remove_dir(group_dir) {
            tracing::warn!("removing monitoring group {group_dir:?} failed: {error}");
        }
    }
}

/// L3 domains are numbered like sockets, `mon_L3_01` holds the counters of socket 1.
fn domain_id(domain_dir: &Path) -> Option<SocketId> {
    let name = domain_dir.file_name()?.to_str()?;
    let domain_id = name.strip_prefix(DOMAIN_DIR_PREFIX)?.parse::<u32>().ok()?;
    Some(SocketId::from(domain_id))
}

fn read_mbm(domain_dir: &Path, event: MonEvent) -> RdtResult<MbmSnapshot> {
    let local = if event.intersects(MonEvent::LMEM_BW | MonEvent::RMEM_BW) {
        read_counter(domain_dir, "mbm_local_bytes")?
    } else {
        0
    };
    let total = if event.intersects(MonEvent::TMEM_BW | MonEvent::RMEM_BW) {
        read_counter(domain_dir, "mbm_total_bytes")?
    } else {
        0
    };
    Ok(MbmSnapshot { local, total })
}

/// The kernel reports `Unavailable` or `Error` instead of a number when the counter can't be read.
fn read_counter(domain_dir: &Path, counter: &str) -> RdtResult<u64> {
    files::read_number(&domain_dir.join(counter), 10)
}
