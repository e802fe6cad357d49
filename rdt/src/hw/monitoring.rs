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

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use rdt_msr::registers;
use rdt_msr::registers::QmEvent;
use rdt_msr::MsrAccess;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::MonEvent;
use rdt_shared::types::Rmid;
use rdt_shared::types::SocketId;

use super::MsrBackend;
use crate::domain::check_cores_exist;
use crate::domain::core_info;
use crate::monitoring::MbmSnapshot;
use crate::monitoring::MonContext;
use crate::monitoring::MonGroup;
use crate::monitoring::MonTarget;
use crate::monitoring::PerfSnapshot;
use crate::BackendError;
use crate::RdtError;
use crate::RdtResult;

impl<M: MsrAccess> MsrBackend<M> {
    pub(super) fn start_monitoring(
        &mut self,
        core_ids: &[LogicalCoreId],
        event: MonEvent,
        context: Option<MonContext>,
        group: &mut MonGroup,
    ) -> RdtResult<()> {
        let mon = *self.capability.mon()?;
        if !mon.events.contains(event) {
            let missing = event.difference(mon.events);
            return Err(BackendError::unsupported(format!("monitoring events {missing:?}")).into());
        }

        let unique_cores = core_ids.iter().collect::<BTreeSet<_>>();
        if unique_cores.len() != core_ids.len() {
            return Err(RdtError::invalid_param("cores to monitor are repeated"));
        }
        check_cores_exist(&self.cpu_info, core_ids)?;
        for &core_id in core_ids {
            if self.read_rmid(core_id)? != Rmid::UNMONITORED {
                tracing::error!("monitoring on core {core_id} is already started");
                return Err(BackendError::CoreBusy { core_id }.into());
            }
        }

        let rmid = self.free_rmid(mon.max_rmid)?;
        let started = self.program_counters(core_ids, rmid, event);
        let snapshots = match started {
            Ok(snapshots) => snapshots,
            Err(error) => {
                self.restore_rmid(core_ids);
                return Err(error);
            }
        };

        if let Err(error) = group.populate(event, MonTarget::Cores(core_ids.to_vec()), context) {
            self.restore_rmid(core_ids);
            return Err(error);
        }
        group.bookkeeping.rmid = Some(rmid);
        group.bookkeeping.mbm_snapshots = snapshots;
        group.bookkeeping.perf_snapshots.clear();
        tracing::debug!("monitoring of cores {core_ids:?} started with RMID {rmid}");

        Ok(())
    }

    pub(super) fn stop_monitoring(&mut self, group: &mut MonGroup) -> RdtResult<()> {
        if group.cores().is_empty() {
            return Err(RdtError::invalid_param(
                "group doesn't monitor cores of this backend",
            ));
        }

        let with_perf = group.event().has_auxiliary();
        let mut result = Ok(());
        for &core_id in group.cores() {
            let core_result = self.write_rmid(core_id, Rmid::UNMONITORED).and_then(|_| {
                if with_perf {
                    self.write(registers::IA32_PERF_GLOBAL_CTRL, 0, core_id)
                } else {
                    Ok(())
                }
            });
            if let Err(error) = core_result {
                tracing::error!("stopping monitoring on core {core_id} failed: {error}");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }

        if result.is_ok() {
            group.bookkeeping = Default::default();
        }
        result
    }

    pub(super) fn poll_group(&self, group: &mut MonGroup) -> RdtResult<()> {
        let mon = *self.capability.mon()?;
        let rmid = group
            .rmid()
            .ok_or_else(|| RdtError::invalid_param("group has no RMID"))?;
        let event = group.event();
        let core_ids = group.cores().to_vec();
        let socket_cores = self.socket_cores(&core_ids)?;

        if event.contains(MonEvent::L3_OCCUP) {
            let mut llc = 0;
            for &core_id in socket_cores.values() {
                llc += self.read_counter(rmid, QmEvent::LlcOccupancy, core_id)?;
            }
            group.values_mut().llc = llc * mon.upscaling_factor;
        }

        if event.intersects(MonEvent::MBM) {
            let mut local_delta = 0;
            let mut total_delta = 0;
            for (&socket, &core_id) in &socket_cores {
                let current = self.read_mbm(rmid, event, core_id)?;
                let previous = group
                    .bookkeeping
                    .mbm_snapshots
                    .insert(socket, current)
                    .unwrap_or(current);
                local_delta += registers::counter_delta(
                    previous.local,
                    current.local,
                    registers::MBM_COUNTER_WIDTH,
                );
                total_delta += registers::counter_delta(
                    previous.total,
                    current.total,
                    registers::MBM_COUNTER_WIDTH,
                );
            }
            group.values_mut().add_mbm_deltas(
                local_delta * mon.upscaling_factor,
                total_delta * mon.upscaling_factor,
            );
        }

        if event.has_auxiliary() {
            let mut retired = 0;
            let mut unhalted = 0;
            let mut llc_misses = 0;
            for &core_id in &core_ids {
                let current = PerfSnapshot {
                    retired: self.read(registers::IA32_FIXED_CTR0, core_id)?,
                    unhalted: self.read(registers::IA32_FIXED_CTR1, core_id)?,
                    llc_misses: self.read(registers::IA32_PMC0, core_id)?,
                };
                // Counters are zeroed on start.
                let previous = group
                    .bookkeeping
                    .perf_snapshots
                    .insert(core_id, current)
                    .unwrap_or_default();
                let width = registers::PERF_COUNTER_WIDTH;
                retired += registers::counter_delta(previous.retired, current.retired, width);
                unhalted += registers::counter_delta(previous.unhalted, current.unhalted, width);
                llc_misses +=
                    registers::counter_delta(previous.llc_misses, current.llc_misses, width);
            }
            group
                .values_mut()
                .add_perf_deltas(retired, unhalted, llc_misses);
        }

        Ok(())
    }

    /// Occupancy and bandwidth counters are per socket, one core of each socket is enough.
    fn socket_cores(
        &self,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<BTreeMap<SocketId, LogicalCoreId>> {
        let mut socket_cores = BTreeMap::new();
        for &core_id in core_ids {
            let socket = core_info(&self.cpu_info, core_id)?.socket;
            socket_cores.entry(socket).or_insert(core_id);
        }
        Ok(socket_cores)
    }

    fn free_rmid(&self, max_rmid: u32) -> RdtResult<Rmid> {
        let used_rmids = self
            .cpu_info
            .core_ids()
            .map(|core_id| self.read_rmid(core_id))
            .collect::<RdtResult<BTreeSet<_>>>()?;

        (1..=max_rmid)
            .map(Rmid::new)
            .find(|rmid| !used_rmids.contains(rmid))
            .ok_or_else(|| BackendError::resource_exhausted("RMID").into())
    }

    /// Associates the RMID, enables perf counters if asked and takes the first MBM readings.
    fn program_counters(
        &self,
        core_ids: &[LogicalCoreId],
        rmid: Rmid,
        event: MonEvent,
    ) -> RdtResult<BTreeMap<SocketId, MbmSnapshot>> {
        for &core_id in core_ids {
            self.write_rmid(core_id, rmid)?;
            if event.has_auxiliary() {
                self.start_perf_counters(core_id)?;
            }
        }

        let mut snapshots = BTreeMap::new();
        if event.intersects(MonEvent::MBM) {
            for (socket, core_id) in self.socket_cores(core_ids)? {
                snapshots.insert(socket, self.read_mbm(rmid, event, core_id)?);
            }
        }
        Ok(snapshots)
    }

    fn start_perf_counters(&self, core_id: LogicalCoreId) -> RdtResult<()> {
        self.write(registers::IA32_PERF_GLOBAL_CTRL, 0, core_id)?;
        self.write(registers::IA32_FIXED_CTR0, 0, core_id)?;
        self.write(registers::IA32_FIXED_CTR1, 0, core_id)?;
        self.write(registers::IA32_PMC0, 0, core_id)?;
        self.write(
            registers::IA32_FIXED_CTR_CTRL,
            registers::FIXED_CTR_CTRL_ENABLE,
            core_id,
        )?;
        self.write(
            registers::IA32_PERFEVTSEL0,
            registers::PERFEVTSEL_LLC_MISS,
            core_id,
        )?;
        self.write(
            registers::IA32_PERF_GLOBAL_CTRL,
            registers::PERF_GLOBAL_CTRL_ENABLE,
            core_id,
        )
    }

    fn restore_rmid(&self, core_ids: &[LogicalCoreId]) {
        for &core_id in core_ids {
            if let Err(error) = self.write_rmid(core_id, Rmid::UNMONITORED) {
                tracing::warn!("restoring RMID of core {core_id} failed: {error}");
            }
        }
    }

    fn read_mbm(&self, rmid: Rmid, event: MonEvent, core_id: LogicalCoreId) -> RdtResult<MbmSnapshot> {
        let local = if event.intersects(MonEvent::LMEM_BW | MonEvent::RMEM_BW) {
            self.read_counter(rmid, QmEvent::LocalBandwidth, core_id)?
        } else {
            0
        };
        let total = if event.intersects(MonEvent::TMEM_BW | MonEvent::RMEM_BW) {
            self.read_counter(rmid, QmEvent::TotalBandwidth, core_id)?
        } else {
            0
        };
        Ok(MbmSnapshot { local, total })
    }

    fn read_counter(&self, rmid: Rmid, event: QmEvent, core_id: LogicalCoreId) -> RdtResult<u64> {
        self.write(
            registers::IA32_QM_EVTSEL,
            registers::qm_evtsel(rmid, event),
            core_id,
        )?;
        let value = self.read(registers::IA32_QM_CTR, core_id)?;
        registers::qm_ctr_data(value)
            .ok_or_else(|| BackendError::CounterUnavailable { rmid, core_id }.into())
    }
}
