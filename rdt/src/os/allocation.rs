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

use rdt_shared::types::CdpConfig;
use rdt_shared::types::ClassId;
use rdt_shared::types::L2Allocation;
use rdt_shared::types::L2Id;
use rdt_shared::types::L3Allocation;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::SocketId;
use rdt_shared::types::Technology;

use super::files;
use super::schemata::Schemata;
use super::ResctrlBackend;
use crate::domain::assign_domain;
use crate::domain::check_cores_exist;
use crate::domain::core_info;
use crate::limits::check_class;
use crate::limits::check_mask_fits;
use crate::limits::check_room;
use crate::BackendError;
use crate::RdtError;
use crate::RdtResult;

const L3_RESOURCE: &str = "L3";
const L3_CODE_RESOURCE: &str = "L3CODE";
const L3_DATA_RESOURCE: &str = "L3DATA";
const L2_RESOURCE: &str = "L2";
const MBA_RESOURCE: &str = "MB";

impl ResctrlBackend {
    pub(super) fn assoc_set(&mut self, core_id: LogicalCoreId, class_id: ClassId) -> RdtResult<()> {
        core_info(&self.cpu_info, core_id)?;
        let num_classes = self.num_classes()?;
        if class_id.as_u32() >= num_classes {
            return Err(RdtError::invalid_param(format!(
                "class of service {class_id} is out of range, only {num_classes} are available"
            )));
        }

        self.move_cores(&BTreeSet::from([core_id]), class_id, num_classes)
    }

    /// Cores not listed by any class belong to the root group.
    pub(super) fn assoc_get(&mut self, core_id: LogicalCoreId) -> RdtResult<ClassId> {
        core_info(&self.cpu_info, core_id)?;
        let num_classes = self.num_classes()?;

        for class_id in (1..num_classes).map(ClassId::new) {
            let cpus = files::read_cpus(&self.class_dir(class_id).join("cpus_list"))?;
            if cpus.contains(&core_id) {
                return Ok(class_id);
            }
        }
        Ok(ClassId::DEFAULT)
    }

    /// Takes the highest class with neither cores nor tasks besides the requested cores.
    pub(super) fn assign(
        &mut self,
        technology: Technology,
        core_ids: &[LogicalCoreId],
    ) -> RdtResult<ClassId> {
        assign_domain(&self.cpu_info, technology, core_ids)?;
        let num_classes = self.num_classes_for(technology)?;
        let requested = core_ids.iter().copied().collect::<BTreeSet<_>>();

        let mut free_class = None;
        for class_id in (1..num_classes).rev().map(ClassId::new) {
            if self.is_class_free(class_id, &requested)? {
                free_class = Some(class_id);
                break;
            }
        }
        let class_id = free_class.ok_or_else(|| BackendError::resource_exhausted("class of service"))?;

        self.move_cores(&requested, class_id, self.num_classes()?)?;
        tracing::debug!("cores {core_ids:?} assigned to class of service {class_id}");

        Ok(class_id)
    }

    pub(super) fn release(&mut self, core_ids: &[LogicalCoreId]) -> RdtResult<()> {
        check_cores_exist(&self.cpu_info, core_ids)?;
        let num_classes = self.num_classes()?;
        let core_ids = core_ids.iter().copied().collect::<BTreeSet<_>>();
        self.move_cores(&core_ids, ClassId::DEFAULT, num_classes)
    }

    /// CDP is a mount option of resctrl, it can't be switched from here.
    pub(super) fn reset(&mut self, l3_cdp: CdpConfig) -> RdtResult<()> {
        let l3 = self.l3_info().ok();
        let l2 = self.l2_info().ok();
        let cdp_enabled = l3.map(|l3| l3.cdp_enabled).unwrap_or(false);

        let cdp_mismatch = match l3_cdp {
            CdpConfig::On => !cdp_enabled,
            CdpConfig::Off => cdp_enabled,
            CdpConfig::Any => false,
        };
        if cdp_mismatch {
            tracing::error!(
                "L3 CDP {} requested but resctrl is mounted with CDP {}, remount is needed",
                if cdp_enabled { "off" } else { "on" },
                if cdp_enabled { "on" } else { "off" },
            );
            return Err(BackendError::unsupported("switching L3 CDP without remounting resctrl").into());
        }

        let num_classes = self.num_classes()?;
        let root_tasks = self.class_dir(ClassId::DEFAULT).join("tasks");
        for class_id in (0..num_classes).map(ClassId::new) {
            let class_dir = self.class_dir(class_id);
            if !class_dir.is_dir() {
                continue;
            }

            let mut schemata = self.read_schemata(&class_dir)?;
            if let Some(l3) = l3 {
                if l3.cdp_enabled {
                    schemata.set_all(L3_CODE_RESOURCE, l3.cache.full_mask);
                    schemata.set_all(L3_DATA_RESOURCE, l3.cache.full_mask);
                } else {
                    schemata.set_all(L3_RESOURCE, l3.cache.full_mask);
                }
            }
            if let Some(l2) = l2 {
                schemata.set_all(L2_RESOURCE, l2.full_mask);
            }
            schemata.set_all(MBA_RESOURCE, 100);
            self.write_schemata(&class_dir, &schemata)?;

            if class_id != ClassId::DEFAULT {
                files::write_cpus(&class_dir.join("cpus_list"), &BTreeSet::new())?;
                // The kernel moves a task on every pid written to another group.
                for pid in files::read_tasks(&class_dir.join("tasks"))? {
                    files::write(&root_tasks, &format!("{pid}\n"))?;
                }
            }
        }
        tracing::debug!("resctrl allocation reset");

        Ok(())
    }

    pub(super) fn set_l3(&mut self, socket: SocketId, allocations: &[L3Allocation]) -> RdtResult<()> {
        let l3 = self.l3_info()?;
        self.check_socket(socket)?;

        for allocation in allocations {
            check_class(allocation.class_id, l3.cache.num_classes, "L3")?;
            if allocation.mask.is_cdp() && !l3.cdp_enabled {
                return Err(RdtError::invalid_param(format!(
                    "L3 COS{} has code and data masks but CDP is off",
                    allocation.class_id
                )));
            }
            for mask in allocation.mask.masks() {
                check_mask_fits(mask, l3.cache.full_mask, allocation.class_id, "L3")?;
            }
        }

        let domain_id = u32::from(socket);
        for allocation in allocations {
            let class_dir = self.ensure_class_dir(allocation.class_id)?;
            let mut schemata = self.read_schemata(&class_dir)?;
            if l3.cdp_enabled {
                schemata.set(L3_CODE_RESOURCE, domain_id, allocation.mask.code_mask());
                schemata.set(L3_DATA_RESOURCE, domain_id, allocation.mask.data_mask());
            } else {
                schemata.set(L3_RESOURCE, domain_id, allocation.mask.data_mask());
            }
            self.write_schemata(&class_dir, &schemata)?;
        }

        Ok(())
    }

    pub(super) fn get_l3(
        &mut self,
        socket: SocketId,
        max_num_ca: usize,
    ) -> RdtResult<Vec<L3Allocation>> {
        let l3 = self.l3_info()?;
        check_room(l3.cache.num_classes, max_num_ca, "L3")?;
        self.check_socket(socket)?;

        let domain_id = u32::from(socket);
        (0..l3.cache.num_classes)
            .map(ClassId::new)
            .map(|class_id| -> RdtResult<L3Allocation> {
                let class_dir = self.class_dir(class_id);
                if !class_dir.is_dir() {
                    return Ok(if l3.cdp_enabled {
                        L3Allocation::with_cdp(class_id, l3.cache.full_mask, l3.cache.full_mask)
                    } else {
                        L3Allocation::new(class_id, l3.cache.full_mask)
                    });
                }

                let schemata = self.read_schemata(&class_dir)?;
                let value = |resource| schemata_value(&schemata, &class_dir, resource, domain_id);
                if l3.cdp_enabled {
                    let code_mask = value(L3_CODE_RESOURCE)?;
                    let data_mask = value(L3_DATA_RESOURCE)?;
                    Ok(L3Allocation::with_cdp(class_id, code_mask, data_mask))
                } else {
                    Ok(L3Allocation::new(class_id, value(L3_RESOURCE)?))
                }
            })
            .collect()
    }

    pub(super) fn set_l2(&mut self, l2_id: L2Id, allocations: &[L2Allocation]) -> RdtResult<()> {
        let l2 = self.l2_info()?;
        self.check_l2(l2_id)?;

        for allocation in allocations {
            check_class(allocation.class_id, l2.num_classes, "L2")?;
            check_mask_fits(allocation.ways_mask, l2.full_mask, allocation.class_id, "L2")?;
        }

        let domain_id = u32::from(l2_id);
        for allocation in allocations {
            let class_dir = self.ensure_class_dir(allocation.class_id)?;
            let mut schemata = self.read_schemata(&class_dir)?;
            schemata.set(L2_RESOURCE, domain_id, allocation.ways_mask);
            self.write_schemata(&class_dir, &schemata)?;
        }

        Ok(())
    }

    pub(super) fn get_l2(&mut self, l2_id: L2Id, max_num_ca: usize) -> RdtResult<Vec<L2Allocation>> {
        let l2 = self.l2_info()?;
        check_room(l2.num_classes, max_num_ca, "L2")?;
        self.check_l2(l2_id)?;

        let domain_id = u32::from(l2_id);
        (0..l2.num_classes)
            .map(ClassId::new)
            .map(|class_id| -> RdtResult<L2Allocation> {
                let class_dir = self.class_dir(class_id);
                if !class_dir.is_dir() {
                    return Ok(L2Allocation::new(class_id, l2.full_mask));
                }

                let schemata = self.read_schemata(&class_dir)?;
                let mask = schemata_value(&schemata, &class_dir, L2_RESOURCE, domain_id)?;
                Ok(L2Allocation::new(class_id, mask))
            })
            .collect()
    }

    /// Puts the cores into the class and takes them out of every other non-root class.
    fn move_cores(
        &self,
        core_ids: &BTreeSet<LogicalCoreId>,
        class_id: ClassId,
        num_classes: u32,
    ) -> RdtResult<()> {
        for other_class in (1..num_classes).map(ClassId::new) {
            if other_class == class_id {
                continue;
            }
            let cpus_path = self.class_dir(other_class).join("cpus_list");
            let cpus = files::read_cpus(&cpus_path)?;
            if !cpus.is_disjoint(core_ids) {
                let remaining = cpus.difference(core_ids).copied().collect();
                files::write_cpus(&cpus_path, &remaining)?;
            }
        }

        if class_id != ClassId::DEFAULT {
            let cpus_path = self.ensure_class_dir(class_id)?.join("cpus_list");
            let mut cpus = files::read_cpus(&cpus_path)?;
            cpus.extend(core_ids.iter().copied());
            files::write_cpus(&cpus_path, &cpus)?;
        }

        Ok(())
    }

    fn is_class_free(&self, class_id: ClassId, requested: &BTreeSet<LogicalCoreId>) -> RdtResult<bool> {
        let class_dir = self.class_dir(class_id);
        if !class_dir.is_dir() {
            return Ok(true);
        }

        let cpus = files::read_cpus(&class_dir.join("cpus_list"))?;
        if !cpus.is_subset(requested) {
            return Ok(false);
        }
        Ok(files::read_tasks(&class_dir.join("tasks"))?.is_empty())
    }

    /// The kernel fills a new class directory with its pseudo files.
    fn ensure_class_dir(&self, class_id: ClassId) -> RdtResult<PathBuf> {
        let class_dir = self.class_dir(class_id);
        if !class_dir.is_dir() {
            files::create_dir(&class_dir)?;
        }
        Ok(class_dir)
    }

    fn read_schemata(&self, class_dir: &Path) -> RdtResult<Schemata> {
        let path = class_dir.join("schemata");
        let content = files::read(&path)?;
        Schemata::parse(&content)
            .ok_or_else(|| BackendError::resctrl_content(&path, content.trim()).into())
    }

    fn write_schemata(&self, class_dir: &Path, schemata: &Schemata) -> RdtResult<()> {
        files::write(&class_dir.join("schemata"), &schemata.to_string())
    }

    fn check_socket(&self, socket: SocketId) -> RdtResult<()> {
        if self.cpu_info.first_core_on_socket(socket).is_none() {
            return Err(RdtError::invalid_param(format!("socket {socket} doesn't exist")));
        }
        Ok(())
    }

    fn check_l2(&self, l2_id: L2Id) -> RdtResult<()> {
        if self.cpu_info.first_core_in_l2(l2_id).is_none() {
            return Err(RdtError::invalid_param(format!(
                "L2 cluster {l2_id} doesn't exist"
            )));
        }
        Ok(())
    }
}

fn schemata_value(
    schemata: &Schemata,
    class_dir: &Path,
    resource: &str,
    domain_id: u32,
) -> RdtResult<u64> {
    schemata.get(resource, domain_id).ok_or_else(|| {
        BackendError::resctrl_content(
            class_dir.join("schemata"),
            format!("no {resource} value for domain {domain_id}"),
        )
        .into()
    })
}
