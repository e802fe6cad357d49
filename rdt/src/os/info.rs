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

use rdt_shared::types::MonEvent;
use rdt_shared::types::Technology;

use super::files;
use super::ResctrlBackend;
use crate::BackendError;
use crate::RdtResult;

/// Classes and ways of a cache as exposed under `info/`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) struct CacheInfo {
    pub(super) num_classes: u32,
    pub(super) full_mask: u64,
}

/// How L3 is exposed by the mount, CDP splits it into code and data resources.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) struct L3Info {
    pub(super) cache: CacheInfo,
    pub(super) cdp_enabled: bool,
}

impl ResctrlBackend {
    pub(super) fn l3_info(&self) -> RdtResult<L3Info> {
        if self.info_dir("L3").is_dir() {
            return Ok(L3Info {
                cache: self.cache_info("L3")?,
                cdp_enabled: false,
            });
        }
        if self.info_dir("L3CODE").is_dir() {
            return Ok(L3Info {
                cache: self.cache_info("L3CODE")?,
                cdp_enabled: true,
            });
        }

        Err(BackendError::unsupported("L3 cache allocation").into())
    }

    pub(super) fn l2_info(&self) -> RdtResult<CacheInfo> {
        if !self.info_dir("L2").is_dir() {
            return Err(BackendError::unsupported("L2 cache allocation").into());
        }
        self.cache_info("L2")
    }

    pub(super) fn mba_num_classes(&self) -> RdtResult<u32> {
        let path = self.info_dir("MB").join("num_closids");
        if !path.is_file() {
            return Err(BackendError::unsupported("memory bandwidth allocation").into());
        }
        Ok(files::read_number(&path, 10)? as u32)
    }

    pub(super) fn mon_events(&self) -> RdtResult<MonEvent> {
        let path = self.info_dir("L3_MON").join("mon_features");
        if !path.is_file() {
            return Err(BackendError::unsupported("L3 monitoring").into());
        }

        let mut events = MonEvent::empty();
        for feature in files::read(&path)?.lines().map(str::trim) {
            match feature {
                "llc_occupancy" => events |= MonEvent::L3_OCCUP,
                "mbm_total_bytes" => events |= MonEvent::TMEM_BW,
                "mbm_local_bytes" => events |= MonEvent::LMEM_BW,
                _ => {}
            }
        }
        if events.contains(MonEvent::TMEM_BW | MonEvent::LMEM_BW) {
            events |= MonEvent::RMEM_BW;
        }
        Ok(events)
    }

    /// Number of classes usable by all the technologies at once.
    pub(super) fn num_classes_for(&self, technology: Technology) -> RdtResult<u32> {
        let mut num_classes = u32::MAX;
        if technology.contains(Technology::L3CA) {
            num_classes = num_classes.min(self.l3_info()?.cache.num_classes);
        }
        if technology.contains(Technology::L2CA) {
            num_classes = num_classes.min(self.l2_info()?.num_classes);
        }
        if technology.contains(Technology::MBA) {
            num_classes = num_classes.min(self.mba_num_classes()?);
        }
        Ok(num_classes)
    }

    /// Upper bound of class ids a core can be associated with.
    pub(super) fn num_classes(&self) -> RdtResult<u32> {
        let l3 = self.l3_info().ok().map(|l3| l3.cache.num_classes);
        let l2 = self.l2_info().ok().map(|l2| l2.num_classes);
        let mba = self.mba_num_classes().ok();

        [l3, l2, mba]
            .into_iter()
            .flatten()
            .max()
            .ok_or_else(|| BackendError::unsupported("cache and memory bandwidth allocation").into())
    }

    fn cache_info(&self, resource: &str) -> RdtResult<CacheInfo> {
        let dir = self.info_dir(resource);
        let num_classes = files::read_number(&dir.join("num_closids"), 10)? as u32;
        let full_mask = files::read_number(&dir.join("cbm_mask"), 16)?;
        Ok(CacheInfo {
            num_classes,
            full_mask,
        })
    }
}
