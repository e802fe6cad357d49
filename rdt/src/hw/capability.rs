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

use rdt_msr::CatFeatures;
use rdt_msr::MbaFeatures;
use rdt_msr::MonFeatures;
use rdt_msr::RdtFeatures;
use rdt_shared::types::Technology;

use crate::BackendError;
use crate::RdtResult;

/// What the platform offers and how it is currently configured.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HwCapability {
    pub features: RdtFeatures,
    pub l3_cdp_enabled: bool,
}

impl HwCapability {
    pub fn new(features: RdtFeatures) -> Self {
        Self {
            features,
            l3_cdp_enabled: false,
        }
    }

    pub fn with_l3_cdp(mut self, enabled: bool) -> Self {
        self.l3_cdp_enabled = enabled;
        self
    }

    pub(crate) fn l3(&self) -> RdtResult<&CatFeatures> {
        self.features
            .l3ca
            .as_ref()
            .ok_or_else(|| BackendError::unsupported("L3 cache allocation").into())
    }

    pub(crate) fn l2(&self) -> RdtResult<&CatFeatures> {
        self.features
            .l2ca
            .as_ref()
            .ok_or_else(|| BackendError::unsupported("L2 cache allocation").into())
    }

    pub(crate) fn mba(&self) -> RdtResult<&MbaFeatures> {
        self.features
            .mba
            .as_ref()
            .ok_or_else(|| BackendError::unsupported("memory bandwidth allocation").into())
    }

    pub(crate) fn mon(&self) -> RdtResult<&MonFeatures> {
        self.features
            .mon
            .as_ref()
            .ok_or_else(|| BackendError::unsupported("L3 monitoring").into())
    }

    /// With CDP every class takes a pair of mask registers.
    pub(crate) fn l3_num_classes(&self) -> RdtResult<u32> {
        let l3 = self.l3()?;
        if self.l3_cdp_enabled {
            Ok(l3.num_classes / 2)
        } else {
            Ok(l3.num_classes)
        }
    }

    /// Number of classes usable by all the technologies at once.
    pub(crate) fn num_classes_for(&self, technology: Technology) -> RdtResult<u32> {
        let mut num_classes = u32::MAX;
        if technology.contains(Technology::L3CA) {
            num_classes = num_classes.min(self.l3_num_classes()?);
        }
        if technology.contains(Technology::L2CA) {
            num_classes = num_classes.min(self.l2()?.num_classes);
        }
        if technology.contains(Technology::MBA) {
            num_classes = num_classes.min(self.mba()?.num_classes);
        }
        Ok(num_classes)
    }

    /// Upper bound of class ids a core can be associated with.
    pub(crate) fn assoc_num_classes(&self) -> RdtResult<u32> {
        let l3 = self.l3_num_classes().ok();
        let l2 = self.features.l2ca.map(|l2| l2.num_classes);
        let mba = self.features.mba.map(|mba| mba.num_classes);

        [l3, l2, mba]
            .into_iter()
            .flatten()
            .max()
            .ok_or_else(|| BackendError::unsupported("cache and memory bandwidth allocation").into())
    }
}
