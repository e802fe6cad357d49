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

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

/// L3 Code/Data Prioritization requirement applied on allocation reset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdpConfig {
    Off,
    On,
    /// Keep whatever is currently configured.
    #[default]
    Any,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ThisError)]
#[error("unrecognized L3 CDP configuration setting {value}")]
pub struct InvalidCdpConfig {
    pub value: u32,
}

impl CdpConfig {
    pub const fn as_raw(self) -> u32 {
        match self {
            CdpConfig::Off => 0,
            CdpConfig::On => 1,
            CdpConfig::Any => 2,
        }
    }
}

impl TryFrom<u32> for CdpConfig {
    type Error = InvalidCdpConfig;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CdpConfig::Off),
            1 => Ok(CdpConfig::On),
            2 => Ok(CdpConfig::Any),
            value => {
                tracing::error!("Unrecognized L3 CDP configuration setting {value}!");
                Err(InvalidCdpConfig { value })
            }
        }
    }
}
