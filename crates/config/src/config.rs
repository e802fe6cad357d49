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

use std::path::PathBuf;

use crate::defaults::default_interface;
use crate::defaults::default_log_level;
use crate::defaults::default_resctrl_path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RdtConfig {
    pub interface: InterfaceChoice,
    /// Mount point of the resctrl filesystem.
    pub resctrl_path: PathBuf,
    pub logs: Logs,
}

/// Which backend serves the allocation and monitoring requests.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InterfaceChoice {
    /// Use resctrl if it is mounted, MSR otherwise.
    #[default]
    Auto,
    Msr,
    Os,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Logs {
    pub log_level: tracing_subscriber::filter::LevelFilter,
}

impl Default for RdtConfig {
    fn default() -> Self {
        Self {
            interface: default_interface().resolve(),
            resctrl_path: default_resctrl_path(),
            logs: Logs::default(),
        }
    }
}

impl Default for Logs {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_tracing_filter(),
        }
    }
}
