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

use std::path::Path;

use cpu_utils::CpuInfo;
use rdt_config::InterfaceChoice;
use rdt_config::RdtConfig;
use rdt_msr::DevCpuMsr;

use crate::hw::MsrBackend;
use crate::os::ResctrlBackend;
use crate::Backends;
use crate::Interface;
use crate::RdtResult;
use crate::StaticSelector;

/// Resolves `auto` by looking for a mounted resctrl filesystem.
pub fn resolve_interface(choice: InterfaceChoice, resctrl_path: &Path) -> Interface {
    match choice {
        InterfaceChoice::Msr => Interface::Msr,
        InterfaceChoice::Os => Interface::Os,
        InterfaceChoice::Auto if resctrl_path.join("info").is_dir() => Interface::Os,
        InterfaceChoice::Auto => Interface::Msr,
    }
}

/// Builds the platform backends, PID monitoring on top of MSR isn't provided.
pub(crate) fn build_backends(config: &RdtConfig, cpu_info: CpuInfo) -> RdtResult<Backends> {
    let interface = resolve_interface(config.interface, &config.resctrl_path);
    tracing::info!(
        "Using {interface:?} interface, {} logical cores found",
        cpu_info.cores().count()
    );

    let hw = MsrBackend::detect(DevCpuMsr::new(), cpu_info.clone());
    let os = ResctrlBackend::new(&config.resctrl_path, cpu_info);
    Ok(Backends::new(StaticSelector::new(interface), hw, os))
}
