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
use std::path::PathBuf;

use eyre::eyre;
use serde::Deserialize;
use serde::Serialize;

use super::defaults::default_interface;
use super::defaults::default_log_level;
use super::defaults::default_resctrl_path;
use crate::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedRdtConfig {
    #[serde(default = "default_interface")]
    pub interface: Interface,
    #[serde(default = "default_resctrl_path")]
    pub resctrl_path: PathBuf,
    #[serde(default)]
    pub logs: UnresolvedLogs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnresolvedLogs {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for UnresolvedLogs {
    fn default() -> Self {
        UnresolvedLogs {
            log_level: default_log_level(),
        }
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Auto,
    Msr,
    Os,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl UnresolvedRdtConfig {
    /// Relative resctrl paths are resolved against the directory of the config file.
    pub fn resolve(self, config_path: impl AsRef<Path>) -> eyre::Result<RdtConfig> {
        let config_dir = config_path.as_ref().parent().ok_or_else(|| {
            eyre!(
                "config resolver was provided with invalid config path: {}",
                config_path.as_ref().display()
            )
        })?;

        let config = RdtConfig {
            interface: self.interface.resolve(),
            resctrl_path: config_dir.join(self.resctrl_path),
            logs: self.logs.resolve(),
        };
        Ok(config)
    }
}

impl Interface {
    pub fn resolve(self) -> InterfaceChoice {
        match self {
            Interface::Auto => InterfaceChoice::Auto,
            Interface::Msr => InterfaceChoice::Msr,
            Interface::Os => InterfaceChoice::Os,
        }
    }
}

impl LogLevel {
    pub fn to_tracing_filter(&self) -> tracing_subscriber::filter::LevelFilter {
        use tracing_subscriber::filter::LevelFilter;

        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl UnresolvedLogs {
    pub fn resolve(self) -> Logs {
        Logs {
            log_level: self.log_level.to_tracing_filter(),
        }
    }
}
