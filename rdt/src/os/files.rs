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
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::Pid;

use crate::BackendError;
use crate::RdtResult;

pub(super) fn read(path: &Path) -> RdtResult<String> {
    fs::read_to_string(path).map_err(|error| BackendError::resctrl(path, error).into())
}

pub(super) fn write(path: &Path, content: &str) -> RdtResult<()> {
    tracing::debug!("Write resctrl file {path:?} content {:?}", content.trim_end());
    fs::write(path, content).map_err(|error| BackendError::resctrl(path, error).into())
}

pub(super) fn read_number(path: &Path, radix: u32) -> RdtResult<u64> {
    let content = read(path)?;
    u64::from_str_radix(content.trim(), radix)
        .map_err(|_| BackendError::resctrl_content(path, content.trim()).into())
}

/// A missing file reads as an empty list, the class directory may not exist yet.
pub(super) fn read_cpus(path: &Path) -> RdtResult<BTreeSet<LogicalCoreId>> {
    let Some(content) = read_optional(path)? else {
        return Ok(BTreeSet::new());
    };

    let cpus = cpulist::parse(content.trim())
        .map_err(|_| BackendError::resctrl_content(path, content.trim()))?;
    Ok(cpus.into_iter().map(LogicalCoreId::from).collect())
}

pub(super) fn write_cpus(path: &Path, core_ids: &BTreeSet<LogicalCoreId>) -> RdtResult<()> {
    let list = core_ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    write(path, &format!("{list}\n"))
}

pub(super) fn read_tasks(path: &Path) -> RdtResult<Vec<Pid>> {
    let Some(content) = read_optional(path)? else {
        return Ok(Vec::new());
    };

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| -> RdtResult<Pid> {
            line.parse::<i32>()
                .map(Pid::new)
                .map_err(|_| BackendError::resctrl_content(path, line).into())
        })
        .collect()
}

pub(super) fn create_dir(path: &Path) -> RdtResult<()> {
    tracing::debug!("Create resctrl directory {path:?}");
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(error) => Err(BackendError::resctrl(path, error).into()),
    }
}

pub(super) fn remove_dir(path: &Path) -> RdtResult<()> {
    tracing::debug!("Remove resctrl directory {path:?}");
    fs::remove_dir(path).map_err(|error| BackendError::resctrl(path, error).into())
}

/// Subdirectories sorted by path, a missing directory has none.
pub(super) fn sub_dirs(path: &Path) -> RdtResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(BackendError::resctrl(path, error).into()),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry_path = entry
            .map_err(|error| BackendError::resctrl(path, error))?
            .path();
        if entry_path.is_dir() {
            dirs.push(entry_path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_optional(path: &Path) -> RdtResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(BackendError::resctrl(path, error).into()),
    }
}
