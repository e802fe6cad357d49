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

use thiserror::Error as ThisError;

use cpu_utils::CPUTopologyError;
use rdt_msr::MSRError;
use rdt_shared::types::InvalidCdpConfig;
use rdt_shared::types::LogicalCoreId;
use rdt_shared::types::Rmid;

pub type RdtResult<T> = Result<T, RdtError>;

/// Coarse classification of failures, mirrors the classic PARAM, INIT and ERROR return codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Param,
    Init,
    Error,
}

#[derive(ThisError, Debug)]
pub enum RdtError {
    #[error("invalid parameter: {reason}")]
    InvalidParam { reason: String },

    #[error("RDT control is not initialized")]
    NotInitialized,

    #[error("RDT control is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(ThisError, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Msr(#[from] MSRError),

    #[error(transparent)]
    Topology(#[from] CPUTopologyError),

    #[error("accessing resctrl file {path:?} failed: {io_error}")]
    Resctrl {
        path: PathBuf,
        io_error: std::io::Error,
    },

    #[error("resctrl file {path:?} has unexpected content {content:?}")]
    ResctrlContent { path: PathBuf, content: String },

    #[error("{feature} is not built")]
    NotBuilt { feature: &'static str },

    #[error("{feature} is not supported")]
    Unsupported { feature: String },

    #[error("no free {resource} left")]
    ResourceExhausted { resource: &'static str },

    #[error("monitoring is already started on core {core_id}")]
    CoreBusy { core_id: LogicalCoreId },

    #[error("counter of RMID {rmid} read at core {core_id} is not available")]
    CounterUnavailable { rmid: Rmid, core_id: LogicalCoreId },
}

impl RdtError {
    pub fn invalid_param(reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RdtError::InvalidParam { .. } => ErrorKind::Param,
            RdtError::NotInitialized | RdtError::AlreadyInitialized => ErrorKind::Init,
            RdtError::Backend(_) => ErrorKind::Error,
        }
    }
}

impl BackendError {
    pub fn resctrl(path: impl Into<PathBuf>, io_error: std::io::Error) -> Self {
        Self::Resctrl {
            path: path.into(),
            io_error,
        }
    }

    pub fn resctrl_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self::ResctrlContent {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn not_built(feature: &'static str) -> Self {
        Self::NotBuilt { feature }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    pub fn resource_exhausted(resource: &'static str) -> Self {
        Self::ResourceExhausted { resource }
    }
}

impl From<MSRError> for RdtError {
    fn from(error: MSRError) -> Self {
        RdtError::Backend(error.into())
    }
}

impl From<CPUTopologyError> for RdtError {
    fn from(error: CPUTopologyError) -> Self {
        RdtError::Backend(error.into())
    }
}

impl From<InvalidCdpConfig> for RdtError {
    fn from(error: InvalidCdpConfig) -> Self {
        RdtError::invalid_param(error.to_string())
    }
}
