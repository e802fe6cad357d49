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

use thiserror::Error as ThisError;

use crate::LogicalCoreId;
use crate::SocketId;

#[derive(Debug, ThisError)]
pub enum CPUTopologyError {
    #[error(transparent)]
    RawHwlocError(#[from] hwlocality::errors::RawHwlocError),

    #[error("no packages found in the topology")]
    SocketsNotFound,

    #[error("cpuset for a package with {socket_id} id not found")]
    CPUSetNotFound { socket_id: SocketId },

    #[error("logical core {core_id} doesn't belong to any package")]
    SocketNotFound { core_id: LogicalCoreId },
}

impl CPUTopologyError {
    pub fn cpuset_not_found(socket_id: SocketId) -> Self {
        Self::CPUSetNotFound { socket_id }
    }

    pub fn socket_not_found(core_id: LogicalCoreId) -> Self {
        Self::SocketNotFound { core_id }
    }
}
