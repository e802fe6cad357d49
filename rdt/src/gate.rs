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

use parking_lot::Mutex;

use crate::Backends;
use crate::RdtError;
use crate::RdtResult;

#[derive(Default)]
struct GateState {
    backends: Option<Backends>,
}

/// Serializes every operation of the library, at most one is in flight at a time.
pub(crate) struct Gate {
    state: Mutex<GateState>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
        }
    }

    pub(crate) fn init(&self, backends: Backends) -> RdtResult<()> {
        let mut state = self.state.lock();
        if state.backends.is_some() {
            tracing::error!("RDT control is already initialized");
            return Err(RdtError::AlreadyInitialized);
        }

        state.backends = Some(backends);
        Ok(())
    }

    pub(crate) fn fini(&self) -> RdtResult<Backends> {
        self.state.lock().backends.take().ok_or_else(|| {
            tracing::error!("RDT control is not initialized");
            RdtError::NotInitialized
        })
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.state.lock().backends.is_some()
    }

    /// Runs the operation holding the lock, the lock is released on every exit path
    /// when the guard goes out of scope.
    pub(crate) fn enter<R>(
        &self,
        operation: impl FnOnce(&mut Backends) -> RdtResult<R>,
    ) -> RdtResult<R> {
        let mut state = self.state.lock();
        let backends = state.backends.as_mut().ok_or_else(|| {
            tracing::error!("RDT control is not initialized");
            RdtError::NotInitialized
        })?;

        operation(backends)
    }
}
