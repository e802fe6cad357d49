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

use crate::RdtError;
use crate::RdtResult;

/// An event mask must be non-empty, must not carry unknown bits
/// and may ask for perf events only together with an RDT event.
pub(crate) fn check_event(event: MonEvent) -> RdtResult<()> {
    if event.is_empty() {
        return Err(RdtError::invalid_param("no monitoring event requested"));
    }

    let unknown_bits = event.bits() & !MonEvent::all().bits();
    if unknown_bits != 0 {
        return Err(RdtError::invalid_param(format!(
            "unknown monitoring events {unknown_bits:#x}"
        )));
    }

    if event.has_auxiliary() && !event.has_primary() {
        return Err(RdtError::invalid_param(
            "perf events can be monitored only along with an RDT event",
        ));
    }

    Ok(())
}
