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

mod event;
mod group;

pub(crate) use event::check_event;
pub use group::GroupState;
pub use group::MonContext;
pub use group::MonGroup;
pub use group::MonTarget;
pub(crate) use group::MbmSnapshot;
pub(crate) use group::PerfSnapshot;
