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

mod fake_msr;
mod fake_resctrl;
mod topology;

pub use fake_msr::FakeMsr;
pub use fake_msr::MsrWrite;
pub use fake_resctrl::FakeResctrl;
pub use fake_resctrl::FakeResctrlLayout;
pub use topology::single_socket_cpu_info;
pub use topology::two_socket_cpu_info;
