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

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

mod api;
mod backend;
mod contiguity;
mod domain;
mod errors;
mod gate;
pub mod hw;
mod limits;
pub mod monitoring;
pub mod os;
mod setup;

pub use api::global;
pub use api::RdtApi;
pub use backend::AsRdtBackend;
pub use backend::BackendSelector;
pub use backend::Backends;
pub use backend::HwBackend;
pub use backend::Interface;
pub use backend::OsBackend;
pub use backend::PidMonitor;
pub use backend::RdtBackend;
pub use backend::StaticSelector;
pub use contiguity::is_contiguous;
pub use errors::BackendError;
pub use errors::ErrorKind;
pub use errors::RdtError;
pub use errors::RdtResult;
pub use monitoring::GroupState;
pub use monitoring::MonContext;
pub use monitoring::MonGroup;
pub use monitoring::MonTarget;
pub use setup::resolve_interface;

pub use rdt_shared::types::*;
