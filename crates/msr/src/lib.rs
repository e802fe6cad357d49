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

/// This crate gives access to the MSR registers of Resource Director Technology
/// on the archs where they are reachable, e.g. Linux on x86_64 via /dev/cpu/N/msr.
/// For everything else every register access fails.

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
#[path = "linux_x86_64/mod.rs"]
mod msr_impl;
#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
#[path = "other/mod.rs"]
mod msr_impl;

mod errors;
mod features;
pub mod registers;

use rdt_shared::types::LogicalCoreId;

pub use errors::MSRError;
pub use features::CatFeatures;
pub use features::MbaFeatures;
pub use features::MonFeatures;
pub use features::RdtFeatures;
pub use msr_impl::DevCpuMsr;

pub type MSRResult<T> = Result<T, MSRError>;

/// Raw access to model specific registers of a logical core.
pub trait MsrAccess: Send {
    fn read(&self, register_id: u32, core_id: LogicalCoreId) -> MSRResult<u64>;

    fn write(&self, register_id: u32, value: u64, core_id: LogicalCoreId) -> MSRResult<()>;

    /// Overwrites only the bits selected by the mask, keeping the rest of the register.
    fn write_masked(
        &self,
        register_id: u32,
        value: u64,
        mask: u64,
        core_id: LogicalCoreId,
    ) -> MSRResult<()> {
        let old_value = self.read(register_id, core_id)?;
        self.write(register_id, masked_value(old_value, value, mask), core_id)
    }
}

pub fn masked_value(old_value: u64, new_value: u64, mask: u64) -> u64 {
    (new_value & mask) | (old_value & !mask)
}
