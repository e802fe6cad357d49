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

use newtype_derive::newtype_fmt;
use serde::Deserialize;
use serde::Serialize;

pub type CPUIdType = u32;

/// An opaque type that represents a CPU logical core.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct LogicalCoreId(CPUIdType);

/// A physical package, all cores of a socket share the L3 cache
/// and the memory controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct SocketId(CPUIdType);

/// A group of cores sharing one L2 cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct L2Id(CPUIdType);

newtype_derive::NewtypeFrom! { () pub struct LogicalCoreId(CPUIdType); }
newtype_derive::NewtypeDisplay! { () pub struct LogicalCoreId(CPUIdType); }

newtype_derive::NewtypeFrom! { () pub struct SocketId(CPUIdType); }
newtype_derive::NewtypeDisplay! { () pub struct SocketId(CPUIdType); }

newtype_derive::NewtypeFrom! { () pub struct L2Id(CPUIdType); }
newtype_derive::NewtypeDisplay! { () pub struct L2Id(CPUIdType); }

impl LogicalCoreId {
    pub const fn new(core_id: CPUIdType) -> Self {
        Self(core_id)
    }
}

impl SocketId {
    pub const fn new(socket_id: CPUIdType) -> Self {
        Self(socket_id)
    }
}

impl L2Id {
    pub const fn new(l2_id: CPUIdType) -> Self {
        Self(l2_id)
    }
}

impl From<LogicalCoreId> for usize {
    fn from(value: LogicalCoreId) -> usize {
        value.0 as usize
    }
}

impl From<SocketId> for usize {
    fn from(value: SocketId) -> usize {
        value.0 as usize
    }
}

impl From<L2Id> for usize {
    fn from(value: L2Id) -> usize {
        value.0 as usize
    }
}
