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

/// Class of service number, scoped to a socket for L3 and MBA and to an L2 cluster for L2.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ClassId(u32);

/// Resource monitoring id, a tag correlating hardware counters with a monitoring group.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Rmid(u32);

/// Process id, signed as in the OS interface so that bogus negative values can be rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Pid(i32);

newtype_derive::NewtypeFrom! { () pub struct ClassId(u32); }
newtype_derive::NewtypeDisplay! { () pub struct ClassId(u32); }

newtype_derive::NewtypeFrom! { () pub struct Rmid(u32); }
newtype_derive::NewtypeDisplay! { () pub struct Rmid(u32); }

newtype_derive::NewtypeFrom! { () pub struct Pid(i32); }
newtype_derive::NewtypeDisplay! { () pub struct Pid(i32); }

impl ClassId {
    pub const DEFAULT: ClassId = ClassId(0);

    pub const fn new(class_id: u32) -> Self {
        Self(class_id)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Rmid {
    /// All cores are associated with RMID 0 unless monitored.
    pub const UNMONITORED: Rmid = Rmid(0);

    pub const fn new(rmid: u32) -> Self {
        Self(rmid)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Pid {
    pub const fn new(pid: i32) -> Self {
        Self(pid)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}
