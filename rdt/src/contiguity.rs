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

/// Checks that the set bits of a capacity mask form a single run, zero is never contiguous.
pub fn is_contiguous(bitmask: u64) -> bool {
    if bitmask == 0 {
        return false;
    }

    let without_trailing_zeros = bitmask >> bitmask.trailing_zeros();
    let ones = without_trailing_zeros.trailing_ones();
    ones == u64::BITS || without_trailing_zeros >> ones == 0
}
