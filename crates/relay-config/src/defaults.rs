// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Deployment events are searched `5000` blocks at a time by default.
pub const fn max_log_block_range() -> u64 {
    5000
}
/// Failed ledger calls are retried `3` times by default.
pub const fn max_retries() -> usize {
    3
}
/// Retries are spaced `500` milliseconds apart by default.
pub const fn retry_interval_ms() -> u64 {
    500
}
