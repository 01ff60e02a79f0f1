// This file is part of fee-ledger-indexer.
// Copyright (C) 2026 Fee Ledger Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Resumable scan progress for one (chain, protocol) pair. The block pointer is monotonically
/// non-decreasing: successful scans advance it, failed scans only increment the error count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor {
    pub last_processed_block: u64,
    /// Unix seconds of the last successful advance, `None` until one happened.
    pub last_processed_at: Option<u64>,
    pub consecutive_error_count: u32,
    pub last_error: Option<String>,
}

impl ScanCursor {
    /// Zero-value cursor for a pair that has never been scanned; `start_block` is the configured
    /// default starting block.
    pub fn starting_at(start_block: u64) -> Self {
        Self {
            last_processed_block: start_block,
            last_processed_at: None,
            consecutive_error_count: 0,
            last_error: None,
        }
    }
}
