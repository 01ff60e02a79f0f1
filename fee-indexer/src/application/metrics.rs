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

use crate::domain::{PairKey, ScanStats};
use metrics::{Counter, Gauge, counter, gauge};

/// Per-pair metric handles, labeled with chain and protocol.
pub struct Metrics {
    events_found: Counter,
    events_skipped: Counter,
    events_duplicate: Counter,
    decode_errors: Counter,
    scan_failures: Counter,
    cursor_block: Gauge,
    window_size: Gauge,
}

impl Metrics {
    pub fn new(key: &PairKey) -> Self {
        let chain = key.chain_id.to_string();
        let protocol = key.protocol.to_string();

        Self {
            events_found: counter!(
                "fee_indexer_events_found",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            events_skipped: counter!(
                "fee_indexer_events_skipped",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            events_duplicate: counter!(
                "fee_indexer_events_duplicate",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            decode_errors: counter!(
                "fee_indexer_decode_errors",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            scan_failures: counter!(
                "fee_indexer_scan_failures",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            cursor_block: gauge!(
                "fee_indexer_cursor_block",
                "chain" => chain.clone(), "protocol" => protocol.clone()
            ),
            window_size: gauge!(
                "fee_indexer_window_size",
                "chain" => chain, "protocol" => protocol
            ),
        }
    }

    pub fn window_scanned(&self, stats: &ScanStats, window_size: u64) {
        self.events_found.increment(stats.events_found);
        self.events_skipped.increment(stats.events_skipped);
        self.events_duplicate.increment(stats.events_duplicate);
        self.decode_errors.increment(stats.errors);
        self.cursor_block.set(stats.to as f64);
        self.window_size.set(window_size as f64);
    }

    pub fn scan_failed(&self) {
        self.scan_failures.increment(1);
    }
}
