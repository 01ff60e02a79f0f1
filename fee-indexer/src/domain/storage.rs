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

use ledger_common::domain::{ChainId, FeeEvent, Protocol, ScanCursor};

/// Storage abstraction for fee events and scan cursors.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Get the cursor for the given pair, or `None` if the pair has never been scanned.
    async fn get_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
    ) -> Result<Option<ScanCursor>, sqlx::Error>;

    /// Atomically advance the cursor to `new_block` and clear the error state. The block pointer
    /// is monotonically non-decreasing; an advance to a smaller block is a no-op.
    async fn advance_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        new_block: u64,
    ) -> Result<(), sqlx::Error>;

    /// Record a failed scan attempt: increment the consecutive error count and store the error,
    /// leaving the block pointer unchanged. `last_processed_block` seeds the cursor row if the
    /// pair has never advanced.
    async fn record_error(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        last_processed_block: u64,
        error: &str,
    ) -> Result<(), sqlx::Error>;

    /// Explicit operator reset of the cursor to the given block. Unlike [advance_cursor] this
    /// may move the pointer backwards.
    async fn reset_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        block: u64,
    ) -> Result<(), sqlx::Error>;

    /// Insert the given event if its natural key `(chain_id, tx_hash, log_index)` is unseen.
    /// The uniqueness constraint lives in storage, not in application code, so concurrent
    /// scanners cannot race a check-then-insert.
    async fn insert_event(&self, event: &FeeEvent) -> Result<InsertOutcome, sqlx::Error>;

    /// Stored events matching the given filter, for downstream reporting.
    async fn events(&self, filter: &EventFilter) -> Result<Vec<FeeEvent>, sqlx::Error>;
}

/// Outcome of an idempotent event insert. `AlreadyExists` is expected on re-scans and treated as
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Filter for [Storage::events]. All bounds are inclusive; `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub chain_id: Option<ChainId>,
    pub protocol: Option<Protocol>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_timestamp: Option<u64>,
    pub to_timestamp: Option<u64>,
    pub limit: Option<u32>,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use ledger_common::domain::EventKey;
    use parking_lot::Mutex;
    use std::{
        collections::HashMap,
        sync::Arc,
        time::{SystemTime, UNIX_EPOCH},
    };

    /// In-memory [Storage] for tests, sharing state across clones.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryStorage(Arc<Mutex<Inner>>);

    #[derive(Debug, Default)]
    struct Inner {
        cursors: HashMap<(ChainId, Protocol), ScanCursor>,
        events: HashMap<EventKey, FeeEvent>,
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is after the unix epoch")
            .as_secs()
    }

    impl Storage for MemoryStorage {
        async fn get_cursor(
            &self,
            chain_id: ChainId,
            protocol: Protocol,
        ) -> Result<Option<ScanCursor>, sqlx::Error> {
            Ok(self.0.lock().cursors.get(&(chain_id, protocol)).cloned())
        }

        async fn advance_cursor(
            &self,
            chain_id: ChainId,
            protocol: Protocol,
            new_block: u64,
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.0.lock();
            let cursor = inner
                .cursors
                .entry((chain_id, protocol))
                .or_insert_with(|| ScanCursor::starting_at(new_block));

            if new_block >= cursor.last_processed_block {
                cursor.last_processed_block = new_block;
                cursor.last_processed_at = Some(now());
                cursor.consecutive_error_count = 0;
                cursor.last_error = None;
            }

            Ok(())
        }

        async fn record_error(
            &self,
            chain_id: ChainId,
            protocol: Protocol,
            last_processed_block: u64,
            error: &str,
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.0.lock();
            let cursor = inner
                .cursors
                .entry((chain_id, protocol))
                .or_insert_with(|| ScanCursor::starting_at(last_processed_block));

            cursor.consecutive_error_count += 1;
            cursor.last_error = Some(error.to_string());

            Ok(())
        }

        async fn reset_cursor(
            &self,
            chain_id: ChainId,
            protocol: Protocol,
            block: u64,
        ) -> Result<(), sqlx::Error> {
            self.0
                .lock()
                .cursors
                .insert((chain_id, protocol), ScanCursor::starting_at(block));

            Ok(())
        }

        async fn insert_event(&self, event: &FeeEvent) -> Result<InsertOutcome, sqlx::Error> {
            let mut inner = self.0.lock();
            if inner.events.contains_key(&event.key()) {
                return Ok(InsertOutcome::AlreadyExists);
            }

            inner.events.insert(event.key(), event.clone());
            Ok(InsertOutcome::Inserted)
        }

        async fn events(&self, filter: &EventFilter) -> Result<Vec<FeeEvent>, sqlx::Error> {
            let inner = self.0.lock();
            let mut events = inner
                .events
                .values()
                .filter(|event| {
                    filter.chain_id.is_none_or(|chain_id| event.chain_id == chain_id)
                        && filter.protocol.is_none_or(|protocol| event.protocol == protocol)
                        && filter.from_block.is_none_or(|from| event.block_number >= from)
                        && filter.to_block.is_none_or(|to| event.block_number <= to)
                        && filter
                            .from_timestamp
                            .is_none_or(|from| event.timestamp >= from)
                        && filter.to_timestamp.is_none_or(|to| event.timestamp <= to)
                })
                .cloned()
                .collect::<Vec<_>>();

            events.sort_by_key(|event| (event.block_number, event.log_index));
            if let Some(limit) = filter.limit {
                events.truncate(limit as usize);
            }

            Ok(events)
        }
    }
}
