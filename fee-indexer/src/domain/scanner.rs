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

//! Per-pair block range scanning.
//!
//! One [ChainScanner] exists per (chain, protocol) pair and owns that pair's scan window
//! lifecycle: cursor fetch, bounded log fetch, decode, classify, idempotent persist, cursor
//! advance. Block ranges are processed strictly in increasing order; the cursor is only moved
//! after the whole window is persisted, so a cancelled or failed scan resumes cleanly.

use crate::domain::{
    Decoded, DecodeContext, LogFilter, PriceOracle, RawLog, Rpc, RpcError, TRANSFER_TOPIC,
    classify, decode, protocol_topic,
    storage::{InsertOutcome, Storage},
};
use alloy_primitives::Address;
use itertools::Itertools;
use ledger_common::domain::{ChainId, FeeRateSchedule, Protocol, ScanCursor};
use log::{debug, warn};
use serde::Deserialize;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Identifies one (chain, protocol) scanning pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub chain_id: ChainId,
    pub protocol: Protocol,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.protocol)
    }
}

/// Static per-pair scan parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Block the cursor is seeded at when no cursor exists yet; the first scanned block is
    /// the next one.
    pub start_block: u64,

    /// Number of blocks to stay behind the chain head, avoiding re-orged blocks.
    #[serde(default = "confirmation_depth_default")]
    pub confirmation_depth: u64,

    /// Emitting contract addresses to filter on; empty matches any.
    #[serde(default)]
    pub contracts: Vec<Address>,

    /// Allowed deviation between actual and expected fee rate before flagging.
    #[serde(default)]
    pub tolerance_bps: u32,

    #[serde(default)]
    pub window: WindowConfig,
}

fn confirmation_depth_default() -> u64 {
    12
}

/// Adaptive window sizing bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub default_size: u64,
    pub floor: u64,
    /// Consecutive successful windows before the window grows back toward the default.
    pub grow_after: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_size: 2_000,
            floor: 100,
            grow_after: 10,
        }
    }
}

/// Scan window size, adapted to the RPC collaborator's rate limits: halved (down to a floor) on
/// rate-limit responses, doubled back toward the default ceiling after sustained success.
#[derive(Debug, Clone)]
pub struct AdaptiveWindow {
    size: u64,
    config: WindowConfig,
    successes: u32,
}

impl AdaptiveWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            size: config.default_size,
            config,
            successes: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn shrink(&mut self) {
        self.size = (self.size / 2).max(self.config.floor);
        self.successes = 0;
    }

    pub fn note_success(&mut self) {
        self.successes += 1;
        if self.successes >= self.config.grow_after && self.size < self.config.default_size {
            self.size = (self.size * 2).min(self.config.default_size);
            self.successes = 0;
        }
    }
}

/// Statistics of one scanned window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub from: u64,
    pub to: u64,
    pub events_found: u64,
    pub events_skipped: u64,
    pub events_duplicate: u64,
    pub errors: u64,
}

impl ScanStats {
    /// Fold another window's statistics into this accumulated view.
    pub fn merge(&mut self, other: &ScanStats) {
        self.events_found += other.events_found;
        self.events_skipped += other.events_skipped;
        self.events_duplicate += other.events_duplicate;
        self.errors += other.errors;
        self.to = self.to.max(other.to);
        if self.from == 0 {
            self.from = other.from;
        }
    }
}

/// Outcome of one scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The safe range was empty; the store was not contacted.
    NoOp { head: u64 },
    Scanned(ScanStats),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("RPC failure")]
    Rpc(#[source] RpcError),

    #[error("storage failure")]
    Storage(#[from] sqlx::Error),
}

/// Scanner for one (chain, protocol) pair.
pub struct ChainScanner<R, S> {
    protocol: Protocol,
    ctx: DecodeContext,
    config: ScannerConfig,
    schedule: FeeRateSchedule,
    rpc: R,
    storage: S,
    oracle: Arc<dyn PriceOracle>,
    window: AdaptiveWindow,
}

impl<R, S> ChainScanner<R, S>
where
    R: Rpc,
    S: Storage,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        protocol: Protocol,
        ctx: DecodeContext,
        config: ScannerConfig,
        schedule: FeeRateSchedule,
        rpc: R,
        storage: S,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        let window = AdaptiveWindow::new(config.window.clone());

        Self {
            protocol,
            ctx,
            config,
            schedule,
            rpc,
            storage,
            oracle,
            window,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey {
            chain_id: self.ctx.chain_id,
            protocol: self.protocol,
        }
    }

    pub fn window_size(&self) -> u64 {
        self.window.size()
    }

    /// Scan the next bounded block window for this pair.
    ///
    /// RPC failures are recorded on the cursor (error count and message, pointer untouched) and
    /// surfaced for the orchestrator's backoff; per-event decode failures are counted and
    /// skipped without failing the window.
    pub async fn scan_once(&mut self) -> Result<ScanOutcome, ScanError> {
        let PairKey { chain_id, protocol } = self.key();

        let cursor = self
            .storage
            .get_cursor(chain_id, protocol)
            .await?
            .unwrap_or_else(|| ScanCursor::starting_at(self.config.start_block));
        let last = cursor.last_processed_block;

        let head = match self.rpc.block_head().await {
            Ok(head) => head,
            Err(error) => return self.fail_window(last, error).await,
        };

        let safe_head = head.saturating_sub(self.config.confirmation_depth);
        let from = last + 1;
        let to = (last + self.window.size()).min(safe_head);
        if from > to {
            debug!(pair:% = self.key(), last, head; "caught up, nothing to scan");
            return Ok(ScanOutcome::NoOp { head });
        }

        // Correlated transfers are emitted by token contracts, not the tracked ones, so the
        // address filter would drop them; tracked contracts are re-checked per candidate.
        let addresses = if self.correlates_transfers() {
            vec![]
        } else {
            self.config.contracts.clone()
        };
        let filter = LogFilter {
            addresses,
            topics0: self.topics0(),
            from_block: from,
            to_block: to,
        };
        let logs = match self.rpc.logs(&filter).await {
            Ok(logs) => logs,
            Err(error) => {
                if error.is_rate_limit() {
                    self.window.shrink();
                    warn!(
                        pair:% = self.key(),
                        window_size = self.window.size();
                        "rate limited, window shrunk"
                    );
                }
                return self.fail_window(last, error).await;
            }
        };

        let stats = self.process_window(from, to, logs).await?;

        self.storage.advance_cursor(chain_id, protocol, to).await?;
        self.window.note_success();

        debug!(
            pair:% = self.key(),
            from,
            to,
            events_found = stats.events_found,
            events_skipped = stats.events_skipped,
            events_duplicate = stats.events_duplicate,
            errors = stats.errors;
            "window scanned"
        );

        Ok(ScanOutcome::Scanned(stats))
    }

    /// The first-topic filter for this pair: the protocol's fee event plus, for families that
    /// correlate transfers in the same transaction, the ERC-20 transfer topic.
    fn topics0(&self) -> Vec<alloy_primitives::B256> {
        let mut topics = vec![protocol_topic(self.protocol)];
        if self.correlates_transfers() {
            topics.push(TRANSFER_TOPIC);
        }

        topics
    }

    /// Whether this pair's decoding needs ERC-20 transfers from arbitrary token contracts in
    /// the same transaction.
    fn correlates_transfers(&self) -> bool {
        matches!(
            self.protocol,
            Protocol::AggregatorTransform | Protocol::BridgeRouter
        )
    }

    fn tracked_contract(&self, address: Address) -> bool {
        self.config.contracts.is_empty() || self.config.contracts.contains(&address)
    }

    async fn process_window(
        &self,
        from: u64,
        to: u64,
        logs: Vec<RawLog>,
    ) -> Result<ScanStats, ScanError> {
        let mut stats = ScanStats {
            from,
            to,
            ..Default::default()
        };

        let by_tx = logs
            .iter()
            .cloned()
            .into_group_map_by(|log| log.tx_hash);
        let topic = protocol_topic(self.protocol);

        for log in logs
            .iter()
            .filter(|log| log.topic0() == Some(topic) && self.tracked_contract(log.address))
        {
            let tx_logs = by_tx
                .get(&log.tx_hash)
                .map(Vec::as_slice)
                .unwrap_or_default();

            match decode(self.protocol, log, tx_logs, &self.ctx) {
                Ok(Decoded::Event(mut event)) => {
                    if let (Some(token), Some(amount)) = (event.input_token, event.input_amount) {
                        event.input_value_usd = self.oracle.usd_value(token, amount);
                    }
                    let event = classify(event, &self.schedule, self.config.tolerance_bps);

                    match self.storage.insert_event(&event).await? {
                        InsertOutcome::Inserted => stats.events_found += 1,
                        InsertOutcome::AlreadyExists => stats.events_duplicate += 1,
                    }
                }

                Ok(Decoded::Skip(reason)) => {
                    // The common case, deliberately not an error.
                    stats.events_skipped += 1;
                    debug!(
                        pair:% = self.key(),
                        tx_hash:% = log.tx_hash,
                        log_index = log.log_index,
                        reason:?;
                        "log skipped"
                    );
                }

                Err(error) => {
                    stats.errors += 1;
                    warn!(
                        pair:% = self.key(),
                        tx_hash:% = log.tx_hash,
                        log_index = log.log_index,
                        error:%;
                        "cannot decode log"
                    );
                }
            }
        }

        Ok(stats)
    }

    async fn fail_window(&self, last: u64, error: RpcError) -> Result<ScanOutcome, ScanError> {
        let PairKey { chain_id, protocol } = self.key();
        self.storage
            .record_error(chain_id, protocol, last, &error.to_string())
            .await?;

        Err(ScanError::Rpc(error))
    }
}
