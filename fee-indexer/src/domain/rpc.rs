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

use alloy_primitives::{Address, B256, Bytes};
use ledger_common::error::BoxError;
use thiserror::Error;

/// Node/RPC abstraction. The engine does not manage connection pooling or endpoint failover;
/// it only consumes logs and the chain head, and classifies the collaborator's failures.
#[trait_variant::make(Send)]
pub trait Rpc
where
    Self: Clone + Send + Sync + 'static,
{
    /// The number of the highest block known to the node.
    async fn block_head(&self) -> Result<u64, RpcError>;

    /// All logs matching the given filter, ordered by (block_number, log_index).
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, RpcError>;
}

/// Address/topic filter over a bounded block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract addresses; empty matches any address.
    pub addresses: Vec<Address>,
    /// Accepted first topics; empty matches any topic.
    pub topics0: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

/// A raw, undecoded log as delivered by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    /// Block time in unix seconds.
    pub block_timestamp: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

impl RawLog {
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// The address packed into the given topic, if present.
    pub fn topic_address(&self, index: usize) -> Option<Address> {
        self.topics
            .get(index)
            .map(|topic| Address::from_slice(&topic[12..]))
    }
}

/// RPC failure taxonomy. All variants are transient from the scanner's point of view and subject
/// to bounded retry with backoff; rate limits additionally shrink the scan window.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC request timed out")]
    Timeout,

    #[error("RPC rate limit exceeded")]
    RateLimited,

    #[error("RPC returned a stale result, likely due to a chain reorg")]
    StaleResult,

    #[error("RPC transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("malformed RPC response: {0}")]
    Malformed(String),
}

impl RpcError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RpcError::RateLimited)
    }
}
