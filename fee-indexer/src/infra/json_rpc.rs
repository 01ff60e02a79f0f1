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

//! An [Rpc] implementation speaking the Ethereum JSON-RPC protocol over HTTP.

use crate::domain::{LogFilter, RawLog, Rpc, RpcError};
use alloy_primitives::{Address, B256, Bytes};
use log::debug;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

/// Config for the JSON-RPC connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// An [Rpc] implementation based on reqwest.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: HttpClient,
    url: String,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, config: Config) -> Result<Self, JsonRpcClientError> {
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn request<T>(&self, method: &str, params: Value) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest)?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(RpcError::RateLimited);
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(classify_reqwest)?;
        match (envelope.result, envelope.error) {
            (_, Some(error)) if error.is_rate_limit() => Err(RpcError::RateLimited),

            (_, Some(error)) => Err(RpcError::Transport(Box::new(NodeError {
                method: method.to_owned(),
                code: error.code,
                message: error.message,
            }))),

            (Some(result), None) => Ok(result),

            (None, None) => Err(RpcError::Malformed(format!(
                "{method} response has neither result nor error"
            ))),
        }
    }

    /// Fetch the timestamps for the given block numbers.
    async fn block_timestamps(
        &self,
        block_numbers: impl IntoIterator<Item = u64>,
    ) -> Result<HashMap<u64, u64>, RpcError> {
        let mut timestamps = HashMap::new();

        for block_number in block_numbers {
            let header = self
                .request::<Option<BlockHeader>>(
                    "eth_getBlockByNumber",
                    json!([quantity(block_number), false]),
                )
                .await?;

            // A block that delivered logs but cannot be fetched means the node answered the log
            // query from a view it no longer has.
            let header = header.ok_or(RpcError::StaleResult)?;
            timestamps.insert(block_number, header.timestamp.0);
        }

        Ok(timestamps)
    }
}

impl Rpc for JsonRpcClient {
    async fn block_head(&self) -> Result<u64, RpcError> {
        let head = self.request::<Quantity>("eth_blockNumber", json!([])).await?;

        Ok(head.0)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, RpcError> {
        let mut query = json!({
            "fromBlock": quantity(filter.from_block),
            "toBlock": quantity(filter.to_block),
            "topics": [filter.topics0],
        });
        if !filter.addresses.is_empty() {
            query["address"] = json!(filter.addresses);
        }

        let entries = self
            .request::<Vec<LogEntry>>("eth_getLogs", json!([query]))
            .await?;
        debug!(
            from_block = filter.from_block,
            to_block = filter.to_block,
            entries = entries.len();
            "logs fetched"
        );

        let entries = entries
            .into_iter()
            .filter(|entry| !entry.removed)
            .collect::<Vec<_>>();
        let timestamps = self
            .block_timestamps(
                entries
                    .iter()
                    .map(|entry| entry.block_number.0)
                    .collect::<std::collections::HashSet<_>>(),
            )
            .await?;

        let logs = entries
            .into_iter()
            .map(|entry| RawLog {
                address: entry.address,
                topics: entry.topics,
                data: entry.data,
                block_number: entry.block_number.0,
                block_timestamp: timestamps
                    .get(&entry.block_number.0)
                    .copied()
                    .unwrap_or_default(),
                tx_hash: entry.transaction_hash,
                log_index: entry.log_index.0,
            })
            .collect();

        Ok(logs)
    }
}

#[derive(Debug, Error)]
pub enum JsonRpcClientError {
    #[error("cannot build HTTP client")]
    BuildClient(#[from] reqwest::Error),
}

/// A node-side JSON-RPC error response.
#[derive(Debug, Error)]
#[error("{method} failed with code {code}: {message}")]
struct NodeError {
    method: String,
    code: i64,
    message: String,
}

fn classify_reqwest(error: reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::Timeout
    } else if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        RpcError::RateLimited
    } else {
        RpcError::Transport(error.into())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

impl ErrorObject {
    /// Providers signal rate limiting either with the quasi-standard -32005 code or with a
    /// message mentioning it.
    fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: Quantity,
    transaction_hash: B256,
    log_index: Quantity,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: Quantity,
}

/// A JSON-RPC quantity: a u64 encoded as a minimal `0x`-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Quantity(u64);

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        let digits = hex
            .strip_prefix("0x")
            .ok_or_else(|| serde::de::Error::custom(format!("quantity without 0x: {hex}")))?;
        let value = u64::from_str_radix(digits, 16)
            .map_err(|error| serde::de::Error::custom(format!("invalid quantity {hex}: {error}")))?;

        Ok(Self(value))
    }
}

fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn quantities_roundtrip() {
        assert_eq!(quantity(0), "0x0");
        assert_eq!(quantity(19_000_000), "0x121eac0");

        let parsed = serde_json::from_str::<Quantity>("\"0x121eac0\"").unwrap();
        assert_eq!(parsed.0, 19_000_000);

        assert!(serde_json::from_str::<Quantity>("\"121eac0\"").is_err());
        assert!(serde_json::from_str::<Quantity>("\"0xzz\"").is_err());
    }

    #[test]
    fn log_entries_deserialize() {
        let entry = serde_json::from_str::<LogEntry>(
            r#"{
                "address": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
                "topics": [
                    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                ],
                "data": "0x0000000000000000000000000000000000000000000000000000000000000037",
                "blockNumber": "0x121eac0",
                "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "logIndex": "0x2",
                "removed": false
            }"#,
        )
        .unwrap();

        assert_eq!(entry.block_number.0, 19_000_000);
        assert_eq!(entry.log_index.0, 2);
        assert!(!entry.removed);
    }

    #[test]
    fn rate_limits_are_recognized() {
        let envelope = serde_json::from_str::<Envelope<Quantity>>(
            r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": -32005, "message": "limit reached"}}"#,
        )
        .unwrap();
        assert_matches!(envelope.error, Some(error) if error.is_rate_limit());

        let envelope = serde_json::from_str::<Envelope<Quantity>>(
            r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "Rate limit exceeded"}}"#,
        )
        .unwrap();
        assert_matches!(envelope.error, Some(error) if error.is_rate_limit());

        let envelope = serde_json::from_str::<Envelope<Quantity>>(
            r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "invalid params"}}"#,
        )
        .unwrap();
        assert_matches!(envelope.error, Some(error) if !error.is_rate_limit());
    }
}
