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

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Network identifier, e.g. 1 for Ethereum mainnet.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct ChainId(pub u64);

/// Protocol family emitting affiliate fee events. New protocols are added by implementing one
/// decoder variant, never by modifying the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Protocol {
    SettlementSwap,
    AggregatorTransform,
    BridgeRouter,
    OrderFill,
    CrossChainSwap,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::SettlementSwap,
        Protocol::AggregatorTransform,
        Protocol::BridgeRouter,
        Protocol::OrderFill,
        Protocol::CrossChainSwap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::SettlementSwap => "settlement_swap",
            Protocol::AggregatorTransform => "aggregator_transform",
            Protocol::BridgeRouter => "bridge_router",
            Protocol::OrderFill => "order_fill",
            Protocol::CrossChainSwap => "cross_chain_swap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = UnknownProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settlement_swap" => Ok(Protocol::SettlementSwap),
            "aggregator_transform" => Ok(Protocol::AggregatorTransform),
            "bridge_router" => Ok(Protocol::BridgeRouter),
            "order_fill" => Ok(Protocol::OrderFill),
            "cross_chain_swap" => Ok(Protocol::CrossChainSwap),
            other => Err(UnknownProtocolError(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown protocol {0}")]
pub struct UnknownProtocolError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_string_roundtrip() {
        for protocol in Protocol::ALL {
            let parsed = protocol.to_string().parse::<Protocol>().unwrap();
            assert_eq!(parsed, protocol);
        }

        assert!("uniswap".parse::<Protocol>().is_err());
    }
}
