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

use crate::domain::{ChainId, Protocol};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// One detected affiliate-fee-bearing transaction leg. Absent swap leg fields are `None`, never
/// defaulted to zero; zero is a meaningful on-chain value distinct from "unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEvent {
    pub chain_id: ChainId,
    pub protocol: Protocol,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub affiliate_address: Address,
    pub fee_token: Address,
    pub fee_amount: U256,
    pub input_token: Option<Address>,
    pub input_amount: Option<U256>,
    pub output_token: Option<Address>,
    pub output_amount: Option<U256>,
    /// USD-equivalent of the input leg in raw oracle units; set by the injected price oracle.
    pub input_value_usd: Option<U256>,
    pub expected_fee_bps: Option<u32>,
    pub actual_fee_bps: Option<u32>,
    /// Block time of the event in unix seconds; selects the applicable rate schedule tier.
    pub timestamp: u64,
    pub flags: ValidationFlags,
}

impl FeeEvent {
    /// The natural uniqueness key of this event.
    pub fn key(&self) -> EventKey {
        EventKey {
            chain_id: self.chain_id,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}

/// Natural key of a [FeeEvent]: transaction hashes are unique per chain, the log index
/// disambiguates multiple events within one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub chain_id: ChainId,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Validation outcome flags computed by the fee classifier. A flagged record is not an error; it
/// is persisted with its flags set and surfaced for fraud review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationFlags {
    /// Actual fee rate differs from the scheduled rate beyond tolerance.
    pub rate_mismatch: bool,
    /// The fee amount or the actual fee rate is zero.
    pub zero_fee: bool,
    /// A field required for rate validation is unknown.
    pub missing_fields: bool,
    /// The fee was inferred via the treasury-receipt heuristic, not read from a fee field.
    pub heuristic_fee: bool,
}

impl ValidationFlags {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ValidationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = vec![];
        if self.rate_mismatch {
            names.push("rate_mismatch");
        }
        if self.zero_fee {
            names.push("zero_fee");
        }
        if self.missing_fields {
            names.push("missing_fields");
        }
        if self.heuristic_fee {
            names.push("heuristic_fee");
        }

        f.write_str(&names.join(","))
    }
}

impl FromStr for ValidationFlags {
    type Err = UnknownFlagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = ValidationFlags::default();

        for name in s.split(',').filter(|name| !name.is_empty()) {
            match name {
                "rate_mismatch" => flags.rate_mismatch = true,
                "zero_fee" => flags.zero_fee = true,
                "missing_fields" => flags.missing_fields = true,
                "heuristic_fee" => flags.heuristic_fee = true,
                other => return Err(UnknownFlagError(other.to_string())),
            }
        }

        Ok(flags)
    }
}

#[derive(Debug, Error)]
#[error("unknown validation flag {0}")]
pub struct UnknownFlagError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_text_roundtrip() {
        let flags = ValidationFlags {
            rate_mismatch: true,
            heuristic_fee: true,
            ..Default::default()
        };

        let parsed = flags.to_string().parse::<ValidationFlags>().unwrap();
        assert_eq!(parsed, flags);

        let empty = "".parse::<ValidationFlags>().unwrap();
        assert!(empty.is_empty());

        assert!("bogus_flag".parse::<ValidationFlags>().is_err());
    }
}
