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

//! A [PriceOracle] implementation backed by a static, configured price table.

use crate::domain::PriceOracle;
use alloy_primitives::{Address, U256};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub entries: Vec<PriceEntry>,
}

/// One token's USD rate as a rational number: `usd_value = amount * numerator / denominator`.
/// Using a rational keeps full precision for tokens whose unit value is far below one USD unit.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceEntry {
    pub token: Address,
    pub numerator: u64,
    pub denominator: u64,
}

/// A [PriceOracle] returning configured static rates; tokens without an entry are unpriced.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceTable {
    rates: HashMap<Address, (U256, U256)>,
}

impl StaticPriceTable {
    pub fn new(config: Config) -> Result<Self, InvalidPriceError> {
        let mut rates = HashMap::new();

        for entry in config.entries {
            if entry.denominator == 0 {
                return Err(InvalidPriceError::ZeroDenominator(entry.token));
            }

            rates.insert(
                entry.token,
                (U256::from(entry.numerator), U256::from(entry.denominator)),
            );
        }

        Ok(Self { rates })
    }
}

impl PriceOracle for StaticPriceTable {
    fn usd_value(&self, token: Address, amount: U256) -> Option<U256> {
        let (numerator, denominator) = self.rates.get(&token)?;

        Some(amount.checked_mul(*numerator)? / *denominator)
    }
}

#[derive(Debug, Error)]
pub enum InvalidPriceError {
    #[error("price entry for token {0} has a zero denominator")]
    ZeroDenominator(Address),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use alloy_primitives::address;

    const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");

    #[test]
    fn rates_apply() {
        let table = StaticPriceTable::new(Config {
            entries: vec![PriceEntry {
                token: WETH,
                numerator: 2_500,
                denominator: 1,
            }],
        })
        .unwrap();

        let value = table.usd_value(WETH, U256::from(2u64));
        assert_eq!(value, Some(U256::from(5_000u64)));

        let unknown = table.usd_value(Address::ZERO, U256::from(2u64));
        assert_eq!(unknown, None);
    }

    #[test]
    fn zero_denominators_are_rejected() {
        let result = StaticPriceTable::new(Config {
            entries: vec![PriceEntry {
                token: WETH,
                numerator: 1,
                denominator: 0,
            }],
        });

        assert_matches!(result, Err(InvalidPriceError::ZeroDenominator(token)) if token == WETH);
    }
}
