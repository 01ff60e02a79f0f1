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

use crate::{
    application,
    domain::{DecodeContext, ScannerConfig},
    infra,
};
use alloy_primitives::Address;
use ledger_common::{
    domain::{ChainId, FeeRateSchedule, Protocol},
    telemetry,
};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "application")]
    pub application_config: application::Config,

    #[serde(rename = "infra")]
    pub infra_config: infra::Config,

    #[serde(rename = "telemetry", default)]
    pub telemetry_config: telemetry::Config,

    /// The affiliate program's fee rate schedule, shared by all pairs.
    pub schedule: FeeRateSchedule,

    pub chains: Vec<ChainConfig>,
}

impl Config {
    /// Reject configurations that cannot produce a working scanner. Called once at startup;
    /// failures here are fatal, no scanning starts.
    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        let mut seen = HashSet::new();

        for chain in &self.chains {
            if chain.pairs.is_empty() {
                return Err(InvalidConfigError::NoPairs(chain.chain_id));
            }

            for pair in &chain.pairs {
                if !seen.insert((chain.chain_id, pair.protocol)) {
                    return Err(InvalidConfigError::DuplicatePair(
                        chain.chain_id,
                        pair.protocol,
                    ));
                }

                match pair.protocol {
                    Protocol::BridgeRouter if pair.treasury.is_none() => {
                        return Err(InvalidConfigError::MissingTreasury(
                            chain.chain_id,
                            pair.protocol,
                        ));
                    }

                    Protocol::OrderFill | Protocol::CrossChainSwap
                        if pair.partner_ids.is_empty() =>
                    {
                        return Err(InvalidConfigError::MissingPartnerIds(
                            chain.chain_id,
                            pair.protocol,
                        ));
                    }

                    _ => {}
                }
            }
        }

        Ok(())
    }
}

/// One chain with its RPC endpoint and the pairs scanned on it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub rpc_url: String,
    pub pairs: Vec<PairConfig>,
}

/// One (chain, protocol) pair: the tracked recipients plus the scan parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub protocol: Protocol,

    /// The fee recipient whose revenue share is recorded.
    pub affiliate: Address,

    /// Treasury address for the bridge receipt heuristic; required for bridge pairs.
    #[serde(default)]
    pub treasury: Option<Address>,

    /// Known partner-ID strings for memo-based attribution; required for memo-attributed
    /// pairs.
    #[serde(default)]
    pub partner_ids: Vec<String>,

    /// Upper bound for the treasury-receipt heuristic, as a fraction of transaction volume in
    /// basis points.
    #[serde(default = "treasury_max_fraction_bps_default")]
    pub treasury_max_fraction_bps: u32,

    #[serde(rename = "scan")]
    pub scanner_config: ScannerConfig,
}

impl PairConfig {
    pub fn decode_context(&self, chain_id: ChainId) -> DecodeContext {
        DecodeContext {
            chain_id,
            affiliate: self.affiliate,
            treasury: self.treasury,
            partner_ids: self.partner_ids.iter().cloned().collect(),
            treasury_max_fraction_bps: self.treasury_max_fraction_bps,
        }
    }
}

fn treasury_max_fraction_bps_default() -> u32 {
    100
}

#[derive(Debug, Error)]
pub enum InvalidConfigError {
    #[error("chain {0} has no pairs configured")]
    NoPairs(ChainId),

    #[error("pair {0}/{1} is configured more than once")]
    DuplicatePair(ChainId, Protocol),

    #[error("pair {0}/{1} requires a treasury address")]
    MissingTreasury(ChainId, Protocol),

    #[error("pair {0}/{1} requires at least one partner ID")]
    MissingPartnerIds(ChainId, Protocol),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ledger_common::config::ConfigExt;

    const CONFIG_YAML: &str = r#"
        application:
          scan_interval: 10s
          retry:
            max_attempts: 3
            base_delay: 250ms
            max_delay: 10s
        infra:
          storage:
            url: "sqlite://fee-ledger.sqlite"
          rpc:
            request_timeout: 5s
        telemetry:
          metrics:
            address: "0.0.0.0:9100"
        schedule:
          - effective_from: 1704067200
            expected_bps: 55
        chains:
          - chain_id: 1
            name: mainnet
            rpc_url: "https://rpc.example.invalid"
            pairs:
              - protocol: settlement_swap
                affiliate: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
                scan:
                  start_block: 19000000
              - protocol: bridge_router
                affiliate: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
                treasury: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
                scan:
                  start_block: 19000000
                  window:
                    default_size: 500
    "#;

    #[test]
    fn load_and_validate() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.yaml", CONFIG_YAML)?;
            jail.set_env("CONFIG_FILE", "config.yaml");

            let config = Config::load().expect("config can be loaded");
            config.validate().expect("config is valid");

            assert_eq!(config.chains.len(), 1);
            let chain = &config.chains[0];
            assert_eq!(chain.chain_id, ChainId(1));
            assert_eq!(chain.pairs.len(), 2);
            assert_eq!(chain.pairs[0].protocol, Protocol::SettlementSwap);
            assert_eq!(chain.pairs[1].scanner_config.window.default_size, 500);
            assert_eq!(config.application_config.retry.max_attempts, 3);

            Ok(())
        });
    }

    #[test]
    fn bridge_pair_without_treasury_is_rejected() {
        figment::Jail::expect_with(|jail| {
            let yaml = CONFIG_YAML.replace(
                "\n                treasury: \"0x70997970c51812dc3a010c7d01b50e0d17dc79c8\"",
                "",
            );
            jail.create_file("config.yaml", &yaml)?;
            jail.set_env("CONFIG_FILE", "config.yaml");

            let config = Config::load().expect("config can be loaded");
            assert_matches!(
                config.validate(),
                Err(InvalidConfigError::MissingTreasury(ChainId(1), Protocol::BridgeRouter))
            );

            Ok(())
        });
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        figment::Jail::expect_with(|jail| {
            let yaml = CONFIG_YAML.replace("protocol: bridge_router", "protocol: settlement_swap");
            jail.create_file("config.yaml", &yaml)?;
            jail.set_env("CONFIG_FILE", "config.yaml");

            let config = Config::load().expect("config can be loaded");
            assert_matches!(
                config.validate(),
                Err(InvalidConfigError::DuplicatePair(ChainId(1), Protocol::SettlementSwap))
            );

            Ok(())
        });
    }
}
