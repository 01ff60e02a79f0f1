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

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fee_indexer::{
    application,
    config::Config,
    domain::{ChainScanner, PriceOracle, storage::Storage},
    infra::{json_rpc::JsonRpcClient, oracle::StaticPriceTable, storage::sqlite::SqliteStorage},
};
use ledger_common::{config::ConfigExt, domain::{ChainId, Protocol}, infra::pool, telemetry};
use log::{error, info};
use std::{panic, sync::Arc};
use tokio::signal::unix::{SignalKind, signal};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan all configured pairs continuously until SIGTERM.
    Run,

    /// Scan every pair up to the safe chain head once, then exit.
    Scan,

    /// Reset a pair's cursor, e.g. to rescan after a decoder fix.
    ResetCursor {
        #[arg(long)]
        chain: u64,

        #[arg(long)]
        protocol: Protocol,

        /// Block to reset to; defaults to the pair's configured start block.
        #[arg(long)]
        block: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("load configuration")?;
    config.validate().context("validate configuration")?;
    info!(config:?; "starting");

    telemetry::init_metrics(config.telemetry_config.metrics_config.clone());

    let pool = pool::sqlite::SqlitePool::new(config.infra_config.storage_config.clone())
        .await
        .context("create DB pool for Sqlite")?;
    let storage = SqliteStorage::new(pool);
    storage.migrate().await.context("create DB schema")?;

    match cli.command {
        Command::Run => {
            let mut sigterm =
                signal(SignalKind::terminate()).context("register SIGTERM handler")?;
            let scanners = scanners(&config, storage)?;
            let shutdown = async move {
                sigterm.recv().await;
            };

            application::run(config.application_config.clone(), scanners, shutdown)
                .await
                .context("run fee indexer application")
        }

        Command::Scan => {
            let scanners = scanners(&config, storage)?;
            let reports =
                application::scan_all_once(config.application_config.retry.clone(), scanners)
                    .await;

            if reports.iter().any(|report| report.is_failed()) {
                bail!("one or more pairs failed");
            }
            Ok(())
        }

        Command::ResetCursor {
            chain,
            protocol,
            block,
        } => {
            let chain_id = ChainId(chain);
            let pair = config
                .chains
                .iter()
                .find(|chain| chain.chain_id == chain_id)
                .and_then(|chain| chain.pairs.iter().find(|pair| pair.protocol == protocol))
                .with_context(|| format!("pair {chain_id}/{protocol} is not configured"))?;
            let block = block.unwrap_or(pair.scanner_config.start_block);

            storage
                .reset_cursor(chain_id, protocol, block)
                .await
                .context("reset cursor")?;
            info!(chain:% = chain_id, protocol:%, block; "cursor reset");
            Ok(())
        }
    }
}

/// Build one scanner per configured (chain, protocol) pair, all sharing the storage and one RPC
/// client per chain.
fn scanners(
    config: &Config,
    storage: SqliteStorage,
) -> anyhow::Result<Vec<ChainScanner<JsonRpcClient, SqliteStorage>>> {
    let oracle: Arc<dyn PriceOracle> = Arc::new(
        StaticPriceTable::new(config.infra_config.price_config.clone())
            .context("build price table")?,
    );

    let mut scanners = vec![];
    for chain in &config.chains {
        let rpc = JsonRpcClient::new(&chain.rpc_url, config.infra_config.rpc_config.clone())
            .with_context(|| format!("create RPC client for chain {}", chain.name))?;

        for pair in &chain.pairs {
            scanners.push(ChainScanner::new(
                pair.protocol,
                pair.decode_context(chain.chain_id),
                pair.scanner_config.clone(),
                config.schedule.clone(),
                rpc.clone(),
                storage.clone(),
                oracle.clone(),
            ));
        }
    }

    Ok(scanners)
}
