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

use log::error;
use logforth::append;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::SocketAddr;

/// Telemetry configuration: logging and metrics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "metrics", default)]
    pub metrics_config: MetricsConfig,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus exposition listener; metrics are disabled if unset.
    #[serde(default)]
    pub address: Option<SocketAddr>,
}

/// Initialize logging to stderr; log level is taken from the `RUST_LOG` environment variable,
/// defaulting to `info`.
pub fn init_logging() {
    let max_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(log::LevelFilter::Info);
    let max_level = match max_level {
        log::LevelFilter::Off => logforth::record::LevelFilter::Off,
        log::LevelFilter::Error => {
            logforth::record::LevelFilter::MoreSevereEqual(logforth::record::Level::Error)
        }
        log::LevelFilter::Warn => {
            logforth::record::LevelFilter::MoreSevereEqual(logforth::record::Level::Warn)
        }
        log::LevelFilter::Info => {
            logforth::record::LevelFilter::MoreSevereEqual(logforth::record::Level::Info)
        }
        log::LevelFilter::Debug => {
            logforth::record::LevelFilter::MoreSevereEqual(logforth::record::Level::Debug)
        }
        log::LevelFilter::Trace => {
            logforth::record::LevelFilter::MoreSevereEqual(logforth::record::Level::Trace)
        }
    };

    logforth::starter_log::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(max_level)
                .append(append::Stderr::default())
        })
        .apply();
}

/// Initialize the Prometheus metrics exporter if an address is configured.
pub fn init_metrics(config: MetricsConfig) {
    let Some(address) = config.address else {
        return;
    };

    if let Err(error) = PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
    {
        error!(error:% = error, address:%; "cannot install Prometheus metrics exporter");
    }
}
