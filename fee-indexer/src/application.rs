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

//! Orchestration of the per-pair scanners.
//!
//! Each (chain, protocol) pair runs in its own task: pairs make progress independently, one
//! failing or rate-limited pair never stalls the others. Transient failures are retried with
//! exponential backoff and jitter; a pair that exhausts its retries is marked failed and its
//! task ends while the remaining pairs keep running.

mod metrics;

use crate::{
    application::metrics::Metrics,
    domain::{
        ChainScanner, PairKey, Rpc, ScanError, ScanOutcome, ScanStats, storage::Storage,
    },
};
use anyhow::bail;
use fastrace::{Span, future::FutureExt, prelude::SpanContext};
use itertools::Itertools;
use log::{error, info, warn};
use rand::Rng;
use serde::Deserialize;
use std::{error::Error as StdError, future::Future, pin::pin, time::Duration};
use tokio::{select, task::JoinSet, time::sleep};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Pause between scan invocations once a pair has caught up with the safe chain head.
    #[serde(with = "humantime_serde", default = "scan_interval_default")]
    pub scan_interval: Duration,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn scan_interval_default() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per scan window before the pair is marked failed.
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Final state of one pair after a bounded scan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// The pair caught up with the safe chain head.
    CaughtUp,

    /// The pair exhausted its retries; the cursor holds the error details.
    Failed(String),
}

/// Accumulated result of one pair's scan run.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub key: PairKey,
    pub stats: ScanStats,
    pub windows: u64,
    pub outcome: PairOutcome,
}

impl PairReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PairOutcome::Failed(_))
    }
}

/// Run all pairs continuously until the shutdown future resolves.
///
/// Pairs that exhaust their retries stop individually while the remaining pairs keep running.
/// The run fails once every pair has stopped, and also on shutdown when any pair has failed,
/// so the process exits non-zero.
pub async fn run<R, S>(
    config: Config,
    scanners: Vec<ChainScanner<R, S>>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: Rpc,
    S: Storage,
{
    if scanners.is_empty() {
        bail!("no scan pairs configured");
    }
    info!(pairs = scanners.len(); "starting scan workers");

    let mut tasks = JoinSet::new();
    for scanner in scanners {
        tasks.spawn(run_pair(scanner, config.clone()));
    }

    let mut shutdown = pin!(shutdown);
    let mut failed = vec![];

    loop {
        select! {
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok(report)) => {
                        // run_pair only returns once its retries are exhausted.
                        error!(pair:% = report.key, outcome:? = report.outcome; "pair worker stopped");
                        if report.is_failed() {
                            failed.push(report.key);
                        }
                    }

                    Some(Err(join_error)) => {
                        error!(error:% = join_error; "pair worker panicked");
                        bail!("pair worker panicked: {join_error}");
                    }

                    None => bail!("all pair workers stopped"),
                }
            }

            _ = &mut shutdown => {
                warn!("shutdown signal received");
                break;
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        bail!("pairs exhausted their retries: {}", failed.iter().join(", "))
    }
}

/// Scan every pair up to the safe chain head exactly once and report per-pair results, sorted
/// by chain and protocol. Pair failures are isolated; one pair failing never aborts another.
pub async fn scan_all_once<R, S>(
    retry: RetryConfig,
    scanners: Vec<ChainScanner<R, S>>,
) -> Vec<PairReport>
where
    R: Rpc,
    S: Storage,
{
    let mut tasks = JoinSet::new();
    for scanner in scanners {
        tasks.spawn(scan_to_head(scanner, retry.clone()));
    }

    let mut reports = tasks.join_all().await;
    reports.sort_by_key(|report| (report.key.chain_id.0, report.key.protocol.as_str()));

    for report in &reports {
        match &report.outcome {
            PairOutcome::CaughtUp => info!(
                pair:% = report.key,
                windows = report.windows,
                events_found = report.stats.events_found,
                events_skipped = report.stats.events_skipped,
                events_duplicate = report.stats.events_duplicate,
                errors = report.stats.errors;
                "pair caught up"
            ),

            PairOutcome::Failed(error) => error!(
                pair:% = report.key,
                windows = report.windows,
                error:% = error;
                "pair failed"
            ),
        }
    }

    reports
}

async fn run_pair<R, S>(mut scanner: ChainScanner<R, S>, config: Config) -> PairReport
where
    R: Rpc,
    S: Storage,
{
    let key = scanner.key();
    let metrics = Metrics::new(&key);
    let mut stats = ScanStats::default();
    let mut windows = 0;

    loop {
        match scan_with_retry(&mut scanner, &config.retry, &metrics).await {
            Ok(ScanOutcome::Scanned(window_stats)) => {
                stats.merge(&window_stats);
                windows += 1;
                metrics.window_scanned(&window_stats, scanner.window_size());
            }

            // Caught up; wait for new blocks.
            Ok(ScanOutcome::NoOp { .. }) => sleep(config.scan_interval).await,

            Err(error) => {
                return PairReport {
                    key,
                    stats,
                    windows,
                    outcome: PairOutcome::Failed(error_chain(&error)),
                };
            }
        }
    }
}

async fn scan_to_head<R, S>(mut scanner: ChainScanner<R, S>, retry: RetryConfig) -> PairReport
where
    R: Rpc,
    S: Storage,
{
    let key = scanner.key();
    let metrics = Metrics::new(&key);
    let mut stats = ScanStats::default();
    let mut windows = 0;

    loop {
        match scan_with_retry(&mut scanner, &retry, &metrics).await {
            Ok(ScanOutcome::Scanned(window_stats)) => {
                stats.merge(&window_stats);
                windows += 1;
                metrics.window_scanned(&window_stats, scanner.window_size());
            }

            Ok(ScanOutcome::NoOp { .. }) => {
                return PairReport {
                    key,
                    stats,
                    windows,
                    outcome: PairOutcome::CaughtUp,
                };
            }

            Err(error) => {
                return PairReport {
                    key,
                    stats,
                    windows,
                    outcome: PairOutcome::Failed(error_chain(&error)),
                };
            }
        }
    }
}

async fn scan_with_retry<R, S>(
    scanner: &mut ChainScanner<R, S>,
    retry: &RetryConfig,
    metrics: &Metrics,
) -> Result<ScanOutcome, ScanError>
where
    R: Rpc,
    S: Storage,
{
    let mut attempt = 1;

    loop {
        let scan = scanner
            .scan_once()
            .in_span(Span::root("scan-window", SpanContext::random()));

        match scan.await {
            Ok(outcome) => return Ok(outcome),

            Err(error) => {
                metrics.scan_failed();
                if attempt >= retry.max_attempts {
                    return Err(error);
                }

                let delay = backoff_delay(retry, attempt);
                warn!(
                    pair:% = scanner.key(),
                    attempt,
                    delay:? = delay,
                    error:% = error_chain(&error);
                    "scan failed, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff capped at `max_delay`, with up to 50% jitter so concurrently failing
/// pairs do not retry in lockstep.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    let capped = retry.base_delay.saturating_mul(factor).min(retry.max_delay);
    let jitter = rand::rng().random_range(0..=capped.as_millis() as u64 / 2);

    capped + Duration::from_millis(jitter)
}

fn error_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();

    let mut source = error.source();
    while let Some(error) = source {
        rendered.push_str(": ");
        rendered.push_str(&error.to_string());
        source = error.source();
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        decoder::tests::{AFFILIATE, settlement_log},
        scanner::tests::{MockRpc, scanner},
        storage::tests::MemoryStorage,
    };
    use ledger_common::domain::{ChainId, Protocol};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    /// One healthy pair and one permanently rate-limited pair: the healthy pair catches up and
    /// stores its event, the failing pair reports its failure without affecting the other.
    #[tokio::test]
    async fn pair_failures_are_isolated() {
        let storage = MemoryStorage::default();

        let healthy = scanner(
            MockRpc::new(132, vec![settlement_log(AFFILIATE, 55)]),
            storage.clone(),
            99,
        );
        let failing_rpc = MockRpc::new(132, vec![]);
        failing_rpc.rate_limit_next(u32::MAX);
        let failing = scanner(failing_rpc, MemoryStorage::default(), 99);

        let reports = scan_all_once(fast_retry(2), vec![healthy, failing]).await;

        assert_eq!(reports.len(), 2);
        let caught_up = reports.iter().filter(|r| !r.is_failed()).count();
        let failed = reports.iter().filter(|r| r.is_failed()).count();
        assert_eq!(caught_up, 1);
        assert_eq!(failed, 1);

        let healthy_report = reports.iter().find(|r| !r.is_failed()).unwrap();
        assert_eq!(healthy_report.stats.events_found, 1);
    }

    /// A transient rate limit is absorbed by the retry loop and the pair still catches up.
    #[tokio::test]
    async fn transient_failures_are_retried() {
        let rpc = MockRpc::new(132, vec![settlement_log(AFFILIATE, 55)]);
        rpc.rate_limit_next(2);
        let storage = MemoryStorage::default();
        let scanner = scanner(rpc, storage.clone(), 99);

        let reports = scan_all_once(fast_retry(5), vec![scanner]).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, PairOutcome::CaughtUp);
        assert_eq!(reports[0].stats.events_found, 1);

        let cursor = storage
            .get_cursor(ChainId(1), Protocol::SettlementSwap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_processed_block, 120);
    }

    /// Continuous runs exit cleanly on shutdown only while every pair is healthy; a pair that
    /// exhausted its retries turns the shutdown into a failure.
    #[tokio::test]
    async fn failed_pairs_fail_the_run_on_shutdown() {
        let config = Config {
            scan_interval: Duration::from_millis(1),
            retry: fast_retry(2),
        };

        let healthy = scanner(
            MockRpc::new(132, vec![settlement_log(AFFILIATE, 55)]),
            MemoryStorage::default(),
            99,
        );
        let failing_rpc = MockRpc::new(132, vec![]);
        failing_rpc.rate_limit_next(u32::MAX);
        let failing = scanner(failing_rpc, MemoryStorage::default(), 99);

        let shutdown = sleep(Duration::from_millis(200));
        let result = run(config.clone(), vec![healthy, failing], shutdown).await;
        assert!(result.is_err());

        let healthy = scanner(
            MockRpc::new(132, vec![settlement_log(AFFILIATE, 55)]),
            MemoryStorage::default(),
            99,
        );
        let shutdown = sleep(Duration::from_millis(50));
        let result = run(config, vec![healthy], shutdown).await;
        assert!(result.is_ok());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };

        let first = backoff_delay(&retry, 1);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(150));

        // 100ms * 2^9 far exceeds the cap; jitter stays within 50% of it.
        let late = backoff_delay(&retry, 10);
        assert!(late >= Duration::from_secs(2));
        assert!(late <= Duration::from_secs(3));
    }
}
