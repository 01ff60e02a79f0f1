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

use crate::domain::storage::{EventFilter, InsertOutcome, Storage};
use alloy_primitives::{Address, B256, U256};
use fastrace::trace;
use indoc::indoc;
use ledger_common::{
    domain::{ChainId, FeeEvent, Protocol, ScanCursor},
    infra::pool::sqlite::SqlitePool,
};
use sqlx::{QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sqlite based implementation of [Storage].
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new [SqliteStorage].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet. The natural key of fee events is the table's
    /// primary key; deduplication is a constraint, not application logic.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            CREATE TABLE IF NOT EXISTS fee_events (
                chain_id                INTEGER NOT NULL,
                protocol                TEXT    NOT NULL,
                block_number            INTEGER NOT NULL,
                tx_hash                 TEXT    NOT NULL,
                log_index               INTEGER NOT NULL,
                affiliate_address       TEXT    NOT NULL,
                fee_token               TEXT    NOT NULL,
                fee_amount              TEXT    NOT NULL,
                input_token             TEXT,
                input_amount            TEXT,
                output_token            TEXT,
                output_amount           TEXT,
                input_value_usd         TEXT,
                expected_fee_bps        INTEGER,
                actual_fee_bps          INTEGER,
                timestamp               INTEGER NOT NULL,
                flags                   TEXT    NOT NULL,
                created_at              INTEGER NOT NULL,
                PRIMARY KEY (chain_id, tx_hash, log_index)
            );

            CREATE INDEX IF NOT EXISTS fee_events_pair_block
            ON fee_events (chain_id, protocol, block_number);

            CREATE TABLE IF NOT EXISTS scan_cursors (
                chain_id                INTEGER NOT NULL,
                protocol                TEXT    NOT NULL,
                last_processed_block    INTEGER NOT NULL,
                last_processed_at       INTEGER,
                consecutive_error_count INTEGER NOT NULL DEFAULT 0,
                last_error              TEXT,
                PRIMARY KEY (chain_id, protocol)
            );
        "};

        sqlx::raw_sql(query).execute(&*self.pool).await?;

        Ok(())
    }
}

impl Storage for SqliteStorage {
    #[trace]
    async fn get_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
    ) -> Result<Option<ScanCursor>, sqlx::Error> {
        let query = indoc! {"
            SELECT last_processed_block, last_processed_at, consecutive_error_count, last_error
            FROM scan_cursors
            WHERE chain_id = $1 AND protocol = $2
        "};

        sqlx::query(query)
            .bind(chain_id.0 as i64)
            .bind(protocol)
            .fetch_optional(&*self.pool)
            .await?
            .map(|row: SqliteRow| {
                Ok(ScanCursor {
                    last_processed_block: row.try_get::<i64, _>("last_processed_block")? as u64,
                    last_processed_at: row
                        .try_get::<Option<i64>, _>("last_processed_at")?
                        .map(|at| at as u64),
                    consecutive_error_count: row.try_get::<i64, _>("consecutive_error_count")?
                        as u32,
                    last_error: row.try_get("last_error")?,
                })
            })
            .transpose()
    }

    #[trace]
    async fn advance_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        new_block: u64,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO scan_cursors (
                chain_id, protocol, last_processed_block, last_processed_at,
                consecutive_error_count, last_error
            )
            VALUES ($1, $2, $3, $4, 0, NULL)
            ON CONFLICT (chain_id, protocol) DO UPDATE SET
                last_processed_block = excluded.last_processed_block,
                last_processed_at = excluded.last_processed_at,
                consecutive_error_count = 0,
                last_error = NULL
            WHERE excluded.last_processed_block >= scan_cursors.last_processed_block
        "};

        sqlx::query(query)
            .bind(chain_id.0 as i64)
            .bind(protocol)
            .bind(new_block as i64)
            .bind(unix_now() as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn record_error(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        last_processed_block: u64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO scan_cursors (
                chain_id, protocol, last_processed_block, last_processed_at,
                consecutive_error_count, last_error
            )
            VALUES ($1, $2, $3, NULL, 1, $4)
            ON CONFLICT (chain_id, protocol) DO UPDATE SET
                consecutive_error_count = scan_cursors.consecutive_error_count + 1,
                last_error = excluded.last_error
        "};

        sqlx::query(query)
            .bind(chain_id.0 as i64)
            .bind(protocol)
            .bind(last_processed_block as i64)
            .bind(error)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn reset_cursor(
        &self,
        chain_id: ChainId,
        protocol: Protocol,
        block: u64,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO scan_cursors (
                chain_id, protocol, last_processed_block, last_processed_at,
                consecutive_error_count, last_error
            )
            VALUES ($1, $2, $3, NULL, 0, NULL)
            ON CONFLICT (chain_id, protocol) DO UPDATE SET
                last_processed_block = excluded.last_processed_block,
                last_processed_at = NULL,
                consecutive_error_count = 0,
                last_error = NULL
        "};

        sqlx::query(query)
            .bind(chain_id.0 as i64)
            .bind(protocol)
            .bind(block as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn insert_event(&self, event: &FeeEvent) -> Result<InsertOutcome, sqlx::Error> {
        let query = indoc! {"
            INSERT INTO fee_events (
                chain_id, protocol, block_number, tx_hash, log_index,
                affiliate_address, fee_token, fee_amount,
                input_token, input_amount, output_token, output_amount,
                input_value_usd, expected_fee_bps, actual_fee_bps,
                timestamp, flags, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING
        "};

        let result = sqlx::query(query)
            .bind(event.chain_id.0 as i64)
            .bind(event.protocol)
            .bind(event.block_number as i64)
            .bind(event.tx_hash.to_string())
            .bind(event.log_index as i64)
            .bind(event.affiliate_address.to_string())
            .bind(event.fee_token.to_string())
            .bind(event.fee_amount.to_string())
            .bind(event.input_token.map(|token| token.to_string()))
            .bind(event.input_amount.map(|amount| amount.to_string()))
            .bind(event.output_token.map(|token| token.to_string()))
            .bind(event.output_amount.map(|amount| amount.to_string()))
            .bind(event.input_value_usd.map(|value| value.to_string()))
            .bind(event.expected_fee_bps.map(|bps| bps as i64))
            .bind(event.actual_fee_bps.map(|bps| bps as i64))
            .bind(event.timestamp as i64)
            .bind(event.flags.to_string())
            .bind(unix_now() as i64)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    #[trace]
    async fn events(&self, filter: &EventFilter) -> Result<Vec<FeeEvent>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(indoc! {"
            SELECT
                chain_id, protocol, block_number, tx_hash, log_index,
                affiliate_address, fee_token, fee_amount,
                input_token, input_amount, output_token, output_amount,
                input_value_usd, expected_fee_bps, actual_fee_bps,
                timestamp, flags
            FROM fee_events
            WHERE 1 = 1
        "});

        if let Some(chain_id) = filter.chain_id {
            query.push(" AND chain_id = ").push_bind(chain_id.0 as i64);
        }
        if let Some(protocol) = filter.protocol {
            query.push(" AND protocol = ").push_bind(protocol);
        }
        if let Some(from_block) = filter.from_block {
            query.push(" AND block_number >= ").push_bind(from_block as i64);
        }
        if let Some(to_block) = filter.to_block {
            query.push(" AND block_number <= ").push_bind(to_block as i64);
        }
        if let Some(from_timestamp) = filter.from_timestamp {
            query.push(" AND timestamp >= ").push_bind(from_timestamp as i64);
        }
        if let Some(to_timestamp) = filter.to_timestamp {
            query.push(" AND timestamp <= ").push_bind(to_timestamp as i64);
        }

        query.push(" ORDER BY chain_id, block_number, log_index");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        query
            .build()
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(event_from_row)
            .collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<FeeEvent, sqlx::Error> {
    Ok(FeeEvent {
        chain_id: ChainId(row.try_get::<i64, _>("chain_id")? as u64),
        protocol: row.try_get("protocol")?,
        block_number: row.try_get::<i64, _>("block_number")? as u64,
        tx_hash: b256_from_text(row.try_get("tx_hash")?)?,
        log_index: row.try_get::<i64, _>("log_index")? as u64,
        affiliate_address: address_from_text(row.try_get("affiliate_address")?)?,
        fee_token: address_from_text(row.try_get("fee_token")?)?,
        fee_amount: u256_from_text(row.try_get("fee_amount")?)?,
        input_token: row
            .try_get::<Option<String>, _>("input_token")?
            .map(address_from_text)
            .transpose()?,
        input_amount: row
            .try_get::<Option<String>, _>("input_amount")?
            .map(u256_from_text)
            .transpose()?,
        output_token: row
            .try_get::<Option<String>, _>("output_token")?
            .map(address_from_text)
            .transpose()?,
        output_amount: row
            .try_get::<Option<String>, _>("output_amount")?
            .map(u256_from_text)
            .transpose()?,
        input_value_usd: row
            .try_get::<Option<String>, _>("input_value_usd")?
            .map(u256_from_text)
            .transpose()?,
        expected_fee_bps: row
            .try_get::<Option<i64>, _>("expected_fee_bps")?
            .map(|bps| bps as u32),
        actual_fee_bps: row
            .try_get::<Option<i64>, _>("actual_fee_bps")?
            .map(|bps| bps as u32),
        timestamp: row.try_get::<i64, _>("timestamp")? as u64,
        flags: row
            .try_get::<String, _>("flags")?
            .parse()
            .map_err(|error| sqlx::Error::Decode(Box::new(error)))?,
    })
}

fn b256_from_text(text: String) -> Result<B256, sqlx::Error> {
    text.parse::<B256>()
        .map_err(|error| sqlx::Error::Decode(Box::new(error)))
}

fn address_from_text(text: String) -> Result<Address, sqlx::Error> {
    text.parse::<Address>()
        .map_err(|error| sqlx::Error::Decode(Box::new(error)))
}

fn u256_from_text(text: String) -> Result<U256, sqlx::Error> {
    text.parse::<U256>()
        .map_err(|error| sqlx::Error::Decode(Box::new(error)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
