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

use derive_more::Deref;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// Configuration for the Sqlite connection pool.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Sqlx connection URL, e.g. `sqlite://fee_ledger.db`.
    pub url: String,

    #[serde(default = "max_connections_default")]
    pub max_connections: u32,
}

fn max_connections_default() -> u32 {
    5
}

/// Sqlite based connection pool.
#[derive(Debug, Clone, Deref)]
pub struct SqlitePool(sqlx::SqlitePool);

impl SqlitePool {
    /// Create a new pool with the given [Config], creating the database file if missing.
    pub async fn new(config: Config) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self(pool))
    }

    /// Create a new in-memory pool, mainly for testing. A single connection is used, because
    /// each in-memory connection gets its own database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self(pool))
    }
}
