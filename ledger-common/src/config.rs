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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;
use std::env;

const CONFIG_FILE_ENV_VAR: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";
const ENV_SEPARATOR: &str = "__";

/// Extension methods for configuration structs, layering an optional YAML file under
/// `APP__`-prefixed environment variables.
pub trait ConfigExt
where
    Self: DeserializeOwned,
{
    /// Load this configuration from the file given via the `CONFIG_FILE` environment variable
    /// (default `config.yaml`), then override with environment variables.
    fn load() -> Result<Self, figment::Error> {
        let config_file =
            env::var(CONFIG_FILE_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
    }
}

impl<T> ConfigExt for T where T: DeserializeOwned {}
