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

use alloy_primitives::{Address, U256};

/// Injected USD price source. The engine never computes pricing itself; it only attaches the
/// oracle's USD-equivalent of the input leg so the classifier can validate the fee rate.
pub trait PriceOracle
where
    Self: Send + Sync + 'static,
{
    /// USD-equivalent of the given token amount in raw oracle units, or `None` for an unpriced
    /// token.
    fn usd_value(&self, token: Address, amount: U256) -> Option<U256>;
}
