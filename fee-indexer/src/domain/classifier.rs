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

use alloy_primitives::U256;
use ledger_common::domain::{FeeEvent, FeeRateSchedule};

/// Enrich the given event with the expected fee rate and validation flags.
///
/// Pure and infallible: when inputs needed for validation are unknown, the event degrades to
/// partial validation with `missing_fields` set instead of failing the record.
pub fn classify(mut event: FeeEvent, schedule: &FeeRateSchedule, tolerance_bps: u32) -> FeeEvent {
    event.expected_fee_bps = schedule.expected_bps_at(event.timestamp);

    event.actual_fee_bps = match event.input_value_usd {
        Some(value) if !value.is_zero() => Some(fee_bps(event.fee_amount, value)),
        _ => None,
    };

    if event.fee_amount.is_zero() || event.actual_fee_bps == Some(0) {
        event.flags.zero_fee = true;

        // A zero fee against a tier that expects one is a mismatch even without USD volume.
        if event.expected_fee_bps.is_some_and(|expected| expected > 0) {
            event.flags.rate_mismatch = true;
        }
    }

    match (event.actual_fee_bps, event.expected_fee_bps) {
        (Some(actual), Some(expected)) => {
            if actual.abs_diff(expected) > tolerance_bps {
                event.flags.rate_mismatch = true;
            }
        }

        _ => event.flags.missing_fields = true,
    }

    event
}

/// The fee rate in basis points, rounded half-up, kept in 256-bit integers throughout.
fn fee_bps(fee_amount: U256, volume: U256) -> u32 {
    let scaled = fee_amount
        .checked_mul(U256::from(10_000u64))
        .and_then(|scaled| scaled.checked_add(volume / U256::from(2u64)));

    match scaled {
        // A rate beyond u32 means fee >> volume; saturate, the mismatch flag will fire anyway.
        Some(scaled) => u32::try_from(scaled / volume).unwrap_or(u32::MAX),
        None => u32::MAX,
    }
}
