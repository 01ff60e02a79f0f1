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

use serde::Deserialize;
use thiserror::Error;

/// One entry of the expected-fee-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateTier {
    /// Unix seconds from which this rate applies.
    pub effective_from: u64,
    pub expected_bps: u32,
}

/// Append-only, ordered sequence of expected fee rates. Models known historical rate changes
/// without code changes per change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<RateTier>")]
pub struct FeeRateSchedule(Vec<RateTier>);

impl FeeRateSchedule {
    /// Create a schedule from tiers which must be non-empty and strictly ordered by
    /// `effective_from`.
    pub fn new(tiers: Vec<RateTier>) -> Result<Self, InvalidScheduleError> {
        if tiers.is_empty() {
            return Err(InvalidScheduleError::Empty);
        }

        let ordered = tiers
            .windows(2)
            .all(|pair| pair[0].effective_from < pair[1].effective_from);
        if !ordered {
            return Err(InvalidScheduleError::Unordered);
        }

        Ok(Self(tiers))
    }

    /// The expected rate at the given time: the tier with the latest `effective_from` that is
    /// less than or equal to `timestamp`, or `None` before the first tier.
    pub fn expected_bps_at(&self, timestamp: u64) -> Option<u32> {
        self.0
            .iter()
            .take_while(|tier| tier.effective_from <= timestamp)
            .last()
            .map(|tier| tier.expected_bps)
    }

    pub fn tiers(&self) -> &[RateTier] {
        &self.0
    }
}

impl TryFrom<Vec<RateTier>> for FeeRateSchedule {
    type Error = InvalidScheduleError;

    fn try_from(tiers: Vec<RateTier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

#[derive(Debug, Error)]
pub enum InvalidScheduleError {
    #[error("fee rate schedule must not be empty")]
    Empty,

    #[error("fee rate schedule entries must be strictly ordered by effective_from")]
    Unordered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // 2024-01-01T00:00:00Z and 2024-06-01T00:00:00Z.
    const JAN_2024: u64 = 1_704_067_200;
    const JUN_2024: u64 = 1_717_200_000;

    fn schedule() -> FeeRateSchedule {
        FeeRateSchedule::new(vec![
            RateTier {
                effective_from: JAN_2024,
                expected_bps: 50,
            },
            RateTier {
                effective_from: JUN_2024,
                expected_bps: 55,
            },
        ])
        .unwrap()
    }

    #[test]
    fn tier_selection() {
        let schedule = schedule();

        // 2024-05-15 resolves to the January tier.
        assert_eq!(schedule.expected_bps_at(1_715_731_200), Some(50));
        // 2024-06-02 resolves to the June tier.
        assert_eq!(schedule.expected_bps_at(1_717_286_400), Some(55));
        // Exactly at the boundary the new tier applies.
        assert_eq!(schedule.expected_bps_at(JUN_2024), Some(55));
        // Before the first tier there is no expectation.
        assert_eq!(schedule.expected_bps_at(JAN_2024 - 1), None);
    }

    #[test]
    fn invalid_schedules() {
        assert_matches!(
            FeeRateSchedule::new(vec![]),
            Err(InvalidScheduleError::Empty)
        );

        let unordered = vec![
            RateTier {
                effective_from: JUN_2024,
                expected_bps: 55,
            },
            RateTier {
                effective_from: JAN_2024,
                expected_bps: 50,
            },
        ];
        assert_matches!(
            FeeRateSchedule::new(unordered),
            Err(InvalidScheduleError::Unordered)
        );
    }
}
