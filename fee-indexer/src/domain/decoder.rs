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

//! Protocol-specific decoding of raw logs into normalized [FeeEvent]s.
//!
//! Each protocol family has its own event encoding; decoding is a tagged dispatch over
//! [Protocol], so new protocols are added here without touching the scanner. A log that matches
//! the event signature but does not involve the tracked affiliate yields [Decoded::Skip], which
//! is the expected, common case. Only malformed payloads yield a [DecodeError].

use crate::domain::rpc::RawLog;
use alloy_primitives::{Address, B256, U256, b256};
use ledger_common::domain::{ChainId, FeeEvent, Protocol, ValidationFlags};
use std::collections::HashSet;
use thiserror::Error;

/// `Transfer(address indexed from, address indexed to, uint256 value)`, the canonical ERC-20
/// transfer event.
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// `AffiliateFeePaid(address indexed recipient, address feeToken, uint256 feeAmount,
/// address inputToken, uint256 inputAmount, address outputToken, uint256 outputAmount)`
/// emitted by settlement contracts, one per trade.
pub const SETTLEMENT_FEE_TOPIC: B256 =
    b256!("5c2de13e839ab36d9a5e66f2e6d3c29df51b2c1a0cc9a4f6778a1c5a80f1d0b7");

/// `TransformedSwap(address indexed initiator, address inputToken, uint256 inputAmount,
/// address outputToken, uint256 quotedOutput, uint256 actualOutput)` emitted by aggregator
/// routers; the affiliate fee is implicit in the quoted/actual difference and materializes as a
/// token transfer to the affiliate within the same transaction.
pub const AGGREGATOR_SWAP_TOPIC: B256 =
    b256!("2d9c1b0e5a6f3d84c7b1a2e9f0d4c6b8a3e5f7d9c1b0a2e4f6d8c0b2a4e6f8d0");

/// `BridgeRouted(bytes32 indexed routeId, address inputToken, uint256 inputAmount)` emitted by
/// bridge routers; no dedicated fee field exists, so the fee is inferred via the
/// treasury-receipt heuristic over same-transaction transfers.
pub const BRIDGE_ROUTED_TOPIC: B256 =
    b256!("7f4a2b8c1d5e9f03a6b4c8d2e7f1a5b9c3d7e1f5a9b3c7d1e5f9a3b7c1d5e9f0");

/// `OrderFilled(bytes32 indexed orderHash, address feeToken, uint256 feeAmount,
/// address inputToken, uint256 inputAmount, bytes memo)`; the revenue-sharing partner is
/// identified by a partner-ID string in the memo, not by an address.
pub const ORDER_FILL_TOPIC: B256 =
    b256!("9b6e0d3f5c8a1e4b7d0f3a6c9e2b5d8f1a4c7e0b3d6f9a2c5e8b1d4f7a0c3e6b");

/// `CrossChainSwapped(bytes32 indexed swapId, address feeToken, uint256 feeAmount,
/// address inputToken, uint256 inputAmount, bytes memo)`; partner attribution as for order
/// fills.
pub const CROSS_CHAIN_SWAP_TOPIC: B256 =
    b256!("4e1a7c0d3b6f9a2e5c8b1d4f7a0c3e6b9d2f5a8c1e4b7d0a3c6e9f2b5d8a1c4e");

/// The first topic identifying the given protocol's fee-bearing event.
pub fn protocol_topic(protocol: Protocol) -> B256 {
    match protocol {
        Protocol::SettlementSwap => SETTLEMENT_FEE_TOPIC,
        Protocol::AggregatorTransform => AGGREGATOR_SWAP_TOPIC,
        Protocol::BridgeRouter => BRIDGE_ROUTED_TOPIC,
        Protocol::OrderFill => ORDER_FILL_TOPIC,
        Protocol::CrossChainSwap => CROSS_CHAIN_SWAP_TOPIC,
    }
}

/// What the scanner is tracking on one (chain, protocol) pair.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub chain_id: ChainId,
    /// The fee recipient whose revenue share is recorded.
    pub affiliate: Address,
    /// Treasury address for the bridge receipt heuristic.
    pub treasury: Option<Address>,
    /// Known partner-ID strings for memo-based attribution.
    pub partner_ids: HashSet<String>,
    /// Upper bound for the treasury-receipt heuristic, as a fraction of transaction volume in
    /// basis points.
    pub treasury_max_fraction_bps: u32,
}

/// Outcome of decoding a candidate log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(FeeEvent),
    Skip(SkipReason),
}

/// Why a well-formed log was not turned into a [FeeEvent]. Skips are not errors and must not be
/// logged as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The log's first topic is not the protocol's fee event signature.
    ForeignTopic,
    /// The fee recipient is not the tracked affiliate.
    UntrackedRecipient,
    /// No same-transaction transfer to the affiliate to infer the implicit fee from.
    NoAffiliateTransfer,
    /// No plausible same-transaction transfer to the treasury.
    NoTreasuryReceipt,
    /// The memo's partner ID is not in the tracked partner set.
    UnknownPartner,
}

/// A true decode failure: the log matched the signature but its payload cannot be decoded.
/// Logged and counted by the scanner, never fatal to the remaining logs of a window.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected at least {expected} topics, got {actual}")]
    MissingTopics { expected: usize, actual: usize },

    #[error("truncated event data: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid partner memo: {0}")]
    InvalidMemo(String),
}

/// Decode one candidate log. `tx_logs` are all logs of the same transaction, needed for
/// transfer correlation by the aggregator and bridge families.
pub fn decode(
    protocol: Protocol,
    log: &RawLog,
    tx_logs: &[RawLog],
    ctx: &DecodeContext,
) -> Result<Decoded, DecodeError> {
    if log.topic0() != Some(protocol_topic(protocol)) {
        return Ok(Decoded::Skip(SkipReason::ForeignTopic));
    }

    match protocol {
        Protocol::SettlementSwap => decode_settlement_swap(log, ctx),
        Protocol::AggregatorTransform => decode_aggregator_transform(log, tx_logs, ctx),
        Protocol::BridgeRouter => decode_bridge_router(log, tx_logs, ctx),
        Protocol::OrderFill | Protocol::CrossChainSwap => decode_memo_attributed(protocol, log, ctx),
    }
}

/// Settlement contracts carry a dedicated fee-recipient field; one event per trade.
fn decode_settlement_swap(log: &RawLog, ctx: &DecodeContext) -> Result<Decoded, DecodeError> {
    let Some(recipient) = log.topic_address(1) else {
        return Err(DecodeError::MissingTopics {
            expected: 2,
            actual: log.topics.len(),
        });
    };
    if recipient != ctx.affiliate {
        return Ok(Decoded::Skip(SkipReason::UntrackedRecipient));
    }

    let fee_token = word_address(log, 0)?;
    let fee_amount = word_u256(log, 1)?;
    let input_token = word_address(log, 2)?;
    let input_amount = word_u256(log, 3)?;
    let output_token = word_address(log, 4)?;
    let output_amount = word_u256(log, 5)?;

    Ok(Decoded::Event(FeeEvent {
        affiliate_address: recipient,
        fee_token,
        fee_amount,
        input_token: Some(input_token),
        input_amount: Some(input_amount),
        output_token: Some(output_token),
        output_amount: Some(output_amount),
        ..base_event(Protocol::SettlementSwap, log, ctx)
    }))
}

/// Aggregator fees are implicit: the swap event carries quoted and actual output amounts, and
/// the fee materializes as a token transfer to the affiliate within the same transaction.
fn decode_aggregator_transform(
    log: &RawLog,
    tx_logs: &[RawLog],
    ctx: &DecodeContext,
) -> Result<Decoded, DecodeError> {
    let input_token = word_address(log, 0)?;
    let input_amount = word_u256(log, 1)?;
    let output_token = word_address(log, 2)?;
    let _quoted_output = word_u256(log, 3)?;
    let actual_output = word_u256(log, 4)?;

    let Some(transfer) = transfers(tx_logs).find(|transfer| transfer.to == ctx.affiliate) else {
        return Ok(Decoded::Skip(SkipReason::NoAffiliateTransfer));
    };

    Ok(Decoded::Event(FeeEvent {
        fee_token: transfer.token,
        fee_amount: transfer.value,
        input_token: Some(input_token),
        input_amount: Some(input_amount),
        output_token: Some(output_token),
        output_amount: Some(actual_output),
        ..base_event(Protocol::AggregatorTransform, log, ctx)
    }))
}

/// Bridge routers have no fee field. Fall back to the treasury-receipt heuristic: the largest
/// same-transaction transfer to the tracked treasury whose value is a plausible fraction of the
/// routed volume. The result is approximate and flagged `heuristic_fee`.
fn decode_bridge_router(
    log: &RawLog,
    tx_logs: &[RawLog],
    ctx: &DecodeContext,
) -> Result<Decoded, DecodeError> {
    let input_token = word_address(log, 0)?;
    let input_amount = word_u256(log, 1)?;

    let Some(treasury) = ctx.treasury else {
        return Ok(Decoded::Skip(SkipReason::NoTreasuryReceipt));
    };

    let max_fraction = U256::from(ctx.treasury_max_fraction_bps);
    let receipt = transfers(tx_logs)
        .filter(|transfer| transfer.to == treasury)
        .filter(|transfer| {
            // value / volume <= max_fraction / 10_000, kept in integers; a value or volume
            // large enough to overflow the comparison never qualifies.
            transfer
                .value
                .checked_mul(U256::from(10_000u64))
                .zip(input_amount.checked_mul(max_fraction))
                .is_some_and(|(scaled_value, bound)| scaled_value <= bound)
        })
        .max_by_key(|transfer| transfer.value);
    let Some(receipt) = receipt else {
        return Ok(Decoded::Skip(SkipReason::NoTreasuryReceipt));
    };

    Ok(Decoded::Event(FeeEvent {
        affiliate_address: treasury,
        fee_token: receipt.token,
        fee_amount: receipt.value,
        input_token: Some(input_token),
        input_amount: Some(input_amount),
        flags: ValidationFlags {
            heuristic_fee: true,
            ..Default::default()
        },
        ..base_event(Protocol::BridgeRouter, log, ctx)
    }))
}

/// Order fills and cross-chain swaps attribute the partner via an ID string embedded in the
/// memo tail of the event data rather than an address.
fn decode_memo_attributed(
    protocol: Protocol,
    log: &RawLog,
    ctx: &DecodeContext,
) -> Result<Decoded, DecodeError> {
    let fee_token = word_address(log, 0)?;
    let fee_amount = word_u256(log, 1)?;
    let input_token = word_address(log, 2)?;
    let input_amount = word_u256(log, 3)?;

    let memo = &log.data[4 * 32..];
    let memo = memo
        .iter()
        .position(|byte| *byte == 0)
        .map(|end| &memo[..end])
        .unwrap_or(memo);
    let partner_id = std::str::from_utf8(memo)
        .map_err(|error| DecodeError::InvalidMemo(error.to_string()))?
        .trim();

    if !ctx.partner_ids.contains(partner_id) {
        return Ok(Decoded::Skip(SkipReason::UnknownPartner));
    }

    Ok(Decoded::Event(FeeEvent {
        fee_token,
        fee_amount,
        input_token: Some(input_token),
        input_amount: Some(input_amount),
        ..base_event(protocol, log, ctx)
    }))
}

/// Event scaffold with identity and position fields; swap legs default to unknown, bps fields
/// are left to the classifier.
fn base_event(protocol: Protocol, log: &RawLog, ctx: &DecodeContext) -> FeeEvent {
    FeeEvent {
        chain_id: ctx.chain_id,
        protocol,
        block_number: log.block_number,
        tx_hash: log.tx_hash,
        log_index: log.log_index,
        affiliate_address: ctx.affiliate,
        fee_token: Address::ZERO,
        fee_amount: U256::ZERO,
        input_token: None,
        input_amount: None,
        output_token: None,
        output_amount: None,
        input_value_usd: None,
        expected_fee_bps: None,
        actual_fee_bps: None,
        timestamp: log.block_timestamp,
        flags: ValidationFlags::default(),
    }
}

/// A decoded ERC-20 transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TokenTransfer {
    token: Address,
    from: Address,
    to: Address,
    value: U256,
}

/// Well-formed ERC-20 transfers among the given logs. Malformed transfer logs of other
/// contracts are silently ignored; they are correlation input, not candidates.
fn transfers(tx_logs: &[RawLog]) -> impl Iterator<Item = TokenTransfer> + '_ {
    tx_logs.iter().filter_map(|log| {
        if log.topic0() != Some(TRANSFER_TOPIC) || log.topics.len() < 3 || log.data.len() < 32 {
            return None;
        }

        Some(TokenTransfer {
            token: log.address,
            from: log.topic_address(1)?,
            to: log.topic_address(2)?,
            value: U256::from_be_slice(&log.data[..32]),
        })
    })
}

fn word(log: &RawLog, index: usize) -> Result<&[u8], DecodeError> {
    let start = index * 32;
    let end = start + 32;
    if log.data.len() < end {
        return Err(DecodeError::Truncated {
            expected: end,
            actual: log.data.len(),
        });
    }

    Ok(&log.data[start..end])
}

fn word_u256(log: &RawLog, index: usize) -> Result<U256, DecodeError> {
    word(log, index).map(U256::from_be_slice)
}

fn word_address(log: &RawLog, index: usize) -> Result<Address, DecodeError> {
    word(log, index).map(|word| Address::from_slice(&word[12..]))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use alloy_primitives::{Bytes, address, b256};
    use assert_matches::assert_matches;

    pub const AFFILIATE: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    pub const TREASURY: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
    pub const USDC: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    pub const WETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");

    pub const TX_HASH: B256 =
        b256!("1111111111111111111111111111111111111111111111111111111111111111");

    pub fn context() -> DecodeContext {
        DecodeContext {
            chain_id: ChainId(1),
            affiliate: AFFILIATE,
            treasury: Some(TREASURY),
            partner_ids: HashSet::from(["partner-7".to_string()]),
            treasury_max_fraction_bps: 100,
        }
    }

    pub fn address_word(address: Address) -> [u8; 32] {
        let mut word = [0; 32];
        word[12..].copy_from_slice(address.as_slice());
        word
    }

    pub fn u256_word(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    fn address_topic(address: Address) -> B256 {
        B256::from(address_word(address))
    }

    pub fn settlement_log(recipient: Address, fee_amount: u64) -> RawLog {
        let mut data = vec![];
        data.extend(address_word(USDC));
        data.extend(u256_word(fee_amount));
        data.extend(address_word(WETH));
        data.extend(u256_word(1_000_000));
        data.extend(address_word(USDC));
        data.extend(u256_word(995_000));

        RawLog {
            address: address!("5fbdb2315678afecb367f032d93f642f64180aa3"),
            topics: vec![SETTLEMENT_FEE_TOPIC, address_topic(recipient)],
            data: Bytes::from(data),
            block_number: 100,
            block_timestamp: 1_717_286_400,
            tx_hash: TX_HASH,
            log_index: 0,
        }
    }

    pub fn transfer_log(token: Address, to: Address, value: u64, log_index: u64) -> RawLog {
        RawLog {
            address: token,
            topics: vec![
                TRANSFER_TOPIC,
                address_topic(address!("0000000000000000000000000000000000c0ffee")),
                address_topic(to),
            ],
            data: Bytes::from(u256_word(value).to_vec()),
            block_number: 100,
            block_timestamp: 1_717_286_400,
            tx_hash: TX_HASH,
            log_index,
        }
    }

    #[test]
    fn settlement_decodes_tracked_recipient() {
        let log = settlement_log(AFFILIATE, 55);
        let decoded = decode(Protocol::SettlementSwap, &log, &[log.clone()], &context()).unwrap();

        assert_matches!(decoded, Decoded::Event(event) => {
            assert_eq!(event.fee_amount, U256::from(55u64));
            assert_eq!(event.fee_token, USDC);
            assert_eq!(event.input_amount, Some(U256::from(1_000_000u64)));
            assert_eq!(event.affiliate_address, AFFILIATE);
            assert!(event.flags.is_empty());
        });
    }

    #[test]
    fn settlement_skips_untracked_recipient() {
        let other = address!("00000000000000000000000000000000deadbeef");
        let log = settlement_log(other, 55);
        let decoded = decode(Protocol::SettlementSwap, &log, &[log.clone()], &context()).unwrap();

        assert_eq!(decoded, Decoded::Skip(SkipReason::UntrackedRecipient));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut log = settlement_log(AFFILIATE, 55);
        log.data = Bytes::from(log.data[..40].to_vec());

        let result = decode(Protocol::SettlementSwap, &log, &[log.clone()], &context());
        assert_matches!(result, Err(DecodeError::Truncated { .. }));
    }

    #[test]
    fn aggregator_correlates_affiliate_transfer() {
        let mut data = vec![];
        data.extend(address_word(WETH));
        data.extend(u256_word(2_000_000));
        data.extend(address_word(USDC));
        data.extend(u256_word(1_000_000));
        data.extend(u256_word(994_500));
        let swap = RawLog {
            address: address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512"),
            topics: vec![AGGREGATOR_SWAP_TOPIC, address_topic(AFFILIATE)],
            data: Bytes::from(data),
            block_number: 100,
            block_timestamp: 1_717_286_400,
            tx_hash: TX_HASH,
            log_index: 1,
        };
        let fee_transfer = transfer_log(USDC, AFFILIATE, 5_500, 2);
        let tx_logs = vec![swap.clone(), fee_transfer];

        let decoded = decode(Protocol::AggregatorTransform, &swap, &tx_logs, &context()).unwrap();
        assert_matches!(decoded, Decoded::Event(event) => {
            assert_eq!(event.fee_amount, U256::from(5_500u64));
            assert_eq!(event.fee_token, USDC);
            assert_eq!(event.output_amount, Some(U256::from(994_500u64)));
        });

        // Without the transfer the fee cannot be attributed: skip, not error.
        let decoded = decode(
            Protocol::AggregatorTransform,
            &swap,
            &[swap.clone()],
            &context(),
        )
        .unwrap();
        assert_eq!(decoded, Decoded::Skip(SkipReason::NoAffiliateTransfer));
    }

    #[test]
    fn bridge_treasury_heuristic_bounds_fraction() {
        let mut data = vec![];
        data.extend(address_word(USDC));
        data.extend(u256_word(1_000_000));
        let routed = RawLog {
            address: address!("9fe46736679d2d9a65f0992f2272de9f3c7fa6e0"),
            topics: vec![
                BRIDGE_ROUTED_TOPIC,
                b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            ],
            data: Bytes::from(data),
            block_number: 100,
            block_timestamp: 1_717_286_400,
            tx_hash: TX_HASH,
            log_index: 0,
        };

        // 0.5% of volume: plausible, flagged as heuristic.
        let receipt = transfer_log(USDC, TREASURY, 5_000, 1);
        let tx_logs = vec![routed.clone(), receipt];
        let decoded = decode(Protocol::BridgeRouter, &routed, &tx_logs, &context()).unwrap();
        assert_matches!(decoded, Decoded::Event(event) => {
            assert_eq!(event.fee_amount, U256::from(5_000u64));
            assert!(event.flags.heuristic_fee);
        });

        // 5% of volume: beyond the configured bound, so no receipt qualifies.
        let oversized = transfer_log(USDC, TREASURY, 50_000, 1);
        let tx_logs = vec![routed.clone(), oversized];
        let decoded = decode(Protocol::BridgeRouter, &routed, &tx_logs, &context()).unwrap();
        assert_eq!(decoded, Decoded::Skip(SkipReason::NoTreasuryReceipt));
    }

    #[test]
    fn bridge_heuristic_rejects_oversized_receipts() {
        let mut data = vec![];
        data.extend(address_word(USDC));
        data.extend(u256_word(1_000_000));
        let routed = RawLog {
            address: address!("9fe46736679d2d9a65f0992f2272de9f3c7fa6e0"),
            topics: vec![
                BRIDGE_ROUTED_TOPIC,
                b256!("2222222222222222222222222222222222222222222222222222222222222222"),
            ],
            data: Bytes::from(data),
            block_number: 100,
            block_timestamp: 1_717_286_400,
            tx_hash: TX_HASH,
            log_index: 0,
        };

        // A receipt so large that scaling it by 10_000 wraps around and lands below the
        // bound; it must still be rejected.
        let huge = U256::MAX / U256::from(10_000u64) + U256::from(1u64);
        let mut receipt = transfer_log(USDC, TREASURY, 0, 1);
        receipt.data = Bytes::from(huge.to_be_bytes::<32>().to_vec());

        let tx_logs = vec![routed.clone(), receipt];
        let decoded = decode(Protocol::BridgeRouter, &routed, &tx_logs, &context()).unwrap();
        assert_eq!(decoded, Decoded::Skip(SkipReason::NoTreasuryReceipt));
    }

    #[test]
    fn memo_partner_attribution() {
        let fill_log = |memo: &[u8]| {
            let mut data = vec![];
            data.extend(address_word(USDC));
            data.extend(u256_word(55));
            data.extend(address_word(WETH));
            data.extend(u256_word(10_000));
            data.extend(memo);
            RawLog {
                address: address!("cf7ed3acca5a467e9e704c703e8d87f634fb0fc9"),
                topics: vec![
                    ORDER_FILL_TOPIC,
                    b256!("3333333333333333333333333333333333333333333333333333333333333333"),
                ],
                data: Bytes::from(data),
                block_number: 100,
                block_timestamp: 1_717_286_400,
                tx_hash: TX_HASH,
                log_index: 0,
            }
        };

        let log = fill_log(b"partner-7\0\0\0");
        let decoded = decode(Protocol::OrderFill, &log, &[log.clone()], &context()).unwrap();
        assert_matches!(decoded, Decoded::Event(event) => {
            assert_eq!(event.fee_amount, U256::from(55u64));
        });

        let log = fill_log(b"someone-else");
        let decoded = decode(Protocol::OrderFill, &log, &[log.clone()], &context()).unwrap();
        assert_eq!(decoded, Decoded::Skip(SkipReason::UnknownPartner));

        let log = fill_log(&[0xff, 0xfe, 0xfd]);
        let result = decode(Protocol::OrderFill, &log, &[log.clone()], &context());
        assert_matches!(result, Err(DecodeError::InvalidMemo(_)));
    }
}
