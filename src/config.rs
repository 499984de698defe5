// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_URL` | Ledger RPC endpoint | Required |
//! | `REGISTRY_ADDRESS` | Deployed election registry contract address | Required |
//! | `OPERATOR_KEY` | Hex-encoded operator/funding private key (no 0x prefix) | Required |
//! | `IDENTITY_SECRET` | Service secret keying voter identity derivation | Required |
//! | `MIN_VOTER_BALANCE_WEI` | Balance below which a voter account is topped up | `10000000000000000` (0.01) |
//! | `TOP_UP_WEI` | Amount transferred per top-up | `20000000000000000` (0.02) |
//! | `CONFIRMATION_TIMEOUT_SECS` | Bounded wait for transaction inclusion | `90` |
//! | `PRIORITY_FEE_MARGIN_WEI` | Fixed margin added to the network priority fee baseline | `1500000000` (1.5 gwei) |
//! | `EXPLORER_URL` | Block explorer base URL for outcome links | Optional |

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};

use crate::error::RelayerError;

pub const RPC_URL_ENV: &str = "RPC_URL";
pub const REGISTRY_ADDRESS_ENV: &str = "REGISTRY_ADDRESS";
pub const OPERATOR_KEY_ENV: &str = "OPERATOR_KEY";
pub const IDENTITY_SECRET_ENV: &str = "IDENTITY_SECRET";
pub const MIN_VOTER_BALANCE_ENV: &str = "MIN_VOTER_BALANCE_WEI";
pub const TOP_UP_ENV: &str = "TOP_UP_WEI";
pub const CONFIRMATION_TIMEOUT_ENV: &str = "CONFIRMATION_TIMEOUT_SECS";
pub const PRIORITY_FEE_MARGIN_ENV: &str = "PRIORITY_FEE_MARGIN_WEI";
pub const EXPLORER_URL_ENV: &str = "EXPLORER_URL";

/// 0.01 native units: voters below this are topped up before voting.
pub const DEFAULT_MIN_VOTER_BALANCE_WEI: u128 = 10_000_000_000_000_000;
/// 0.02 native units per top-up transfer.
pub const DEFAULT_TOP_UP_WEI: u128 = 20_000_000_000_000_000;
/// Bounded inclusion wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 90;
/// 1.5 gwei above the network priority-fee baseline.
pub const DEFAULT_PRIORITY_FEE_MARGIN_WEI: u128 = 1_500_000_000;

/// Relayer runtime configuration.
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// Ledger RPC endpoint.
    pub rpc_url: String,
    /// Deployed election registry contract.
    pub registry_address: Address,
    /// Operator/funding account private key, hex without 0x prefix. The
    /// single hot key assumed by the design; never logged.
    pub operator_key_hex: String,
    /// Service secret keying voter identity derivation.
    pub identity_secret: String,
    /// Voter balance threshold triggering a top-up.
    pub min_voter_balance: U256,
    /// Top-up transfer amount.
    pub top_up_amount: U256,
    /// Bounded wait for inclusion before `ConfirmationTimeout`.
    pub confirmation_timeout: Duration,
    /// Fixed margin added to the network priority-fee baseline.
    pub priority_fee_margin: u128,
    /// Block explorer base URL for outcome links.
    pub explorer_url: Option<String>,
}

impl RelayerConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, RelayerError> {
        Ok(RelayerConfig {
            rpc_url: require(RPC_URL_ENV)?,
            registry_address: parse_address(REGISTRY_ADDRESS_ENV, &require(REGISTRY_ADDRESS_ENV)?)?,
            operator_key_hex: require(OPERATOR_KEY_ENV)?,
            identity_secret: require(IDENTITY_SECRET_ENV)?,
            min_voter_balance: U256::from(parse_u128(
                MIN_VOTER_BALANCE_ENV,
                DEFAULT_MIN_VOTER_BALANCE_WEI,
            )?),
            top_up_amount: U256::from(parse_u128(TOP_UP_ENV, DEFAULT_TOP_UP_WEI)?),
            confirmation_timeout: Duration::from_secs(parse_u64(
                CONFIRMATION_TIMEOUT_ENV,
                DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            )?),
            priority_fee_margin: parse_u128(
                PRIORITY_FEE_MARGIN_ENV,
                DEFAULT_PRIORITY_FEE_MARGIN_WEI,
            )?,
            explorer_url: env::var(EXPLORER_URL_ENV).ok().filter(|s| !s.is_empty()),
        })
    }
}

fn require(name: &str) -> Result<String, RelayerError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RelayerError::InvalidInput(format!(
            "missing required environment variable {name}"
        ))),
    }
}

fn parse_address(name: &str, raw: &str) -> Result<Address, RelayerError> {
    Address::from_str(raw)
        .map_err(|e| RelayerError::InvalidInput(format!("{name} is not a valid address: {e}")))
}

fn parse_u128(name: &str, default: u128) -> Result<u128, RelayerError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|e| RelayerError::InvalidInput(format!("{name} is not a valid integer: {e}"))),
    }
}

fn parse_u64(name: &str, default: u64) -> Result<u64, RelayerError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|e| RelayerError::InvalidInput(format!("{name} is not a valid integer: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test that touches process environment; keep it self-contained
    // so parallel tests never observe partial state.
    #[test]
    fn from_env_reads_required_and_defaults() {
        env::set_var(RPC_URL_ENV, "https://rpc.example.org");
        env::set_var(
            REGISTRY_ADDRESS_ENV,
            "0x5425890298aed601595a70AB815c96711a31Bc65",
        );
        env::set_var(OPERATOR_KEY_ENV, "ab".repeat(32));
        env::set_var(IDENTITY_SECRET_ENV, "unit-test-secret");
        env::remove_var(MIN_VOTER_BALANCE_ENV);
        env::remove_var(TOP_UP_ENV);
        env::remove_var(CONFIRMATION_TIMEOUT_ENV);
        env::remove_var(PRIORITY_FEE_MARGIN_ENV);
        env::remove_var(EXPLORER_URL_ENV);

        let config = RelayerConfig::from_env().unwrap();
        assert_eq!(config.rpc_url, "https://rpc.example.org");
        assert_eq!(
            config.min_voter_balance,
            U256::from(DEFAULT_MIN_VOTER_BALANCE_WEI)
        );
        assert_eq!(config.top_up_amount, U256::from(DEFAULT_TOP_UP_WEI));
        assert_eq!(
            config.confirmation_timeout,
            Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS)
        );
        assert_eq!(config.explorer_url, None);
    }

    #[test]
    fn bad_integer_is_rejected() {
        assert!(parse_u64("NO_SUCH_RELAYER_VAR", 5).unwrap() == 5);
        env::set_var("BALLOT_RELAYER_TEST_BAD_INT", "not-a-number");
        assert!(parse_u64("BALLOT_RELAYER_TEST_BAD_INT", 5).is_err());
        env::remove_var("BALLOT_RELAYER_TEST_BAD_INT");
    }

    #[test]
    fn bad_address_is_rejected() {
        assert!(parse_address("X", "0x123").is_err());
    }
}
