// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The ledger seam.
//!
//! Everything the relayer core needs from the chain is expressed through the
//! [`Ledger`] trait: balance and nonce reads, a native transfer, a registry
//! call submission, bounded inclusion waits, and typed reads of registry
//! state. Two implementations exist: `chain::EvmLedger` (alloy, production)
//! and `sim::InMemoryLedger` (in-process registry, tests and local runs).
//!
//! Wire-neutral types live here so neither implementation leaks its
//! transport: [`TxRef`] for transaction references, [`RegistryCall`] for the
//! operations a signer can submit, and [`RegistryEvent`] for the decoded
//! events a receipt carries.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};

use crate::error::RelayerError;
use crate::models::{ElectionResults, VoterStatus};

/// Stable, comparable reference to a submitted transaction (32-byte hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub B256);

impl TxRef {
    /// Build a reference with `value` in the low 8 bytes.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        TxRef(B256::new(bytes))
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TxRef {
    type Err = RelayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(TxRef)
            .map_err(|e| RelayerError::InvalidInput(format!("bad transaction reference: {e}")))
    }
}

impl From<B256> for TxRef {
    fn from(hash: B256) -> Self {
        TxRef(hash)
    }
}

/// A state-changing registry operation, before ABI encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    CreateElection {
        title: String,
        description: String,
        start_time: u64,
        end_time: u64,
    },
    AddCandidate {
        election_id: u64,
        name: String,
        party: String,
        image_ref: String,
    },
    RegisterVoter {
        election_id: u64,
        voter: Address,
    },
    BatchRegisterVoters {
        election_id: u64,
        voters: Vec<Address>,
    },
    SetElectionActive {
        election_id: u64,
        active: bool,
    },
    CastVote {
        election_id: u64,
        candidate_id: u64,
    },
}

impl RegistryCall {
    /// Short operation name for log fields.
    pub fn op_name(&self) -> &'static str {
        match self {
            RegistryCall::CreateElection { .. } => "createElection",
            RegistryCall::AddCandidate { .. } => "addCandidate",
            RegistryCall::RegisterVoter { .. } => "registerVoter",
            RegistryCall::BatchRegisterVoters { .. } => "batchRegisterVoters",
            RegistryCall::SetElectionActive { .. } => "setElectionActive",
            RegistryCall::CastVote { .. } => "castVote",
        }
    }
}

/// A registry event decoded from a confirmed transaction.
///
/// Server-assigned identifiers (`election_id` from `createElection`,
/// `candidate_id` from `addCandidate`) are only discoverable here; the
/// pipeline never infers them by convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    ElectionCreated {
        election_id: u64,
        title: String,
        start_time: u64,
        end_time: u64,
    },
    CandidateAdded {
        election_id: u64,
        candidate_id: u64,
        name: String,
        party: String,
    },
    VoterRegistered {
        election_id: u64,
        voter: Address,
    },
    VoteCast {
        election_id: u64,
        candidate_id: u64,
        voter: Address,
    },
    ElectionStatusChanged {
        election_id: u64,
        active: bool,
    },
}

/// Confirmation record for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tx_ref: TxRef,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Whether the transaction executed successfully.
    pub success: bool,
    /// Registry events emitted by the transaction, decoded. Empty for
    /// failed transactions and plain transfers.
    pub events: Vec<RegistryEvent>,
}

/// Chain operations the relayer core depends on.
///
/// Stateless per call; all sequencing discipline (operator nonces) lives in
/// the funding manager, not behind this trait.
pub trait Ledger: Send + Sync {
    /// Native balance of an account, in wei.
    fn native_balance(
        &self,
        address: Address,
    ) -> impl std::future::Future<Output = Result<U256, RelayerError>> + Send;

    /// Number of transactions already sent from an account (the next nonce).
    fn transaction_count(
        &self,
        address: Address,
    ) -> impl std::future::Future<Output = Result<u64, RelayerError>> + Send;

    /// Submit a native transfer with an explicit nonce. `bump_fee` raises
    /// the priority fee for a retry of a rejected submission.
    fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
        nonce: u64,
        bump_fee: bool,
    ) -> impl std::future::Future<Output = Result<TxRef, RelayerError>> + Send;

    /// Submit a registry call signed by `signer`. `nonce` is `Some` when the
    /// caller sequences the account itself (operator submissions) and `None`
    /// to take the account's next nonce (voter submissions).
    fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &RegistryCall,
        nonce: Option<u64>,
    ) -> impl std::future::Future<Output = Result<TxRef, RelayerError>> + Send;

    /// Wait for inclusion, bounded by `timeout`. A timeout does not
    /// un-submit: the transaction may still land, and callers must treat it
    /// as unknown outcome and re-read state.
    fn await_inclusion(
        &self,
        tx: TxRef,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<TxRecord, RelayerError>> + Send;

    /// Point read of a confirmation record. `None` while the transaction is
    /// pending or unknown. Re-reads the chain on every call.
    fn receipt(
        &self,
        tx: TxRef,
    ) -> impl std::future::Future<Output = Result<Option<TxRecord>, RelayerError>> + Send;

    /// Registration and voting state for one (election, voter) pair.
    fn voter_status(
        &self,
        election_id: u64,
        voter: Address,
    ) -> impl std::future::Future<Output = Result<VoterStatus, RelayerError>> + Send;

    /// Candidate tallies and total for one election.
    fn results(
        &self,
        election_id: u64,
    ) -> impl std::future::Future<Output = Result<ElectionResults, RelayerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_ref_roundtrips_through_display() {
        let tx = TxRef::from_low_u64(0xdead_beef);
        let parsed: TxRef = tx.to_string().parse().unwrap();
        assert_eq!(tx, parsed);
    }

    #[test]
    fn tx_ref_rejects_garbage() {
        assert!("not-a-hash".parse::<TxRef>().is_err());
    }

    #[test]
    fn low_u64_lands_in_the_tail() {
        let tx = TxRef::from_low_u64(1);
        assert_eq!(tx.0.as_slice()[31], 1);
        assert!(tx.0.as_slice()[..24].iter().all(|b| *b == 0));
    }
}
