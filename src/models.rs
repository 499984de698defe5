// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outward-facing data models.
//!
//! These are the types collaborators receive from the pipeline and hand to
//! the reconciler. All serialize to JSON for the surrounding service layer.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ledger::TxRef;

/// Outcome of a confirmed state-changing submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    /// Stable transaction reference.
    pub tx_ref: TxRef,
    /// Explorer link, when an explorer URL is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

/// Result of `createElection`: the ledger-assigned election id plus the
/// transaction that assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedElection {
    pub election_id: u64,
    #[serde(flatten)]
    pub outcome: TxOutcome,
}

/// Result of `addCandidate`: the per-election candidate id plus the
/// transaction that assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedCandidate {
    pub election_id: u64,
    pub candidate_id: u64,
    #[serde(flatten)]
    pub outcome: TxOutcome,
}

/// One candidate row in an election's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Per-election sequential id, 1-based.
    pub id: u64,
    pub name: String,
    pub party: String,
    /// Confirmed cast-vote count. Monotonically non-decreasing.
    pub vote_count: u64,
}

/// Tallies for one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: u64,
    pub candidates: Vec<CandidateResult>,
    /// Total confirmed votes. Always equals the sum of candidate counts.
    pub total_votes: u64,
}

/// Registration and voting state for one (election, voter) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub registered: bool,
    pub has_voted: bool,
    /// Chosen candidate once voted, otherwise `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_candidate_id: Option<u64>,
}

impl VoterStatus {
    /// Status for an address with no registration record.
    pub fn unregistered() -> Self {
        VoterStatus {
            registered: false,
            has_voted: false,
            voted_candidate_id: None,
        }
    }
}

/// A client-claimed cast vote, validated by the reconciler before any
/// off-chain tally update. Ephemeral: checked once, then accepted or
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteProof {
    pub election_id: u64,
    pub candidate_id: u64,
    pub voter: Address,
    pub tx_ref: TxRef,
}
