// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vote proof reconciliation.
//!
//! A client claiming "transaction X is my vote" proves nothing by itself:
//! the reference could be stale, unrelated, failed, or another voter's real
//! vote. Before the surrounding system applies any off-chain tally update,
//! the reconciler re-derives the truth from the ledger: fetch the receipt,
//! require success, and require a vote-cast event whose election, candidate
//! and voter all equal the claim.
//!
//! Verification is idempotent and side-effect-free. The receipt is fetched
//! fresh on every call - nothing is cached that could go stale across a
//! chain reorganization.

use std::sync::Arc;

use crate::error::RelayerError;
use crate::ledger::{Ledger, RegistryEvent};
use crate::models::VoteProof;

/// Verifies client-claimed vote proofs against the ledger.
pub struct VoteReconciler<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> VoteReconciler<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        VoteReconciler { ledger }
    }

    /// Verify that `proof` references a genuine, matching vote-cast event.
    ///
    /// Only on `Ok(())` may the caller apply its one-time cache update; the
    /// caller remains responsible for at-most-once application keyed by the
    /// transaction reference.
    pub async fn verify(&self, proof: &VoteProof) -> Result<(), RelayerError> {
        let record = self
            .ledger
            .receipt(proof.tx_ref)
            .await?
            .ok_or(RelayerError::ProofNotFound(proof.tx_ref))?;

        if !record.success {
            return Err(RelayerError::ProofTxFailed(proof.tx_ref));
        }

        let matched = record.events.iter().any(|event| {
            matches!(
                event,
                RegistryEvent::VoteCast {
                    election_id,
                    candidate_id,
                    voter,
                } if *election_id == proof.election_id
                    && *candidate_id == proof.candidate_id
                    && *voter == proof.voter
            )
        });

        if matched {
            Ok(())
        } else {
            tracing::warn!(
                tx = %proof.tx_ref,
                election_id = proof.election_id,
                "vote proof does not match any vote-cast event in its receipt"
            );
            Err(RelayerError::ProofMismatch(format!(
                "transaction {} carries no vote-cast event for election {} candidate {} voter {}",
                proof.tx_ref, proof.election_id, proof.candidate_id, proof.voter
            )))
        }
    }
}
